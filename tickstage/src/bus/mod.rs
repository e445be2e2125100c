//! In-process event bus.
//!
//! Subscriptions are keyed by the concrete event type and ordered by
//! [`Priority`], then by subscription order. Publishing runs every
//! matching handler synchronously on the caller's stack.
//!
//! The bus is single-threaded: handlers may subscribe, unsubscribe, or
//! publish re-entrantly because [`EventBus::publish`] works on a snapshot
//! of the handler list and releases its own borrow before invoking any of
//! them.

pub mod scope;

use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::BusError;
use crate::game::GameId;
use crate::participant::ParticipantId;

pub use scope::{EventScope, Listeners};

/// An event that can be published on an [`EventBus`].
pub trait Event: Any {
    /// The game this event belongs to, if any.
    ///
    /// Scoped handlers drop events naming another game, or a game that is
    /// not running.
    fn game(&self) -> Option<GameId> {
        None
    }

    /// Whether an earlier handler cancelled this event.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Handler ordering. Lower priorities run first; `Monitor` runs last and
/// should only observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Runs first.
    Lowest,
    /// Runs before `Normal`.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Runs after `Normal`.
    High,
    /// Last priority allowed to change the outcome.
    Highest,
    /// Observes the final outcome.
    Monitor,
}

/// Identifies one subscription on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type-erased handler. Receives the event as `&mut dyn Any`.
pub type RawHandler = Rc<dyn Fn(&mut dyn Any)>;

struct Subscription {
    event: TypeId,
    owner: Rc<str>,
    priority: Priority,
    handler: RawHandler,
}

#[derive(Default)]
struct BusState {
    // Keyed by id; ids are monotonic, so key order is subscription order.
    subscriptions: IndexMap<SubscriptionId, Subscription>,
    next_id: u64,
    closed: bool,
}

/// The event bus.
#[derive(Default)]
pub struct EventBus {
    state: RefCell<BusState>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventBus")
            .field("subscriptions", &state.subscriptions.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a type-erased handler for events of type `event`.
    ///
    /// `owner` is a diagnostic label used by [`Self::subscription_count_for`].
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] once the bus has been closed.
    pub fn subscribe_raw(
        &self,
        event: TypeId,
        owner: &str,
        priority: Priority,
        handler: RawHandler,
    ) -> Result<SubscriptionId, BusError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(BusError::Closed);
        }
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.subscriptions.insert(
            id,
            Subscription {
                event,
                owner: Rc::from(owner),
                priority,
                handler,
            },
        );
        tracing::trace!(%id, owner, ?priority, "subscribed");
        Ok(id)
    }

    /// Subscribes a typed handler for events of type `E`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] once the bus has been closed.
    pub fn subscribe<E: Event>(
        &self,
        owner: &str,
        priority: Priority,
        handler: impl Fn(&mut E) + 'static,
    ) -> Result<SubscriptionId, BusError> {
        let raw: RawHandler = Rc::new(move |event: &mut dyn Any| {
            if let Some(event) = event.downcast_mut::<E>() {
                handler(event);
            }
        });
        self.subscribe_raw(TypeId::of::<E>(), owner, priority, raw)
    }

    /// Removes a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the bus was closed, or
    /// [`BusError::UnknownSubscription`] if `id` is not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), BusError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(BusError::Closed);
        }
        state
            .subscriptions
            .shift_remove(&id)
            .map(|_| tracing::trace!(%id, "unsubscribed"))
            .ok_or(BusError::UnknownSubscription(id))
    }

    /// Delivers `event` to every handler subscribed to `E`.
    ///
    /// Handlers removed by an earlier handler during the same delivery are
    /// skipped; handlers added during delivery see the next publish.
    pub fn publish<E: Event>(&self, event: &mut E) {
        let target = TypeId::of::<E>();
        let mut batch: Vec<(Priority, SubscriptionId, RawHandler)> = {
            let state = self.state.borrow();
            if state.closed {
                return;
            }
            state
                .subscriptions
                .iter()
                .filter(|(_, sub)| sub.event == target)
                .map(|(id, sub)| (sub.priority, *id, Rc::clone(&sub.handler)))
                .collect()
        };
        batch.sort_by_key(|(priority, id, _)| (*priority, *id));

        tracing::trace!(event = type_name::<E>(), handlers = batch.len(), "publishing");
        for (_, id, handler) in batch {
            if !self.state.borrow().subscriptions.contains_key(&id) {
                continue;
            }
            handler(&mut *event);
        }
    }

    /// Total number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    /// Number of live subscriptions registered under `owner`.
    #[must_use]
    pub fn subscription_count_for(&self, owner: &str) -> usize {
        self.state
            .borrow()
            .subscriptions
            .values()
            .filter(|sub| &*sub.owner == owner)
            .count()
    }

    /// Whether anything is subscribed to `E`.
    #[must_use]
    pub fn has_subscribers<E: Event>(&self) -> bool {
        let target = TypeId::of::<E>();
        self.state
            .borrow()
            .subscriptions
            .values()
            .any(|sub| sub.event == target)
    }

    /// Drops every subscription and refuses new ones.
    ///
    /// Publishing on a closed bus is a no-op.
    pub fn close(&self) {
        let dropped = {
            let mut state = self.state.borrow_mut();
            state.closed = true;
            std::mem::take(&mut state.subscriptions)
        };
        tracing::debug!(dropped = dropped.len(), "event bus closed");
        // Handlers may own game handles; drop them after the borrow ends.
        drop(dropped);
    }

    /// Whether [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }
}

// ============================================================================
// Built-in participant events
// ============================================================================

/// Answer to a [`ParticipantTryJoin`] query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinDecision {
    /// Admit the participant.
    Allow,
    /// Reject the participant.
    #[default]
    Deny,
}

/// Published when a participant asks to join a running game.
///
/// Starts as [`JoinDecision::Deny`]; some handler must allow it.
#[derive(Debug, Clone)]
pub struct ParticipantTryJoin {
    /// The game being joined.
    pub game: GameId,
    /// The participant asking to join.
    pub participant: ParticipantId,
    /// Current answer.
    pub decision: JoinDecision,
}

impl ParticipantTryJoin {
    /// Creates a query with the default `Deny` answer.
    #[must_use]
    pub fn new(game: GameId, participant: ParticipantId) -> Self {
        Self {
            game,
            participant,
            decision: JoinDecision::default(),
        }
    }

    /// Sets the answer to `Allow`.
    pub fn allow(&mut self) {
        self.decision = JoinDecision::Allow;
    }

    /// Sets the answer to `Deny`.
    pub fn deny(&mut self) {
        self.decision = JoinDecision::Deny;
    }
}

impl Event for ParticipantTryJoin {
    fn game(&self) -> Option<GameId> {
        Some(self.game)
    }
}

/// Published after a participant was admitted to a running game.
#[derive(Debug, Clone)]
pub struct ParticipantJoined {
    /// The game joined.
    pub game: GameId,
    /// The new participant.
    pub participant: ParticipantId,
}

impl Event for ParticipantJoined {
    fn game(&self) -> Option<GameId> {
        Some(self.game)
    }
}

/// Published before a participant is removed from a running game.
#[derive(Debug, Clone)]
pub struct ParticipantDeparting {
    /// The game being left.
    pub game: GameId,
    /// The departing participant, still in the roster.
    pub participant: ParticipantId,
}

impl Event for ParticipantDeparting {
    fn game(&self) -> Option<GameId> {
        Some(self.game)
    }
}
