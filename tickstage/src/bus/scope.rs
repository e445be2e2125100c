//! Owner-bound subscription sets.
//!
//! A phase or module type describes its handlers once, as a
//! [`Listeners`] descriptor returned from its `listeners()` function.
//! Building an [`EventScope`] binds that descriptor to one owner instance
//! and one game. The scope can then be registered and unregistered as a
//! unit any number of times; it is never rebuilt for the same owner.
//!
//! Every bound handler is wrapped so that it:
//! - skips events of other types,
//! - skips cancelled events when asked to,
//! - drops events naming another game or a game that is not running,
//! - reports a delivery to an owner that is already mid-callback as
//!   [`GameError::Reentrant`] instead of aliasing it,
//! - turns handler errors and panics into phase or module callback
//!   failures routed to the game's failure handler.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::bus::{Event, EventBus, Priority, RawHandler, SubscriptionId};
use crate::error::{BusError, CallbackError, CallbackResult, GameError, Role};
use crate::game::{Game, GameId};
use crate::registry;
use crate::short_type_name;

type Invoke<T> = Rc<dyn Fn(&mut T, &Game, &mut dyn Any) -> CallbackResult>;

/// Reads the routing facts of an event without knowing its type.
type Inspect = fn(&dyn Any) -> Option<(Option<GameId>, bool)>;

fn inspect<E: Event>(event: &dyn Any) -> Option<(Option<GameId>, bool)> {
    event
        .downcast_ref::<E>()
        .map(|e| (e.game(), e.is_cancelled()))
}

struct Listener<T> {
    event: TypeId,
    event_name: &'static str,
    priority: Priority,
    ignore_cancelled: bool,
    inspect: Inspect,
    invoke: Invoke<T>,
}

/// Static subscription descriptor for an owner type `T`.
///
/// ```ignore
/// fn listeners() -> Listeners<Self> {
///     Listeners::<Self>::new()
///         .on::<ParticipantTryJoin>(Priority::Normal, |arena, _game, query| {
///             if arena.open { query.allow(); }
///             Ok(())
///         })
/// }
/// ```
pub struct Listeners<T> {
    entries: Vec<Listener<T>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|l| (l.event_name, l.priority)))
            .finish()
    }
}

impl<T: 'static> Listeners<T> {
    /// An empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler that also receives cancelled events.
    #[must_use]
    pub fn on<E: Event>(
        self,
        priority: Priority,
        handler: impl Fn(&mut T, &Game, &mut E) -> CallbackResult + 'static,
    ) -> Self {
        self.on_with(priority, false, handler)
    }

    /// Adds a handler; with `ignore_cancelled` it skips cancelled events.
    #[must_use]
    pub fn on_with<E: Event>(
        mut self,
        priority: Priority,
        ignore_cancelled: bool,
        handler: impl Fn(&mut T, &Game, &mut E) -> CallbackResult + 'static,
    ) -> Self {
        let invoke: Invoke<T> = Rc::new(move |owner, game, event| {
            event
                .downcast_mut::<E>()
                .map_or(Ok(()), |event| handler(owner, game, event))
        });
        self.entries.push(Listener {
            event: TypeId::of::<E>(),
            event_name: short_type_name::<E>(),
            priority,
            ignore_cancelled,
            inspect: inspect::<E>,
            invoke,
        });
        self
    }

    /// Number of declared handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handlers are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Binding {
    event: TypeId,
    priority: Priority,
    handler: RawHandler,
}

/// The bound, wrapped subscriptions of one owner instance.
pub struct EventScope {
    owner: Rc<str>,
    role: Role,
    bindings: Vec<Binding>,
    active: Vec<SubscriptionId>,
    registered: bool,
}

impl fmt::Debug for EventScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventScope")
            .field("owner", &self.owner)
            .field("role", &self.role)
            .field("bindings", &self.bindings.len())
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

impl EventScope {
    /// Binds `listeners` to `owner` inside `game`.
    ///
    /// Holds the owner and the game weakly; a scope never keeps either
    /// alive.
    pub(crate) fn build<T: 'static>(
        owner: Weak<RefCell<T>>,
        name: &str,
        role: Role,
        game: &Game,
        listeners: Listeners<T>,
    ) -> Self {
        let owner_name: Rc<str> = Rc::from(name);
        let game_id = game.id();
        let weak_game = game.downgrade();

        let bindings = listeners
            .entries
            .into_iter()
            .map(|listener| {
                let Listener {
                    event,
                    event_name,
                    priority,
                    ignore_cancelled,
                    inspect,
                    invoke,
                } = listener;
                let owner = owner.clone();
                let weak_game = weak_game.clone();
                let owner_name = Rc::clone(&owner_name);

                let handler: RawHandler = Rc::new(move |event: &mut dyn Any| {
                    let Some((target, cancelled)) = inspect(event) else {
                        return;
                    };
                    if ignore_cancelled && cancelled {
                        return;
                    }
                    if let Some(target) = target {
                        if target != game_id || !registry::is_active(game_id) {
                            return;
                        }
                    }
                    let (Some(game), Some(owner)) = (weak_game.upgrade(), owner.upgrade()) else {
                        return;
                    };
                    game.frame(|| {
                        deliver(&game, &owner, &owner_name, role, event_name, &invoke, event);
                    });
                });

                Binding {
                    event,
                    priority,
                    handler,
                }
            })
            .collect();

        Self {
            owner: owner_name,
            role,
            bindings,
            active: Vec::new(),
            registered: false,
        }
    }

    /// Subscribes every binding. A no-op when already registered.
    ///
    /// # Errors
    ///
    /// Returns the bus error if any subscription is refused; bindings
    /// subscribed before the failure are removed again.
    pub fn register(&mut self, bus: &EventBus) -> Result<(), BusError> {
        if self.registered {
            return Ok(());
        }
        for binding in &self.bindings {
            match bus.subscribe_raw(
                binding.event,
                &self.owner,
                binding.priority,
                Rc::clone(&binding.handler),
            ) {
                Ok(id) => self.active.push(id),
                Err(err) => {
                    for id in self.active.drain(..) {
                        let _ = bus.unsubscribe(id);
                    }
                    return Err(err);
                }
            }
        }
        self.registered = true;
        Ok(())
    }

    /// Removes every subscription. A no-op when not registered.
    ///
    /// # Errors
    ///
    /// Returns the first bus error. The scope counts as unregistered
    /// afterwards either way.
    pub fn unregister(&mut self, bus: &EventBus) -> Result<(), BusError> {
        if !self.registered {
            return Ok(());
        }
        self.registered = false;
        let mut first = None;
        for id in self.active.drain(..) {
            if let Err(err) = bus.unsubscribe(id) {
                first.get_or_insert(err);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Whether the scope is currently subscribed.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        self.registered
    }

    /// Number of bound handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the owner declared no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Owner name.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

fn deliver<T>(
    game: &Game,
    owner: &RefCell<T>,
    name: &str,
    role: Role,
    event_name: &'static str,
    invoke: &Invoke<T>,
    event: &mut dyn Any,
) {
    let Ok(mut guard) = owner.try_borrow_mut() else {
        game.report(GameError::Reentrant {
            owner: name.to_owned(),
            role,
            event: event_name.to_owned(),
        });
        return;
    };
    let result = CallbackError::isolate(|| invoke(&mut guard, game, event));
    drop(guard);
    if let Err(source) = result {
        game.report(GameError::callback(
            role,
            name,
            format!("{event_name} handler"),
            source,
        ));
    }
}
