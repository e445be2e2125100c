//! The game orchestrator.
//!
//! A [`Game`] owns a roster of participants, a registry of modules, at
//! most one current phase, and a tick driver. It is a cheap-to-clone,
//! single-threaded handle; every clone refers to the same game.
//!
//! All mutation happens on the caller's stack. Phase changes requested
//! while the game is running are recorded as a pending transition and
//! applied at the end of the next tick, after every module and the
//! current phase ticked. No `RefCell` borrow of game bookkeeping is held
//! while a phase, module, or failure handler callback runs.

mod builder;

use std::any::TypeId;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexSet;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{Event, EventBus, ParticipantDeparting, ParticipantJoined, ParticipantTryJoin, JoinDecision};
use crate::error::{CallbackError, CallbackResult, Disposition, GameError, Role};
use crate::module::{Module, ModuleEntry, ModuleHandle, ModuleRegistry};
use crate::observability::events::{EventEmitter, LifecycleEvent};
use crate::observability::metrics;
use crate::participant::{ParticipantId, ParticipantSource};
use crate::phase::{Phase, PhaseSlot};
use crate::registry;
use crate::scheduler::{Scheduler, TaskId};

pub use builder::GameBuilder;

/// Unique identifier of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GameId(Uuid);

impl GameId {
    /// A fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Decides what happens to a reported failure.
pub type FailureHandler = Box<dyn FnMut(&GameError) -> Disposition>;

pub(crate) struct PendingTransition {
    pub(crate) target: Option<PhaseSlot>,
    pub(crate) formal: bool,
}

pub(crate) struct GameInner {
    id: GameId,
    bus: Rc<EventBus>,
    scheduler: Rc<dyn Scheduler>,
    source: Rc<dyn ParticipantSource>,
    emitter: Arc<EventEmitter>,
    tick_period: Duration,

    pub(crate) current: RefCell<Option<PhaseSlot>>,
    pub(crate) pending: RefCell<Option<PendingTransition>>,
    modules: RefCell<ModuleRegistry>,
    roster: RefCell<IndexSet<ParticipantId>>,

    running: Cell<bool>,
    driver: Cell<Option<TaskId>>,
    // `None` while the handler runs, and when the default is in effect.
    failure_handler: RefCell<Option<FailureHandler>>,
    escalated: RefCell<Vec<GameError>>,
    shutdown_sink: RefCell<Option<Vec<GameError>>>,

    depth: Cell<u32>,
    stop_requested: Cell<bool>,
    ticking: Cell<bool>,
    pub(crate) in_transition: Cell<bool>,
}

impl Drop for GameInner {
    fn drop(&mut self) {
        if let Some(task) = self.driver.take() {
            self.scheduler.cancel(task);
        }
        if self.running.get() {
            registry::deactivate(self.id);
        }
    }
}

/// Clears a flag when dropped, unwinding included.
pub(crate) struct FlagGuard<'a>(pub(crate) &'a Cell<bool>);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Leaves one callback frame when dropped, unwinding included.
struct FrameGuard<'a>(&'a Cell<u32>);

impl<'a> FrameGuard<'a> {
    fn enter(depth: &'a Cell<u32>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Handle to a game.
#[derive(Clone)]
pub struct Game {
    pub(crate) inner: Rc<GameInner>,
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("id", &self.inner.id)
            .field("running", &self.inner.running.get())
            .field("phase", &self.current_phase_name())
            .field("participants", &self.inner.roster.borrow().len())
            .field("modules", &self.inner.modules.borrow().len())
            .finish_non_exhaustive()
    }
}

/// Non-owning game handle held by scopes and tick tasks.
#[derive(Clone)]
pub(crate) struct WeakGame(Weak<GameInner>);

impl WeakGame {
    pub(crate) fn upgrade(&self) -> Option<Game> {
        self.0.upgrade().map(|inner| Game { inner })
    }
}

impl Game {
    /// Starts building a game.
    #[must_use]
    pub fn builder() -> GameBuilder {
        GameBuilder::new()
    }

    pub(crate) fn from_parts(
        bus: Rc<EventBus>,
        scheduler: Rc<dyn Scheduler>,
        source: Rc<dyn ParticipantSource>,
        emitter: Arc<EventEmitter>,
        tick_period: Duration,
    ) -> Self {
        Self {
            inner: Rc::new(GameInner {
                id: GameId::new(),
                bus,
                scheduler,
                source,
                emitter,
                tick_period,
                current: RefCell::new(None),
                pending: RefCell::new(None),
                modules: RefCell::new(ModuleRegistry::new()),
                roster: RefCell::new(IndexSet::new()),
                running: Cell::new(false),
                driver: Cell::new(None),
                failure_handler: RefCell::new(None),
                escalated: RefCell::new(Vec::new()),
                shutdown_sink: RefCell::new(None),
                depth: Cell::new(0),
                stop_requested: Cell::new(false),
                ticking: Cell::new(false),
                in_transition: Cell::new(false),
            }),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// This game's identifier.
    #[must_use]
    pub fn id(&self) -> GameId {
        self.inner.id
    }

    /// The event bus this game publishes on and scopes subscribe to.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Publishes `event` on this game's bus.
    pub fn publish<E: Event>(&self, event: &mut E) {
        self.inner.bus.publish(event);
    }

    /// Period between two scheduled ticks.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        self.inner.tick_period
    }

    /// Whether the game is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Name of the current phase.
    #[must_use]
    pub fn current_phase_name(&self) -> Option<String> {
        self.inner
            .current
            .borrow()
            .as_ref()
            .map(|slot| slot.name.clone())
    }

    /// Whether a phase change is waiting for the next tick boundary.
    #[must_use]
    pub fn has_pending_transition(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    /// Typed handle to a registered module.
    #[must_use]
    pub fn module<M: Module>(&self) -> Option<ModuleHandle<M>> {
        self.inner.modules.borrow().handle::<M>()
    }

    /// Whether a module of type `M` is registered and enabled.
    #[must_use]
    pub fn is_module_enabled<M: Module>(&self) -> bool {
        self.inner.modules.borrow().is_enabled(TypeId::of::<M>())
    }

    /// Names of all registered modules, in registration order.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        self.inner.modules.borrow().names()
    }

    pub(crate) fn downgrade(&self) -> WeakGame {
        WeakGame(Rc::downgrade(&self.inner))
    }

    pub(crate) fn modules(&self) -> Ref<'_, ModuleRegistry> {
        self.inner.modules.borrow()
    }

    pub(crate) fn modules_mut(&self) -> RefMut<'_, ModuleRegistry> {
        self.inner.modules.borrow_mut()
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        self.inner.emitter.emit(event);
    }

    // ========================================================================
    // Participants
    // ========================================================================

    /// Adds a participant.
    ///
    /// On a stopped game this succeeds for any participant not yet present
    /// and publishes nothing. On a running game a [`ParticipantTryJoin`]
    /// is published first and the participant is admitted only if some
    /// handler allowed it; [`ParticipantJoined`] follows admission.
    pub fn add_participant(&self, participant: ParticipantId) -> bool {
        if self.inner.roster.borrow().contains(&participant) {
            return false;
        }
        if !self.is_running() {
            self.inner.roster.borrow_mut().insert(participant);
            debug!(game = %self.id(), %participant, "participant added");
            return true;
        }

        let mut query = ParticipantTryJoin::new(self.id(), participant);
        self.publish(&mut query);
        if query.decision != JoinDecision::Allow {
            debug!(game = %self.id(), %participant, "join denied");
            return false;
        }
        if !self.is_running() {
            debug!(game = %self.id(), %participant, "game stopped while the join was decided");
            return false;
        }
        if !self.inner.roster.borrow_mut().insert(participant) {
            return false;
        }
        let size = self.inner.roster.borrow().len();
        metrics::set_participants(size);
        info!(game = %self.id(), %participant, participants = size, "participant joined");
        self.emit(LifecycleEvent::ParticipantJoined {
            timestamp: Utc::now(),
            game: self.id(),
            participant,
        });
        self.publish(&mut ParticipantJoined {
            game: self.id(),
            participant,
        });
        true
    }

    /// Removes a participant. Idempotent.
    ///
    /// On a running game [`ParticipantDeparting`] is published while the
    /// participant is still in the roster.
    pub fn remove_participant(&self, participant: ParticipantId) {
        if !self.inner.roster.borrow().contains(&participant) {
            return;
        }
        if self.is_running() {
            self.publish(&mut ParticipantDeparting {
                game: self.id(),
                participant,
            });
        }
        if self.inner.roster.borrow_mut().shift_remove(&participant) {
            let size = self.inner.roster.borrow().len();
            metrics::set_participants(size);
            info!(game = %self.id(), %participant, participants = size, "participant left");
            self.emit(LifecycleEvent::ParticipantLeft {
                timestamp: Utc::now(),
                game: self.id(),
                participant,
            });
        }
    }

    /// Number of reachable participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.prune_roster();
        self.inner.roster.borrow().len()
    }

    /// Whether `participant` is in the roster and reachable.
    #[must_use]
    pub fn contains_participant(&self, participant: ParticipantId) -> bool {
        self.prune_roster();
        self.inner.roster.borrow().contains(&participant)
    }

    /// Reachable participants, in join order.
    #[must_use]
    pub fn participants(&self) -> Vec<ParticipantId> {
        self.prune_roster();
        self.inner.roster.borrow().iter().copied().collect()
    }

    /// Calls `f` for every reachable participant, in join order.
    ///
    /// Iterates a snapshot, so `f` may add or remove participants.
    pub fn for_each_participant(&self, mut f: impl FnMut(ParticipantId)) {
        for participant in self.participants() {
            f(participant);
        }
    }

    /// Silently drops participants the source no longer reaches.
    fn prune_roster(&self) {
        let gone: Vec<ParticipantId> = self
            .inner
            .roster
            .borrow()
            .iter()
            .copied()
            .filter(|p| !self.inner.source.is_reachable(*p))
            .collect();
        if gone.is_empty() {
            return;
        }
        let mut roster = self.inner.roster.borrow_mut();
        for participant in &gone {
            roster.shift_remove(participant);
        }
        debug!(game = %self.id(), pruned = gone.len(), "pruned unreachable participants");
        metrics::set_participants(roster.len());
    }

    // ========================================================================
    // Phases
    // ========================================================================

    /// Requests a formal change to `phase`.
    ///
    /// A stopped game replaces its phase immediately and runs no
    /// callbacks. A running game records the request and applies it at
    /// the next tick boundary; a later request before that boundary
    /// replaces an earlier one.
    pub fn set_phase<P: Phase>(&self, phase: P) {
        self.set_phase_with(phase, true);
    }

    /// Like [`Self::set_phase`] with an explicit `formal` flag, passed to
    /// the outgoing phase's `on_exit`.
    pub fn set_phase_with<P: Phase>(&self, phase: P, formal: bool) {
        self.request_phase(Some(PhaseSlot::new(phase)), formal);
    }

    /// Requests that the current phase be retired with no successor.
    pub fn clear_phase(&self, formal: bool) {
        self.request_phase(None, formal);
    }

    fn request_phase(&self, target: Option<PhaseSlot>, formal: bool) {
        let target_name = target.as_ref().map(|slot| slot.name.clone());
        if self.is_running() {
            let replaced = self
                .inner
                .pending
                .borrow_mut()
                .replace(PendingTransition { target, formal });
            debug!(
                game = %self.id(),
                target = ?target_name,
                formal,
                replaced = replaced.is_some(),
                "phase change queued"
            );
            drop(replaced);
        } else {
            let previous = self.inner.current.replace(target);
            debug!(game = %self.id(), target = ?target_name, "phase replaced while stopped");
            drop(previous);
        }
    }

    // ========================================================================
    // Modules
    // ========================================================================

    /// Registers a module instance. Returns `false` if a module of the
    /// same type is already registered.
    ///
    /// Calls the module's `register` callback. Registering while running
    /// is allowed, but the module is only enabled by the next transition
    /// into a phase that declares it.
    pub fn register_module<M: Module>(&self, module: M, persistent: bool) -> bool {
        self.install_module(ModuleEntry::new(module), persistent)
    }

    pub(crate) fn install_module(&self, entry: ModuleEntry, persistent: bool) -> bool {
        let id = entry.type_id();
        let name = entry.name().to_owned();
        if !self.modules_mut().insert(entry, persistent) {
            return false;
        }
        if self.is_running() {
            debug!(game = %self.id(), module = %name, "module registered while running; enabled at the next transition");
        } else {
            debug!(game = %self.id(), module = %name, persistent, "module registered");
        }
        self.call_module(id, "register", |module, game| module.register(game, persistent));
        true
    }

    pub(crate) fn reset_module(&self, id: TypeId) {
        self.call_module(id, "reset", |module, game| module.reset(game));
    }

    // ========================================================================
    // Callback invocation
    // ========================================================================

    /// Invokes a module callback with panic isolation. Returns whether it
    /// succeeded; failures are reported.
    pub(crate) fn call_module(
        &self,
        id: TypeId,
        step: &'static str,
        f: impl FnOnce(&mut dyn Module, &Self) -> CallbackResult,
    ) -> bool {
        let found = self
            .modules()
            .get(id)
            .map(|record| (record.name.clone(), Rc::clone(&record.instance)));
        let Some((name, instance)) = found else {
            return false;
        };
        metrics::record_module_lifecycle(&name, step);
        self.invoke(Role::Module, &name, step, &*instance, f)
    }

    /// Invokes a phase callback with panic isolation.
    pub(crate) fn call_phase(
        &self,
        name: &str,
        instance: &RefCell<dyn Phase>,
        step: &'static str,
        f: impl FnOnce(&mut dyn Phase, &Self) -> CallbackResult,
    ) -> bool {
        self.invoke(Role::Phase, name, step, instance, f)
    }

    fn invoke<T: ?Sized>(
        &self,
        role: Role,
        name: &str,
        step: &'static str,
        instance: &RefCell<T>,
        f: impl FnOnce(&mut T, &Self) -> CallbackResult,
    ) -> bool {
        let result = match instance.try_borrow_mut() {
            Ok(mut guard) => CallbackError::isolate(|| f(&mut *guard, self)),
            Err(_) => {
                self.report(GameError::Reentrant {
                    owner: name.to_owned(),
                    role,
                    event: step.to_owned(),
                });
                return false;
            }
        };
        match result {
            Ok(()) => true,
            Err(source) => {
                self.report(GameError::callback(role, name, step, source));
                false
            }
        }
    }

    // ========================================================================
    // Failure routing
    // ========================================================================

    /// Installs the handler deciding the fate of reported failures.
    ///
    /// The default escalates everything.
    pub fn set_failure_handler(&self, handler: impl FnMut(&GameError) -> Disposition + 'static) {
        let previous = self.inner.failure_handler.replace(Some(Box::new(handler)));
        drop(previous);
    }

    /// Takes escalated failures that had no synchronous caller, such as
    /// failures of handlers for events published outside a tick.
    #[must_use]
    pub fn take_escalated(&self) -> Vec<GameError> {
        std::mem::take(&mut *self.inner.escalated.borrow_mut())
    }

    /// Routes a failure: to the stop caller during shutdown, otherwise
    /// through the failure handler.
    pub(crate) fn report(&self, err: GameError) {
        metrics::record_error(err.category());

        if self.inner.shutdown_sink.borrow().is_some() {
            warn!(game = %self.id(), error = %err, "failure during shutdown");
            self.emit_failure(&err, true);
            if let Some(sink) = self.inner.shutdown_sink.borrow_mut().as_mut() {
                sink.push(err);
            }
            return;
        }

        let handler = self.inner.failure_handler.borrow_mut().take();
        let disposition = match handler {
            Some(mut handler) => {
                let disposition = handler(&err);
                let mut slot = self.inner.failure_handler.borrow_mut();
                if slot.is_none() {
                    *slot = Some(handler);
                }
                disposition
            }
            None => Disposition::Escalate,
        };

        match disposition {
            Disposition::Handled => {
                warn!(game = %self.id(), error = %err, "failure handled");
                self.emit_failure(&err, false);
            }
            Disposition::Escalate => {
                error!(game = %self.id(), error = %err, "failure escalated");
                self.emit_failure(&err, true);
                self.inner.escalated.borrow_mut().push(err);
            }
        }
    }

    fn emit_failure(&self, err: &GameError, escalated: bool) {
        self.emit(LifecycleEvent::FailureReported {
            timestamp: Utc::now(),
            game: self.id(),
            category: err.category().to_owned(),
            message: err.to_string(),
            escalated,
        });
    }

    fn escalated_len(&self) -> usize {
        self.inner.escalated.borrow().len()
    }

    fn drain_escalated(&self, mark: usize) -> Vec<GameError> {
        let mut queue = self.inner.escalated.borrow_mut();
        let mark = mark.min(queue.len());
        queue.drain(mark..).collect()
    }

    /// Runs `f` as a callback frame. A `stop` requested inside any frame
    /// is carried out when the outermost one returns.
    pub(crate) fn frame<R>(&self, f: impl FnOnce() -> R) -> R {
        let out = {
            let _frame = FrameGuard::enter(&self.inner.depth);
            f()
        };
        if self.inner.depth.get() == 0 && self.inner.stop_requested.replace(false) {
            let failures = self.shutdown();
            self.inner.escalated.borrow_mut().extend(failures);
        }
        out
    }

    fn first_failure(failures: Vec<GameError>, operation: &'static str) -> Result<(), GameError> {
        let mut failures = failures.into_iter();
        let Some(first) = failures.next() else {
            return Ok(());
        };
        for extra in failures {
            warn!(operation, error = %extra, "additional failure");
        }
        Err(first)
    }

    // ========================================================================
    // Start / tick / stop
    // ========================================================================

    /// Starts the game. A no-op if already running.
    ///
    /// Marks the game running, activates the current phase (if any), then
    /// schedules the tick driver. Failures during activation go to the
    /// failure handler.
    ///
    /// # Errors
    ///
    /// Returns the first escalated activation failure. The game is then
    /// rolled back to stopped and no driver is scheduled.
    pub fn start(&self) -> Result<(), GameError> {
        if self.is_running() {
            return Ok(());
        }
        self.inner.running.set(true);
        registry::activate(self.id());
        self.prune_roster();
        let participants = self.inner.roster.borrow().len();
        metrics::set_participants(participants);
        info!(
            game = %self.id(),
            participants,
            phase = ?self.current_phase_name(),
            "game starting"
        );
        self.emit(LifecycleEvent::GameStarted {
            timestamp: Utc::now(),
            game: self.id(),
            participants,
        });

        let mark = self.escalated_len();
        self.frame(|| {
            let initial = self.inner.current.borrow_mut().take();
            if let Some(initial) = initial {
                if let Err(err) = self.transition(Some(initial), true) {
                    self.report(err);
                }
            }
        });
        let failures = self.drain_escalated(mark);

        if !failures.is_empty() {
            if self.is_running() {
                for extra in self.shutdown() {
                    warn!(game = %self.id(), error = %extra, "failure while rolling back start");
                }
            }
            return Self::first_failure(failures, "start");
        }
        if !self.is_running() {
            // Stopped from inside an activation callback.
            return Ok(());
        }

        let weak = self.downgrade();
        let task = self.inner.scheduler.schedule_repeating(
            self.inner.tick_period,
            Box::new(move || {
                let Some(game) = weak.upgrade() else {
                    return;
                };
                if let Err(err) = game.tick() {
                    error!(game = %game.id(), error = %err, "tick failed");
                    game.inner.escalated.borrow_mut().push(err);
                }
            }),
        );
        self.inner.driver.set(Some(task));
        debug!(game = %self.id(), %task, period = ?self.inner.tick_period, "tick driver scheduled");
        Ok(())
    }

    /// Runs one tick: every enabled module, then the current phase, then a
    /// pending transition if one was requested. A no-op when stopped.
    ///
    /// Normally called by the tick driver; hosts driving games by hand may
    /// call it directly.
    ///
    /// # Errors
    ///
    /// Returns the transition's structural failure, or else the first
    /// failure escalated during the tick. Further failures are logged.
    pub fn tick(&self) -> Result<(), GameError> {
        if !self.is_running() {
            return Ok(());
        }
        if self.inner.ticking.replace(true) {
            warn!(game = %self.id(), "tick re-entered from a callback; ignored");
            return Ok(());
        }
        let started = Instant::now();
        let mark = self.escalated_len();
        let structural = {
            let _ticking = FlagGuard(&self.inner.ticking);
            self.frame(|| self.tick_once())
        };
        metrics::record_tick_duration(started.elapsed());

        let mut failures = self.drain_escalated(mark);
        if let Err(err) = structural {
            metrics::record_error(err.category());
            failures.insert(0, err);
        }
        Self::first_failure(failures, "tick")
    }

    fn tick_once(&self) -> Result<(), GameError> {
        let enabled = self.modules().enabled();
        for id in enabled {
            let still_enabled = self.modules().is_enabled(id);
            if still_enabled {
                self.call_module(id, "tick", |module, game| module.tick(game));
            }
        }

        let current = self
            .inner
            .current
            .borrow()
            .as_ref()
            .map(|slot| (slot.name.clone(), Rc::clone(&slot.instance)));
        if let Some((name, instance)) = current {
            self.call_phase(&name, &instance, "on_tick", |phase, game| phase.on_tick(game));
        }

        if self.inner.stop_requested.get() {
            return Ok(());
        }
        let pending = self.inner.pending.borrow_mut().take();
        match pending {
            Some(PendingTransition { target, formal }) => self.transition(target, formal),
            None => Ok(()),
        }
    }

    /// Stops the game. A no-op if not running.
    ///
    /// Cancels the tick driver, retires the current phase with
    /// `on_exit(false)`, then retires every enabled module including
    /// persistent ones. Every step is attempted.
    ///
    /// Called from inside a game callback, the driver is cancelled at once
    /// and retirement runs as soon as the outermost callback returns.
    ///
    /// # Errors
    ///
    /// Returns the first failure raised during retirement; the rest are
    /// logged. The game is stopped either way.
    pub fn stop(&self) -> Result<(), GameError> {
        if !self.is_running() {
            return Ok(());
        }
        self.cancel_driver();
        if self.inner.depth.get() > 0 {
            if !self.inner.stop_requested.replace(true) {
                info!(game = %self.id(), "stop requested inside a callback; retiring when it returns");
            }
            return Ok(());
        }
        let failures = self.shutdown();
        Self::first_failure(failures, "stop")
    }

    fn cancel_driver(&self) {
        if let Some(task) = self.inner.driver.take() {
            self.inner.scheduler.cancel(task);
            debug!(game = %self.id(), %task, "tick driver cancelled");
        }
    }

    /// Full retirement. Failures are collected, not routed to the handler.
    fn shutdown(&self) -> Vec<GameError> {
        if !self.is_running() {
            return Vec::new();
        }
        info!(game = %self.id(), phase = ?self.current_phase_name(), "game stopping");
        self.cancel_driver();
        *self.inner.shutdown_sink.borrow_mut() = Some(Vec::new());
        let pending = self.inner.pending.borrow_mut().take();
        drop(pending);

        // Callbacks running during retirement see a frame, so a nested
        // `stop` only sets the flag cleared below.
        {
            let _frame = FrameGuard::enter(&self.inner.depth);
            self.retire_phase(false);
            self.retire_modules(true);
        }

        self.inner.stop_requested.set(false);
        self.inner.running.set(false);
        registry::deactivate(self.id());
        let leftover = self.inner.current.borrow_mut().take();
        drop(leftover);

        let failures = self.inner.shutdown_sink.take().unwrap_or_default();
        info!(game = %self.id(), failures = failures.len(), "game stopped");
        self.emit(LifecycleEvent::GameStopped {
            timestamp: Utc::now(),
            game: self.id(),
            failures: failures.len(),
        });
        failures
    }
}
