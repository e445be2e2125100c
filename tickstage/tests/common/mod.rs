//! Shared integration-test kit.
//!
//! Recording phases and modules append every lifecycle callback to a
//! per-thread journal as `"<owner>.<callback>"`. Scope registration is not
//! a callback, so the journal also watches the bus subscription count of
//! selected owners and logs `"<owner>.scope-register"` or
//! `"<owner>.scope-unregister"` whenever it changed since the last entry.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::rc::Rc;

use tickstage::bus::{ParticipantDeparting, ParticipantJoined, ParticipantTryJoin};
use tickstage::error::{CallbackError, CallbackResult, Disposition};
use tickstage::{Event, EventBus, Game, GameId, Listeners, ManualScheduler, Manifest, Module, Phase, Priority, Provision};

// ============================================================================
// Journal
// ============================================================================

#[derive(Default)]
struct JournalState {
    entries: Vec<String>,
    bus: Option<Rc<EventBus>>,
    watched: Vec<(String, usize)>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
}

impl JournalState {
    fn sync_scopes(&mut self) {
        let Some(bus) = self.bus.as_ref() else {
            return;
        };
        for (owner, seen) in &mut self.watched {
            let now = bus.subscription_count_for(owner);
            if now > *seen {
                self.entries.push(format!("{owner}.scope-register"));
            } else if now < *seen {
                self.entries.push(format!("{owner}.scope-unregister"));
            }
            *seen = now;
        }
    }
}

thread_local! {
    static JOURNAL: RefCell<JournalState> = RefCell::new(JournalState::default());
}

/// Clears the journal and watches `owners` on `bus`.
pub fn watch(bus: &Rc<EventBus>, owners: &[&str]) {
    JOURNAL.with(|journal| {
        let mut journal = journal.borrow_mut();
        *journal = JournalState::default();
        journal.watched = owners
            .iter()
            .map(|owner| ((*owner).to_owned(), bus.subscription_count_for(owner)))
            .collect();
        journal.bus = Some(Rc::clone(bus));
    });
}

/// Appends `owner.step`, then fails or panics if that entry was armed.
pub fn record(owner: &str, step: &str) -> CallbackResult {
    let entry = format!("{owner}.{step}");
    let (fail, panic) = JOURNAL.with(|journal| {
        let mut journal = journal.borrow_mut();
        journal.sync_scopes();
        journal.entries.push(entry.clone());
        (
            journal.failing.contains(&entry),
            journal.panicking.contains(&entry),
        )
    });
    assert!(!panic, "injected panic at {entry}");
    if fail {
        return Err(CallbackError::msg(format!("injected failure at {entry}")));
    }
    Ok(())
}

/// Makes the callback `entry` (e.g. `"M.init"`) return an error.
pub fn fail_at(entry: &str) {
    JOURNAL.with(|journal| journal.borrow_mut().failing.insert(entry.to_owned()));
}

/// Makes the callback `entry` panic.
pub fn panic_at(entry: &str) {
    JOURNAL.with(|journal| journal.borrow_mut().panicking.insert(entry.to_owned()));
}

/// Everything journaled so far, including pending scope changes.
pub fn entries() -> Vec<String> {
    JOURNAL.with(|journal| {
        let mut journal = journal.borrow_mut();
        journal.sync_scopes();
        journal.entries.clone()
    })
}

/// Like [`entries`], but empties the journal.
pub fn take() -> Vec<String> {
    JOURNAL.with(|journal| {
        let mut journal = journal.borrow_mut();
        journal.sync_scopes();
        std::mem::take(&mut journal.entries)
    })
}

/// How many times `entry` was journaled.
pub fn count(entry: &str) -> usize {
    entries().iter().filter(|e| *e == entry).count()
}

// ============================================================================
// Events
// ============================================================================

/// Test event. Handlers append their owner name to `hits`.
#[derive(Debug, Default)]
pub struct Ping {
    pub game: Option<GameId>,
    pub cancelled: bool,
    pub hits: Vec<String>,
}

impl Ping {
    /// A ping addressed to no game.
    pub fn global() -> Self {
        Self::default()
    }

    /// A ping addressed to `game`.
    pub fn to(game: GameId) -> Self {
        Self {
            game: Some(game),
            ..Self::default()
        }
    }
}

impl Event for Ping {
    fn game(&self) -> Option<GameId> {
        self.game
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

// ============================================================================
// Modules
// ============================================================================

/// Compile-time identity of a [`RecModule`].
pub trait Label: 'static {
    const NAME: &'static str;
    const PRIORITY: Priority = Priority::Normal;
    const IGNORE_CANCELLED: bool = false;
    const CANCELS: bool = false;
}

/// A module that journals every callback and answers [`Ping`].
pub struct RecModule<K> {
    pub resets: u32,
    pub ticks: u32,
    _label: PhantomData<K>,
}

impl<K> Default for RecModule<K> {
    fn default() -> Self {
        Self {
            resets: 0,
            ticks: 0,
            _label: PhantomData,
        }
    }
}

impl<K: Label> Module for RecModule<K> {
    fn name(&self) -> &str {
        K::NAME
    }

    fn listeners() -> Listeners<Self> {
        Listeners::<Self>::new().on_with::<Ping>(K::PRIORITY, K::IGNORE_CANCELLED, |_, _, ping| {
            ping.hits.push(K::NAME.to_owned());
            if K::CANCELS {
                ping.cancelled = true;
            }
            Ok(())
        })
    }

    fn register(&mut self, _game: &Game, _persistent: bool) -> CallbackResult {
        record(K::NAME, "register")
    }

    fn init(&mut self, _game: &Game) -> CallbackResult {
        record(K::NAME, "init")
    }

    fn postinit(&mut self, _game: &Game) -> CallbackResult {
        record(K::NAME, "postinit")
    }

    fn tick(&mut self, _game: &Game) -> CallbackResult {
        self.ticks += 1;
        record(K::NAME, "tick")
    }

    fn predisable(&mut self, _game: &Game) -> CallbackResult {
        record(K::NAME, "predisable")
    }

    fn disable(&mut self, _game: &Game) -> CallbackResult {
        record(K::NAME, "disable")
    }

    fn reset(&mut self, _game: &Game) -> CallbackResult {
        self.resets += 1;
        record(K::NAME, "reset")
    }
}

pub struct M;
impl Label for M {
    const NAME: &'static str = "M";
}

pub struct N;
impl Label for N {
    const NAME: &'static str = "N";
}

pub struct P;
impl Label for P {
    const NAME: &'static str = "P";
}

// ============================================================================
// Phases
// ============================================================================

type Hook = Box<dyn FnMut(&Game)>;

/// A phase that journals every callback and answers [`Ping`].
pub struct RecPhase {
    name: &'static str,
    needs: Manifest,
    admit: bool,
    on_tick: Option<Hook>,
    on_enter: Option<Hook>,
    pub provided: Option<Provision>,
}

impl RecPhase {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            needs: Manifest::new(),
            admit: false,
            on_tick: None,
            on_enter: None,
            provided: None,
        }
    }

    /// Declares `manifest` as this phase's needs.
    pub fn needs(mut self, manifest: Manifest) -> Self {
        self.needs = manifest;
        self
    }

    /// Allows every join query while current.
    pub fn admitting(mut self) -> Self {
        self.admit = true;
        self
    }

    /// Runs `hook` after journaling each tick.
    pub fn ticking(mut self, hook: impl FnMut(&Game) + 'static) -> Self {
        self.on_tick = Some(Box::new(hook));
        self
    }

    /// Runs `hook` after journaling entry.
    pub fn entering(mut self, hook: impl FnMut(&Game) + 'static) -> Self {
        self.on_enter = Some(Box::new(hook));
        self
    }
}

impl Phase for RecPhase {
    fn name(&self) -> &str {
        self.name
    }

    fn manifest(&self) -> Manifest {
        self.needs.clone()
    }

    fn provide(&mut self, provision: &Provision) -> CallbackResult {
        self.provided = Some(provision.clone());
        record(self.name, "provide")
    }

    fn listeners() -> Listeners<Self> {
        Listeners::<Self>::new()
            .on::<Ping>(Priority::Normal, |phase, _, ping| {
                ping.hits.push(phase.name.to_owned());
                Ok(())
            })
            .on::<ParticipantTryJoin>(Priority::Normal, |phase, _, query| {
                if phase.admit {
                    query.allow();
                }
                record(phase.name, "try_join")
            })
            .on::<ParticipantJoined>(Priority::Normal, |phase, _, _| record(phase.name, "joined"))
            .on::<ParticipantDeparting>(Priority::Normal, |phase, game, event| {
                assert!(game.contains_participant(event.participant));
                record(phase.name, "departing")
            })
    }

    fn on_enter(&mut self, game: &Game) -> CallbackResult {
        record(self.name, "on_enter")?;
        if let Some(hook) = self.on_enter.as_mut() {
            hook(game);
        }
        Ok(())
    }

    fn on_exit(&mut self, _game: &Game, formal: bool) -> CallbackResult {
        record(self.name, if formal { "on_exit" } else { "on_exit:stop" })
    }

    fn on_tick(&mut self, game: &Game) -> CallbackResult {
        record(self.name, "on_tick")?;
        if let Some(hook) = self.on_tick.as_mut() {
            hook(game);
        }
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A game on a manual scheduler, with the journal watching `owners`.
pub struct Harness {
    pub game: Game,
    pub bus: Rc<EventBus>,
    pub scheduler: Rc<ManualScheduler>,
}

impl Harness {
    pub fn new(owners: &[&str]) -> Self {
        let bus = Rc::new(EventBus::new());
        watch(&bus, owners);
        Self::on_bus(bus)
    }

    /// A game sharing `bus`. Leaves the journal alone.
    pub fn on_bus(bus: Rc<EventBus>) -> Self {
        let scheduler = Rc::new(ManualScheduler::new());
        let game = Game::builder()
            .bus(Rc::clone(&bus))
            .scheduler(scheduler.clone())
            .build();
        Self {
            game,
            bus,
            scheduler,
        }
    }

    /// Installs a handler that keeps every failure as a string and marks
    /// it handled.
    pub fn collect_failures(&self) -> Rc<RefCell<Vec<String>>> {
        let failures = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&failures);
        self.game.set_failure_handler(move |err| {
            sink.borrow_mut().push(err.to_string());
            Disposition::Handled
        });
        failures
    }
}
