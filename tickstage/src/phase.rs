//! Phases: the discrete stages a game moves through.
//!
//! A phase instance is constructed by game content, handed to
//! [`Game::set_phase`], installed (`provide`, then `on_enter`), ticked any
//! number of times, retired (`on_exit`), and dropped. It is never
//! reinstalled.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::bus::{EventScope, Listeners};
use crate::capability::{Manifest, Provision};
use crate::error::{CallbackError, CallbackResult, Role};
use crate::game::Game;
use crate::short_type_name;

/// A game phase. Every callback except `name` has a no-op default.
///
/// The `&Game` passed to each callback is only valid for that call; a
/// phase must not keep a clone of it across calls.
pub trait Phase: 'static {
    /// Name used in logs, metrics, and errors. Defaults to the type name.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Modules this phase needs, in declaration order.
    fn manifest(&self) -> Manifest {
        Manifest::new()
    }

    /// Receives the resolved modules before `on_enter`.
    fn provide(&mut self, _provision: &Provision) -> CallbackResult {
        Ok(())
    }

    /// Event handlers registered while the phase is current.
    fn listeners() -> Listeners<Self>
    where
        Self: Sized,
    {
        Listeners::<Self>::new()
    }

    /// Called once when the phase becomes current.
    fn on_enter(&mut self, _game: &Game) -> CallbackResult {
        Ok(())
    }

    /// Called once when the phase is retired. `formal` is `false` when the
    /// game is stopping.
    fn on_exit(&mut self, _game: &Game, _formal: bool) -> CallbackResult {
        Ok(())
    }

    /// Called once per tick, after every enabled module ticked.
    fn on_tick(&mut self, _game: &Game) -> CallbackResult {
        Ok(())
    }
}

type PhaseScopeBuilder = Box<dyn FnOnce(&Game) -> EventScope>;

/// A phase instance owned by a game, current or about to be.
pub(crate) struct PhaseSlot {
    pub(crate) name: String,
    pub(crate) instance: Rc<RefCell<dyn Phase>>,
    pub(crate) scope: Option<EventScope>,
    scope_builder: Option<PhaseScopeBuilder>,
}

impl fmt::Debug for PhaseSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseSlot")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl PhaseSlot {
    pub(crate) fn new<P: Phase>(phase: P) -> Self {
        let name = phase.name().to_owned();
        let cell = Rc::new(RefCell::new(phase));
        let weak = Rc::downgrade(&cell);
        let scope_name = name.clone();
        let scope_builder: PhaseScopeBuilder = Box::new(move |game: &Game| {
            EventScope::build(weak, &scope_name, Role::Phase, game, P::listeners())
        });
        Self {
            name,
            instance: cell,
            scope: None,
            scope_builder: Some(scope_builder),
        }
    }

    /// Builds the event scope. Only the first call has an effect.
    ///
    /// `listeners()` runs here; a panic in it is returned.
    pub(crate) fn build_scope(&mut self, game: &Game) -> Result<(), CallbackError> {
        if let Some(build) = self.scope_builder.take() {
            self.scope = Some(CallbackError::catch_panic(|| build(game))?);
        }
        Ok(())
    }
}
