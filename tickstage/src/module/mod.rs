//! Modules: long-lived game subsystems.
//!
//! A module is enabled when some phase needs it and disabled when the next
//! phase no longer does, unless it is persistent, in which case it stays
//! enabled until the game stops. One instance exists per module type per
//! game.
//!
//! Lifecycle, as driven by the game:
//!
//! 1. `register` once, when the record is created.
//! 2. `reset` each time a phase declares it with `create`.
//! 3. `init` when enabled, after its event scope is registered.
//! 4. `postinit` after every module needed by the incoming phase has run
//!    `init`, including modules that were already enabled.
//! 5. `tick` once per tick while enabled, before the phase ticks.
//! 6. `predisable` for every retiring module, then `disable` for each
//!    after its event scope is unregistered.

pub mod registry;

use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::Listeners;
use crate::error::CallbackResult;
use crate::game::Game;
use crate::short_type_name;

pub use registry::{ModuleEntry, ModuleRegistry, ModuleType};

/// Shared handle to a module instance, as handed to phases.
pub type ModuleHandle<M> = Rc<RefCell<M>>;

/// A game subsystem. Every callback has a no-op default.
pub trait Module: 'static {
    /// Name used in logs, metrics, and errors. Defaults to the type name.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Event handlers registered while the module is enabled.
    fn listeners() -> Listeners<Self>
    where
        Self: Sized,
    {
        Listeners::<Self>::new()
    }

    /// Called once when the module is added to a game.
    fn register(&mut self, _game: &Game, _persistent: bool) -> CallbackResult {
        Ok(())
    }

    /// Called when the module is enabled.
    fn init(&mut self, _game: &Game) -> CallbackResult {
        Ok(())
    }

    /// Called after every needed module has been initialized.
    fn postinit(&mut self, _game: &Game) -> CallbackResult {
        Ok(())
    }

    /// Called once per tick while enabled.
    fn tick(&mut self, _game: &Game) -> CallbackResult {
        Ok(())
    }

    /// Called on every retiring module before any of them is disabled.
    fn predisable(&mut self, _game: &Game) -> CallbackResult {
        Ok(())
    }

    /// Called when the module is disabled.
    fn disable(&mut self, _game: &Game) -> CallbackResult {
        Ok(())
    }

    /// Called whenever a phase declares the module with `create`.
    fn reset(&mut self, _game: &Game) -> CallbackResult {
        Ok(())
    }
}
