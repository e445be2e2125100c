//! `tickstage` - orchestration runtime for tick-driven minigames
//!
//! A [`Game`] moves through [`Phase`]s, enabling the [`Module`]s each phase
//! declares in its [`Manifest`], delivering bus events only to the scopes
//! of the game they belong to, and ticking everything at a fixed period.

pub mod bus;
pub mod capability;
pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod game;
mod lifecycle;
pub mod module;
pub mod observability;
pub mod participant;
pub mod phase;
pub mod registry;
pub mod scheduler;

pub use bus::{Event, EventBus, Listeners, Priority};
pub use capability::{Capability, Manifest, Provision};
pub use error::{CallbackError, CallbackResult, Disposition, GameError};
pub use game::{Game, GameBuilder, GameId};
pub use module::{Module, ModuleHandle};
pub use participant::{ParticipantId, ParticipantSource};
pub use phase::Phase;
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::short_type_name;

    struct Plain;
    struct Wrapper<T>(std::marker::PhantomData<T>);

    #[test]
    fn short_type_name_strips_path_and_generics() {
        assert_eq!(short_type_name::<Plain>(), "Plain");
        assert_eq!(short_type_name::<Wrapper<Plain>>(), "Wrapper");
        assert_eq!(short_type_name::<u32>(), "u32");
    }
}
