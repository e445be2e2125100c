use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tickstage_core::config::schema::TickConfig;

use super::Game;
use crate::bus::EventBus;
use crate::observability::events::EventEmitter;
use crate::participant::{AlwaysReachable, ParticipantSource};
use crate::scheduler::{ManualScheduler, Scheduler};

/// Builder for [`Game`].
///
/// Every collaborator is optional. Unset, a game gets its own bus, a
/// [`ManualScheduler`] (ticks only when the host drives it), a source
/// that reports everyone reachable, and no event output.
pub struct GameBuilder {
    bus: Option<Rc<EventBus>>,
    scheduler: Option<Rc<dyn Scheduler>>,
    source: Option<Rc<dyn ParticipantSource>>,
    emitter: Option<Arc<EventEmitter>>,
    tick_period: Duration,
}

impl Default for GameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GameBuilder {
    /// A builder with default collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bus: None,
            scheduler: None,
            source: None,
            emitter: None,
            tick_period: Duration::from_millis(TickConfig::DEFAULT_PERIOD_MS),
        }
    }

    /// Shares `bus` with other games.
    #[must_use]
    pub fn bus(mut self, bus: Rc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Drives ticks with `scheduler`.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Answers reachability queries with `source`.
    #[must_use]
    pub fn participants(mut self, source: Rc<dyn ParticipantSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Writes lifecycle events to `emitter`.
    #[must_use]
    pub fn emitter(mut self, emitter: Arc<EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Period between scheduled ticks.
    #[must_use]
    pub const fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Builds a stopped game with no phase, participants, or modules.
    #[must_use]
    pub fn build(self) -> Game {
        Game::from_parts(
            self.bus.unwrap_or_else(|| Rc::new(EventBus::new())),
            self.scheduler
                .unwrap_or_else(|| Rc::new(ManualScheduler::new())),
            self.source.unwrap_or_else(|| Rc::new(AlwaysReachable)),
            self.emitter.unwrap_or_else(|| Arc::new(EventEmitter::noop())),
            self.tick_period,
        )
    }
}
