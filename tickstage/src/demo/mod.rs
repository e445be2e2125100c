//! A small elimination match built on the runtime.
//!
//! Participants gather during [`CountdownPhase`], then [`PlayPhase`] arms
//! an [`ArenaModule`] that places timed hazards on random survivors until
//! one is left or the round runs out. [`WinPhase`] records the result on
//! the persistent [`ScoreboardModule`], holds for a while, and stops the
//! game.

mod arena;
mod phases;
mod scoreboard;

use serde::Serialize;

use crate::bus::Event;
use crate::game::{Game, GameBuilder, GameId};
use crate::participant::ParticipantId;
use tickstage_core::config::schema::DemoConfig;

pub use arena::ArenaModule;
pub use phases::{CountdownPhase, PlayPhase, WinPhase};
pub use scoreboard::ScoreboardModule;

/// Timing and randomness of one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSettings {
    /// Ticks before play starts
    pub countdown_ticks: u32,
    /// Ticks before an undecided round is called a draw
    pub round_ticks: u32,
    /// Ticks the result is shown before the game stops
    pub win_hold_ticks: u32,
    /// Ticks between placing a hazard and its detonation
    pub fuse_ticks: u32,
    /// Arena RNG seed
    pub seed: u64,
}

impl MatchSettings {
    /// Settings from configuration; a missing seed is drawn at random.
    #[must_use]
    pub fn from_config(config: &DemoConfig) -> Self {
        Self {
            countdown_ticks: config.countdown_ticks,
            round_ticks: config.round_ticks,
            win_hold_ticks: config.win_hold_ticks,
            fuse_ticks: config.fuse_ticks,
            seed: config.seed.unwrap_or_else(rand::random),
        }
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::from_config(&DemoConfig::default())
    }
}

/// Published by the arena when a hazard takes a participant out.
#[derive(Debug, Clone)]
pub struct Eliminated {
    /// Game the arena belongs to
    pub game: GameId,
    /// Eliminated participant
    pub participant: ParticipantId,
    /// Survivors left
    pub remaining: usize,
}

impl Event for Eliminated {
    fn game(&self) -> Option<GameId> {
        Some(self.game)
    }
}

/// Builds a stopped game set up for a match: the scoreboard registered as
/// persistent and the countdown as the initial phase.
#[must_use]
pub fn build_match(settings: &MatchSettings, builder: GameBuilder) -> Game {
    let game = builder.build();
    game.register_module(ScoreboardModule::default(), true);
    game.set_phase(CountdownPhase::new(settings.clone()));
    game
}

/// Outcome of a finished match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    /// Game identifier
    pub game: GameId,
    /// Rounds completed
    pub rounds: u32,
    /// Winner of the last round; `None` for a draw
    pub winner: Option<ParticipantId>,
    /// Eliminations across all rounds
    pub eliminations: u32,
}

/// Reads the match outcome from the scoreboard.
#[must_use]
pub fn summarize(game: &Game) -> Option<MatchSummary> {
    let scoreboard = game.module::<ScoreboardModule>()?;
    let board = scoreboard.try_borrow().ok()?;
    Some(MatchSummary {
        game: game.id(),
        rounds: board.rounds(),
        winner: board.last_winner(),
        eliminations: board.eliminations(),
    })
}
