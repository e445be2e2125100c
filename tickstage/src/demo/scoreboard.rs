use indexmap::IndexMap;
use tracing::info;

use super::Eliminated;
use crate::bus::{Listeners, Priority};
use crate::error::CallbackResult;
use crate::game::Game;
use crate::module::Module;
use crate::participant::ParticipantId;

/// Results across rounds. Registered as persistent, so it stays enabled
/// from the first phase that uses it until the game stops.
#[derive(Debug, Default)]
pub struct ScoreboardModule {
    wins: IndexMap<ParticipantId, u32>,
    rounds: u32,
    draws: u32,
    eliminations: u32,
    last_winner: Option<ParticipantId>,
}

impl ScoreboardModule {
    /// Records the end of a round. `None` is a draw.
    pub fn record_round(&mut self, winner: Option<ParticipantId>) {
        self.rounds += 1;
        self.last_winner = winner;
        match winner {
            Some(winner) => *self.wins.entry(winner).or_default() += 1,
            None => self.draws += 1,
        }
    }

    /// Rounds recorded.
    #[must_use]
    pub const fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Rounds without a winner.
    #[must_use]
    pub const fn draws(&self) -> u32 {
        self.draws
    }

    /// Eliminations seen across all rounds.
    #[must_use]
    pub const fn eliminations(&self) -> u32 {
        self.eliminations
    }

    /// Winner of the most recent round.
    #[must_use]
    pub const fn last_winner(&self) -> Option<ParticipantId> {
        self.last_winner
    }

    /// Rounds won by `participant`.
    #[must_use]
    pub fn wins_of(&self, participant: ParticipantId) -> u32 {
        self.wins.get(&participant).copied().unwrap_or_default()
    }
}

impl Module for ScoreboardModule {
    fn name(&self) -> &str {
        "scoreboard"
    }

    fn listeners() -> Listeners<Self> {
        Listeners::<Self>::new().on::<Eliminated>(Priority::Monitor, |board, _, _| {
            board.eliminations += 1;
            Ok(())
        })
    }

    fn disable(&mut self, game: &Game) -> CallbackResult {
        info!(
            game = %game.id(),
            rounds = self.rounds,
            draws = self.draws,
            eliminations = self.eliminations,
            "final standings"
        );
        Ok(())
    }
}
