use tracing::info;

use super::{ArenaModule, Eliminated, MatchSettings, ScoreboardModule};
use crate::bus::{Listeners, ParticipantTryJoin, Priority};
use crate::capability::{Manifest, Provision};
use crate::error::{CallbackError, CallbackResult};
use crate::game::Game;
use crate::module::ModuleHandle;
use crate::participant::ParticipantId;
use crate::phase::Phase;

fn stop_game(game: &Game) -> CallbackResult {
    game.stop()
        .map_err(|err| CallbackError::new("failed to stop the game", err))
}

// ============================================================================
// Countdown
// ============================================================================

/// Lobby before play. Admits joiners and counts down.
#[derive(Debug)]
pub struct CountdownPhase {
    settings: MatchSettings,
    remaining: u32,
}

impl CountdownPhase {
    /// A countdown of `settings.countdown_ticks`.
    #[must_use]
    pub const fn new(settings: MatchSettings) -> Self {
        let remaining = settings.countdown_ticks;
        Self { settings, remaining }
    }

    /// Ticks left before play starts.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Phase for CountdownPhase {
    fn name(&self) -> &str {
        "countdown"
    }

    fn manifest(&self) -> Manifest {
        Manifest::new().optional::<ScoreboardModule>()
    }

    fn listeners() -> Listeners<Self> {
        Listeners::<Self>::new().on::<ParticipantTryJoin>(Priority::Normal, |_, _, query| {
            query.allow();
            Ok(())
        })
    }

    fn on_enter(&mut self, game: &Game) -> CallbackResult {
        info!(
            game = %game.id(),
            ticks = self.remaining,
            participants = game.participant_count(),
            "countdown started"
        );
        Ok(())
    }

    fn on_tick(&mut self, game: &Game) -> CallbackResult {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return Ok(());
        }
        if game.participant_count() == 0 {
            info!(game = %game.id(), "nobody joined; stopping");
            return stop_game(game);
        }
        game.set_phase(PlayPhase::new(self.settings.clone()));
        Ok(())
    }
}

// ============================================================================
// Play
// ============================================================================

/// The round itself. Late joiners are turned away, since no handler
/// allows them.
#[derive(Debug)]
pub struct PlayPhase {
    settings: MatchSettings,
    arena: Option<ModuleHandle<ArenaModule>>,
    elapsed: u32,
}

impl PlayPhase {
    /// A round using `settings`.
    #[must_use]
    pub const fn new(settings: MatchSettings) -> Self {
        Self {
            settings,
            arena: None,
            elapsed: 0,
        }
    }
}

impl Phase for PlayPhase {
    fn name(&self) -> &str {
        "play"
    }

    fn manifest(&self) -> Manifest {
        Manifest::new()
            .create::<ArenaModule>()
            .require::<ScoreboardModule>()
    }

    fn provide(&mut self, provision: &Provision) -> CallbackResult {
        self.arena = provision.module::<ArenaModule>();
        if self.arena.is_none() {
            return Err("arena module was not provided".into());
        }
        Ok(())
    }

    fn listeners() -> Listeners<Self> {
        Listeners::<Self>::new().on::<Eliminated>(Priority::Normal, |_, game, event| {
            info!(
                game = %game.id(),
                participant = %event.participant,
                remaining = event.remaining,
                "participant eliminated"
            );
            Ok(())
        })
    }

    fn on_enter(&mut self, game: &Game) -> CallbackResult {
        let Some(arena) = &self.arena else {
            return Err("arena module was not provided".into());
        };
        let participants = game.participants();
        info!(game = %game.id(), participants = participants.len(), seed = self.settings.seed, "round started");
        arena
            .try_borrow_mut()
            .map_err(|err| CallbackError::new("arena is busy", err.to_string()))?
            .arm(participants, self.settings.fuse_ticks, self.settings.seed);
        Ok(())
    }

    fn on_tick(&mut self, game: &Game) -> CallbackResult {
        self.elapsed += 1;
        let Some(arena) = &self.arena else {
            return Ok(());
        };
        let survivors = arena
            .try_borrow()
            .map_err(|err| CallbackError::new("arena is busy", err.to_string()))?
            .survivors();

        let winner = match survivors.as_slice() {
            [] => None,
            [winner] => Some(*winner),
            _ if self.elapsed >= self.settings.round_ticks => {
                info!(game = %game.id(), survivors = survivors.len(), "round timed out");
                None
            }
            _ => return Ok(()),
        };
        game.set_phase(WinPhase::new(winner, self.settings.win_hold_ticks));
        Ok(())
    }
}

// ============================================================================
// Win
// ============================================================================

/// Shows the result, then stops the game.
#[derive(Debug)]
pub struct WinPhase {
    winner: Option<ParticipantId>,
    remaining: u32,
    scoreboard: Option<ModuleHandle<ScoreboardModule>>,
}

impl WinPhase {
    /// Holds the result for `hold_ticks`. `None` is a draw.
    #[must_use]
    pub const fn new(winner: Option<ParticipantId>, hold_ticks: u32) -> Self {
        Self {
            winner,
            remaining: hold_ticks,
            scoreboard: None,
        }
    }
}

impl Phase for WinPhase {
    fn name(&self) -> &str {
        "win"
    }

    fn manifest(&self) -> Manifest {
        Manifest::new().require::<ScoreboardModule>()
    }

    fn provide(&mut self, provision: &Provision) -> CallbackResult {
        self.scoreboard = provision.module::<ScoreboardModule>();
        Ok(())
    }

    fn on_enter(&mut self, game: &Game) -> CallbackResult {
        if let Some(scoreboard) = &self.scoreboard {
            scoreboard
                .try_borrow_mut()
                .map_err(|err| CallbackError::new("scoreboard is busy", err.to_string()))?
                .record_round(self.winner);
        }
        match self.winner {
            Some(winner) => info!(game = %game.id(), %winner, "round won"),
            None => info!(game = %game.id(), "round drawn"),
        }
        if self.remaining == 0 {
            return stop_game(game);
        }
        Ok(())
    }

    fn on_tick(&mut self, game: &Game) -> CallbackResult {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            return stop_game(game);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::build_match;
    use crate::scheduler::ManualScheduler;
    use std::rc::Rc;

    fn settings() -> MatchSettings {
        MatchSettings {
            countdown_ticks: 2,
            round_ticks: 3,
            win_hold_ticks: 1,
            fuse_ticks: 50,
            seed: 1,
        }
    }

    #[test]
    fn test_countdown_admits_joiners() {
        let game = build_match(&settings(), Game::builder());
        game.start().unwrap();
        assert!(game.add_participant(ParticipantId::new()));
        assert_eq!(game.participant_count(), 1);
    }

    #[test]
    fn test_play_turns_late_joiners_away() {
        let game = build_match(&settings(), Game::builder());
        game.add_participant(ParticipantId::new());
        game.add_participant(ParticipantId::new());
        game.start().unwrap();
        game.tick().unwrap();
        game.tick().unwrap();
        assert_eq!(game.current_phase_name().as_deref(), Some("play"));
        assert!(game.is_module_enabled::<ArenaModule>());

        assert!(!game.add_participant(ParticipantId::new()));
        assert_eq!(game.participant_count(), 2);
    }

    #[test]
    fn test_round_timeout_is_a_draw() {
        let scheduler = Rc::new(ManualScheduler::new());
        let game = build_match(&settings(), Game::builder().scheduler(scheduler.clone()));
        game.add_participant(ParticipantId::new());
        game.add_participant(ParticipantId::new());
        game.start().unwrap();
        scheduler.run(10);

        assert!(!game.is_running());
        let board = game.module::<ScoreboardModule>().unwrap();
        assert_eq!(board.borrow().draws(), 1);
        assert!(board.borrow().last_winner().is_none());
        assert!(!game.is_module_enabled::<ArenaModule>());
    }

    #[test]
    fn test_empty_lobby_stops() {
        let game = build_match(&settings(), Game::builder());
        game.start().unwrap();
        game.tick().unwrap();
        game.tick().unwrap();
        assert!(!game.is_running());
    }
}
