use indexmap::IndexSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::Eliminated;
use crate::bus::{Listeners, ParticipantDeparting, Priority};
use crate::error::CallbackResult;
use crate::game::Game;
use crate::module::Module;
use crate::participant::ParticipantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hazard {
    target: ParticipantId,
    fuse: u32,
}

/// Playing field of one round.
///
/// Idle until [`ArenaModule::arm`]. While armed, each tick burns down the
/// pending hazard's fuse; when it reaches zero its target is eliminated
/// and a new hazard is placed on a random survivor.
#[derive(Debug, Default)]
pub struct ArenaModule {
    alive: IndexSet<ParticipantId>,
    eliminated: Vec<ParticipantId>,
    hazard: Option<Hazard>,
    fuse_ticks: u32,
    rng: Option<StdRng>,
}

impl ArenaModule {
    /// Starts a round with `participants`.
    pub fn arm(&mut self, participants: impl IntoIterator<Item = ParticipantId>, fuse_ticks: u32, seed: u64) {
        self.alive = participants.into_iter().collect();
        self.eliminated.clear();
        self.hazard = None;
        self.fuse_ticks = fuse_ticks;
        self.rng = Some(StdRng::seed_from_u64(seed));
    }

    /// Whether a round is in progress.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.rng.is_some()
    }

    /// Participants still in, in join order.
    #[must_use]
    pub fn survivors(&self) -> Vec<ParticipantId> {
        self.alive.iter().copied().collect()
    }

    /// Number of participants still in.
    #[must_use]
    pub fn survivor_count(&self) -> usize {
        self.alive.len()
    }

    /// Participants eliminated this round, in order.
    #[must_use]
    pub fn eliminated(&self) -> &[ParticipantId] {
        &self.eliminated
    }

    /// Target of the pending hazard.
    #[must_use]
    pub fn hazard_target(&self) -> Option<ParticipantId> {
        self.hazard.map(|hazard| hazard.target)
    }

    fn place_hazard(&mut self) {
        let Some(rng) = self.rng.as_mut() else {
            return;
        };
        if self.alive.len() < 2 {
            self.hazard = None;
            return;
        }
        let index = rng.random_range(0..self.alive.len());
        self.hazard = self.alive.get_index(index).map(|target| Hazard {
            target: *target,
            fuse: self.fuse_ticks,
        });
        debug!(target = ?self.hazard_target(), fuse = self.fuse_ticks, "hazard placed");
    }

    fn depart(&mut self, participant: ParticipantId) {
        if !self.alive.shift_remove(&participant) {
            return;
        }
        if self.hazard_target() == Some(participant) {
            self.place_hazard();
        }
    }
}

impl Module for ArenaModule {
    fn name(&self) -> &str {
        "arena"
    }

    fn listeners() -> Listeners<Self> {
        Listeners::<Self>::new().on::<ParticipantDeparting>(Priority::Normal, |arena, _, event| {
            arena.depart(event.participant);
            Ok(())
        })
    }

    fn reset(&mut self, _game: &Game) -> CallbackResult {
        *self = Self::default();
        Ok(())
    }

    fn tick(&mut self, game: &Game) -> CallbackResult {
        if !self.is_armed() {
            return Ok(());
        }
        let Some(mut hazard) = self.hazard else {
            self.place_hazard();
            return Ok(());
        };

        hazard.fuse = hazard.fuse.saturating_sub(1);
        if hazard.fuse > 0 {
            self.hazard = Some(hazard);
            return Ok(());
        }

        self.hazard = None;
        if self.alive.shift_remove(&hazard.target) {
            self.eliminated.push(hazard.target);
            game.publish(&mut Eliminated {
                game: game.id(),
                participant: hazard.target,
                remaining: self.alive.len(),
            });
        }
        self.place_hazard();
        Ok(())
    }

    fn disable(&mut self, _game: &Game) -> CallbackResult {
        self.rng = None;
        self.hazard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players(n: u128) -> Vec<ParticipantId> {
        (0..n)
            .map(|i| ParticipantId::from_uuid(uuid::Uuid::from_u128(i)))
            .collect()
    }

    #[test]
    fn test_idle_until_armed() {
        let game = Game::builder().build();
        let mut arena = ArenaModule::default();
        arena.tick(&game).unwrap();
        assert!(arena.hazard_target().is_none());
        assert!(!arena.is_armed());
    }

    #[test]
    fn test_hazard_eliminates_after_fuse() {
        let game = Game::builder().build();
        let mut arena = ArenaModule::default();
        arena.arm(players(3), 2, 1);

        arena.tick(&game).unwrap();
        let target = arena.hazard_target().unwrap();
        arena.tick(&game).unwrap();
        assert_eq!(arena.survivor_count(), 3);
        arena.tick(&game).unwrap();

        assert_eq!(arena.eliminated(), [target]);
        assert_eq!(arena.survivor_count(), 2);
        assert!(!arena.survivors().contains(&target));
        assert!(arena.hazard_target().is_some());
    }

    #[test]
    fn test_last_survivor_gets_no_hazard() {
        let game = Game::builder().build();
        let mut arena = ArenaModule::default();
        arena.arm(players(2), 1, 5);
        for _ in 0..4 {
            arena.tick(&game).unwrap();
        }
        assert_eq!(arena.survivor_count(), 1);
        assert!(arena.hazard_target().is_none());
    }

    #[test]
    fn test_departing_target_moves_hazard() {
        let game = Game::builder().build();
        let mut arena = ArenaModule::default();
        arena.arm(players(3), 10, 3);
        arena.tick(&game).unwrap();
        let target = arena.hazard_target().unwrap();

        arena.depart(target);
        assert_eq!(arena.survivor_count(), 2);
        let next = arena.hazard_target().unwrap();
        assert_ne!(next, target);
    }

    #[test]
    fn test_reset_disarms() {
        let game = Game::builder().build();
        let mut arena = ArenaModule::default();
        arena.arm(players(2), 3, 0);
        arena.reset(&game).unwrap();
        assert!(!arena.is_armed());
        assert_eq!(arena.survivor_count(), 0);
    }
}
