//! Process-wide registry of running games.
//!
//! A game is added when it starts and removed when it stops. The only
//! reader is the owner-check in scoped dispatch, which drops events
//! addressed to a game that is not running.

use std::sync::LazyLock;

use dashmap::DashSet;

use crate::game::GameId;
use crate::observability::metrics;

pub(crate) static ACTIVE_GAMES: LazyLock<DashSet<GameId>> = LazyLock::new(DashSet::new);

/// Whether the game is currently running.
#[must_use]
pub fn is_active(game: GameId) -> bool {
    ACTIVE_GAMES.contains(&game)
}

/// Identifiers of every running game, in no particular order.
#[must_use]
pub fn active_games() -> Vec<GameId> {
    ACTIVE_GAMES.iter().map(|entry| *entry).collect()
}

/// Number of running games.
#[must_use]
pub fn active_count() -> usize {
    ACTIVE_GAMES.len()
}

pub(crate) fn activate(game: GameId) -> bool {
    let inserted = ACTIVE_GAMES.insert(game);
    metrics::set_games_active(ACTIVE_GAMES.len());
    inserted
}

pub(crate) fn deactivate(game: GameId) -> bool {
    let removed = ACTIVE_GAMES.remove(&game).is_some();
    metrics::set_games_active(ACTIVE_GAMES.len());
    removed
}
