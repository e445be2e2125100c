//! Participant identity and reachability.
//!
//! The runtime only stores opaque identifiers. Whether a participant is
//! still connected is answered by a host-supplied [`ParticipantSource`];
//! the game prunes unreachable ones from its roster whenever the roster is
//! inspected and at start.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque participant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// A fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Resolves participant identifiers against the host.
pub trait ParticipantSource {
    /// Whether `participant` is still reachable.
    fn is_reachable(&self, participant: ParticipantId) -> bool;
}

/// Treats every participant as reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

impl ParticipantSource for AlwaysReachable {
    fn is_reachable(&self, _participant: ParticipantId) -> bool {
        true
    }
}

/// A host-side presence table: participants are reachable while connected.
#[derive(Debug, Default)]
pub struct Presence {
    online: RefCell<HashSet<ParticipantId>>,
}

impl Presence {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `participant` as connected.
    pub fn connect(&self, participant: ParticipantId) {
        self.online.borrow_mut().insert(participant);
    }

    /// Marks `participant` as gone.
    pub fn disconnect(&self, participant: ParticipantId) {
        self.online.borrow_mut().remove(&participant);
    }

    /// Number of connected participants.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.online.borrow().len()
    }
}

impl ParticipantSource for Presence {
    fn is_reachable(&self, participant: ParticipantId) -> bool {
        self.online.borrow().contains(&participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(ParticipantId::new(), ParticipantId::new());
    }

    #[test]
    fn presence_tracks_connections() {
        let presence = Presence::new();
        let p = ParticipantId::new();
        assert!(!presence.is_reachable(p));
        presence.connect(p);
        assert!(presence.is_reachable(p));
        assert_eq!(presence.online_count(), 1);
        presence.disconnect(p);
        assert!(!presence.is_reachable(p));
    }

    #[test]
    fn id_serializes_as_plain_uuid() {
        let id = ParticipantId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
