//! Structured lifecycle event stream.
//!
//! Discrete, typed records of what a game did: start and stop, phase
//! entry and exit, module enablement, roster changes, and reported
//! failures. Serialized as newline-delimited JSON with a monotonically
//! increasing sequence number.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::game::GameId;
use crate::participant::ParticipantId;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A lifecycle record emitted by a running game.
///
/// Tagged with `"type"` when serialized so consumers can dispatch on the
/// kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    /// The game started running.
    GameStarted {
        /// When the game started.
        timestamp: DateTime<Utc>,
        /// Game identifier.
        game: GameId,
        /// Roster size at start.
        participants: usize,
    },

    /// The game stopped.
    GameStopped {
        /// When the game stopped.
        timestamp: DateTime<Utc>,
        /// Game identifier.
        game: GameId,
        /// Number of failures collected during shutdown.
        failures: usize,
    },

    /// A phase became current.
    PhaseEntered {
        /// When the phase was installed.
        timestamp: DateTime<Utc>,
        /// Game identifier.
        game: GameId,
        /// Name of the phase.
        phase: String,
    },

    /// A phase was retired.
    PhaseExited {
        /// When the phase was retired.
        timestamp: DateTime<Utc>,
        /// Game identifier.
        game: GameId,
        /// Name of the phase.
        phase: String,
        /// Whether the exit was a formal transition.
        formal: bool,
    },

    /// A module was enabled.
    ModuleEnabled {
        /// When the module was enabled.
        timestamp: DateTime<Utc>,
        /// Game identifier.
        game: GameId,
        /// Name of the module.
        module: String,
    },

    /// A module was disabled.
    ModuleDisabled {
        /// When the module was disabled.
        timestamp: DateTime<Utc>,
        /// Game identifier.
        game: GameId,
        /// Name of the module.
        module: String,
    },

    /// A participant was admitted.
    ParticipantJoined {
        /// When the participant joined.
        timestamp: DateTime<Utc>,
        /// Game identifier.
        game: GameId,
        /// The participant.
        participant: ParticipantId,
    },

    /// A participant left or was pruned.
    ParticipantLeft {
        /// When the participant left.
        timestamp: DateTime<Utc>,
        /// Game identifier.
        game: GameId,
        /// The participant.
        participant: ParticipantId,
    },

    /// A callback or transition failure was reported.
    FailureReported {
        /// When the failure was reported.
        timestamp: DateTime<Utc>,
        /// Game identifier.
        game: GameId,
        /// Failure category (`phase_callback`, `wiring`, ...).
        category: String,
        /// Rendered error message.
        message: String,
        /// Whether the failure was escalated.
        escalated: bool,
    },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: LifecycleEvent,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL writer.
///
/// Each [`emit`](Self::emit) takes the next sequence number, writes one
/// line, and flushes. Serialization and I/O failures are dropped; event
/// output never interrupts a game.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter writing to `writer`.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter writing to a new file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Writes `event` as a single JSONL line.
    pub fn emit(&self, event: LifecycleEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
