//! Error types for `tickstage`.
//!
//! Game-level failures are split by where they come from: wiring
//! (capability resolution), user callbacks (classified by the role of
//! the owner that raised them), and the event bus. [`TickstageError`]
//! aggregates everything the CLI can hit and maps it to an exit code.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::bus::SubscriptionId;

pub use tickstage_core::error::{ConfigError, Severity, ValidationIssue};

// ============================================================================
// Exit Codes
// ============================================================================

/// Process exit codes for the `tickstage` binary.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Game failure (wiring error, escalated callback failure)
    pub const GAME_ERROR: i32 = 5;

    /// Usage error (invalid arguments)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for CLI operations.
#[derive(Debug, Error)]
pub enum TickstageError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A game failed to start, tick, or stop
    #[error(transparent)]
    Game(#[from] GameError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TickstageError {
    /// Returns the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) => ExitCode::CONFIG_ERROR,
            Self::Game(_) => ExitCode::GAME_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Callback Errors
// ============================================================================

/// Failure returned (or panic raised) by a phase or module callback.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    panicked: bool,
}

impl CallbackError {
    /// Creates an error carrying only a message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            panicked: false,
        }
    }

    /// Creates an error wrapping an underlying cause.
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
            panicked: false,
        }
    }

    /// Converts a caught panic payload into an error.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self {
            message: format!("panicked: {detail}"),
            source: None,
            panicked: true,
        }
    }

    /// Runs `f`, turning a panic into an `Err`.
    ///
    /// Any `RefMut` guard captured by `f` is released during unwinding, so
    /// the owner stays usable afterwards.
    pub fn isolate(f: impl FnOnce() -> CallbackResult) -> CallbackResult {
        Self::catch_panic(f).and_then(|result| result)
    }

    /// Runs user code that returns a value, turning a panic into an `Err`.
    ///
    /// # Errors
    ///
    /// Returns the panic, converted with [`Self::from_panic`].
    pub fn catch_panic<T>(f: impl FnOnce() -> T) -> std::result::Result<T, Self> {
        panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Self::from_panic(payload.as_ref()))
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this error came from a caught panic.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        self.panicked
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

/// Result type returned by every phase and module callback.
pub type CallbackResult = std::result::Result<(), CallbackError>;

// ============================================================================
// Event Bus Errors
// ============================================================================

/// Event bus errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The bus was closed; no further subscriptions are accepted.
    #[error("event bus is closed")]
    Closed,

    /// The subscription is not (or no longer) registered.
    #[error("unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),
}

// ============================================================================
// Game Errors
// ============================================================================

/// Role of the owner of a callback or event scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// A game phase.
    Phase,
    /// A module.
    Module,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Phase => f.write_str("phase"),
            Self::Module => f.write_str("module"),
        }
    }
}

/// Capability resolution failures. Fatal to the transition that hit them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    /// A `require` declaration named a module that was never registered.
    #[error("phase '{phase}' requires module '{module}', which is not registered")]
    MissingModule {
        /// Module type name
        module: &'static str,
        /// Declaring phase
        phase: String,
    },

    /// A `create` declaration named an absent module with no factory.
    #[error("phase '{phase}' creates module '{module}', which has no factory and is not registered")]
    Uninstantiable {
        /// Module type name
        module: &'static str,
        /// Declaring phase
        phase: String,
    },
}

/// Failures raised by a game.
#[derive(Debug, Error)]
pub enum GameError {
    /// Capability resolution failed.
    #[error(transparent)]
    Wiring(#[from] WiringError),

    /// A phase callback or phase event handler failed.
    #[error("phase '{phase}' failed in {callback}: {source}")]
    PhaseCallback {
        /// Phase name
        phase: String,
        /// Callback or handler that failed
        callback: String,
        /// Underlying failure
        #[source]
        source: CallbackError,
    },

    /// A module callback or module event handler failed.
    #[error("module '{module}' failed in {callback}: {source}")]
    ModuleCallback {
        /// Module name
        module: String,
        /// Callback or handler that failed
        callback: String,
        /// Underlying failure
        #[source]
        source: CallbackError,
    },

    /// The event bus rejected a scope registration or removal.
    #[error("{context}: {source}")]
    Transition {
        /// What the lifecycle was doing
        context: String,
        /// Bus failure
        #[source]
        source: BusError,
    },

    /// An owner was re-entered while one of its callbacks was running.
    #[error("re-entrant delivery of {event} to {role} '{owner}'")]
    Reentrant {
        /// Owner name
        owner: String,
        /// Owner role
        role: Role,
        /// Event type or callback being delivered
        event: String,
    },
}

impl GameError {
    /// Wraps a callback failure according to the owner's role.
    #[must_use]
    pub fn callback(role: Role, owner: &str, callback: impl Into<String>, source: CallbackError) -> Self {
        match role {
            Role::Phase => Self::PhaseCallback {
                phase: owner.to_owned(),
                callback: callback.into(),
                source,
            },
            Role::Module => Self::ModuleCallback {
                module: owner.to_owned(),
                callback: callback.into(),
                source,
            },
        }
    }

    /// Metrics and event category for this error.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Wiring(_) => "wiring",
            Self::PhaseCallback { .. } => "phase_callback",
            Self::ModuleCallback { .. } => "module_callback",
            Self::Transition { .. } => "transition",
            Self::Reentrant { .. } => "reentrant",
        }
    }
}

/// What the failure handler decided to do with a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// The failure was dealt with; it is logged and dropped.
    Handled,
    /// Surface the failure to the caller of the current operation.
    #[default]
    Escalate,
}

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, TickstageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let config = TickstageError::Config(ConfigError::MissingFile {
            path: "match.yaml".into(),
        });
        assert_eq!(config.exit_code(), ExitCode::CONFIG_ERROR);

        let game = TickstageError::Game(GameError::Wiring(WiringError::MissingModule {
            module: "Arena",
            phase: "play".to_owned(),
        }));
        assert_eq!(game.exit_code(), ExitCode::GAME_ERROR);

        let io = TickstageError::Io(std::io::Error::other("disk"));
        assert_eq!(io.exit_code(), ExitCode::IO_ERROR);
    }

    #[test]
    fn isolate_converts_panics() {
        let result = CallbackError::isolate(|| panic!("fuse blew"));
        let err = result.unwrap_err();
        assert!(err.is_panic());
        assert!(err.message().contains("fuse blew"));
    }

    #[test]
    fn isolate_passes_through_results() {
        assert!(CallbackError::isolate(|| Ok(())).is_ok());
        let err = CallbackError::isolate(|| Err("no arena".into())).unwrap_err();
        assert!(!err.is_panic());
        assert_eq!(err.message(), "no arena");
    }

    #[test]
    fn callback_classification_follows_role() {
        let phase = GameError::callback(Role::Phase, "play", "on_tick", "x".into());
        assert_eq!(phase.category(), "phase_callback");
        assert!(phase.to_string().contains("phase 'play' failed in on_tick"));

        let module = GameError::callback(Role::Module, "arena", "init", "y".into());
        assert_eq!(module.category(), "module_callback");
    }

    #[test]
    fn callback_error_keeps_source() {
        use std::error::Error as _;
        let err = CallbackError::new("spawn failed", std::io::Error::other("no floor"));
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("no floor"));
    }
}
