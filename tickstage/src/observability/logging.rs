//! Logging initialization.
//!
//! Structured logging via `tracing` with human-readable and JSON output,
//! verbosity from `-v` counts, and an override through
//! `TICKSTAGE_LOG_LEVEL`.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

use crate::cli::args::ColorChoice;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_LEVEL_ENV: &str = "TICKSTAGE_LOG_LEVEL";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON.
    Json,
}

/// Level applied to the workspace crates for a `-v` count.
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Filter for a `-v` count. Dependencies stay at `warn` until `-vvv`.
fn default_filter(verbosity: u8) -> EnvFilter {
    let level = verbosity_to_directive(verbosity);
    let rest = if verbosity >= 3 { "debug" } else { "warn" };
    EnvFilter::new(format!("{rest},tickstage={level},tickstage_core={level}"))
}

fn wants_ansi(color: ColorChoice) -> bool {
    match color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
    }
}

/// Installs the global subscriber, writing to stderr.
///
/// A parseable `TICKSTAGE_LOG_LEVEL` replaces the `-v` derived filter.
/// Only the first call in a process has an effect.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let filter =
        EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| default_filter(verbosity));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Human => builder.with_ansi(wants_ansi(color)).try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    if installed.is_ok() {
        tracing::debug!(?format, verbosity, "logging initialized");
    }
}
