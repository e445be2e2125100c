//! Prometheus-compatible metrics for games, phases, and modules.
//!
//! Phase and module names come from game content, so every label derived
//! from them is sanitized and length-capped before it reaches the recorder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::TickstageError;

/// Guard against double-initialization of the recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Maximum length of a phase or module label.
const MAX_LABEL_LEN: usize = 64;

/// Label used when a transition has no phase on one side.
const NO_PHASE: &str = "__none__";

/// Initializes the global metrics recorder.
///
/// With `Some(port)` a Prometheus scrape endpoint listens on
/// `127.0.0.1:<port>`. With `None` the recorder is installed without an
/// HTTP endpoint.
///
/// # Errors
///
/// Returns `TickstageError::Io` if the recorder or listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), TickstageError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| TickstageError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "tickstage_phase_transitions_total",
        "Total number of phase transitions"
    );
    describe_gauge!(
        "tickstage_current_phase",
        "Currently active phase (1 = active)"
    );
    describe_counter!(
        "tickstage_module_lifecycle_total",
        "Module lifecycle callbacks invoked, by module and step"
    );
    describe_counter!(
        "tickstage_errors_total",
        "Total number of reported failures by category"
    );
    describe_histogram!(
        "tickstage_tick_duration_ms",
        "Wall-clock duration of one tick in milliseconds"
    );
    describe_gauge!("tickstage_participants", "Participants in the roster");
    describe_gauge!("tickstage_games_active", "Games currently running");
}

/// Records a phase transition. `None` stands for "no phase".
pub fn record_phase_transition(from: Option<&str>, to: Option<&str>) {
    counter!(
        "tickstage_phase_transitions_total",
        "from" => sanitize_label(from.unwrap_or(NO_PHASE)),
        "to" => sanitize_label(to.unwrap_or(NO_PHASE))
    )
    .increment(1);
}

/// Sets the current phase gauge.
///
/// Zeroes the previous phase's label first so stale labels do not keep
/// reporting `1.0`.
pub fn set_current_phase(phase_name: Option<&str>, previous_phase: Option<&str>) {
    if let Some(prev) = previous_phase {
        gauge!("tickstage_current_phase", "phase_name" => sanitize_label(prev)).set(0.0);
    }
    if let Some(name) = phase_name {
        gauge!("tickstage_current_phase", "phase_name" => sanitize_label(name)).set(1.0);
    }
}

/// Records one module lifecycle callback (`init`, `disable`, ...).
pub fn record_module_lifecycle(module: &str, step: &'static str) {
    counter!(
        "tickstage_module_lifecycle_total",
        "module" => sanitize_label(module),
        "step" => step
    )
    .increment(1);
}

/// Records a failure by category.
pub fn record_error(category: &str) {
    counter!("tickstage_errors_total", "category" => category.to_owned()).increment(1);
}

/// Records how long one tick took.
pub fn record_tick_duration(duration: Duration) {
    histogram!("tickstage_tick_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Sets the roster size gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_participants(count: usize) {
    gauge!("tickstage_participants").set(count as f64);
}

/// Sets the running games gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_games_active(count: usize) {
    gauge!("tickstage_games_active").set(count as f64);
}

/// Truncates to [`MAX_LABEL_LEN`] characters and replaces characters that
/// are not valid in Prometheus labels with underscores.
fn sanitize_label(name: &str) -> String {
    name.chars()
        .take(MAX_LABEL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
