//! Configuration validation
//!
//! Runs on a fully deserialized [`RuntimeConfig`] and collects every issue
//! instead of stopping at the first one.

use crate::config::loader::ConfigLimits;
use crate::error::{Severity, ValidationIssue};
use tickstage_core::config::schema::{DemoConfig, ObservabilityConfig, RuntimeConfig, TickConfig};

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &RuntimeConfig, limits: &ConfigLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_tick(&config.tick, limits);
        self.validate_demo(&config.demo);
        self.validate_observability(&config.observability);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn validate_tick(&mut self, tick: &TickConfig, limits: &ConfigLimits) {
        if tick.period_ms == 0 {
            self.add_error("tick.period_ms", "Tick period must be greater than zero");
        } else if tick.period_ms > limits.max_tick_period_ms {
            self.add_error(
                "tick.period_ms",
                format!(
                    "Tick period of {} ms exceeds the maximum of {} ms",
                    tick.period_ms, limits.max_tick_period_ms
                ),
            );
        }
    }

    fn validate_demo(&mut self, demo: &DemoConfig) {
        match demo.participants {
            0 => self.add_error("demo.participants", "At least one participant is required"),
            1 => self.add_warning(
                "demo.participants",
                "A single participant wins as soon as the round starts",
            ),
            _ => {}
        }

        if demo.round_ticks == 0 {
            self.add_error("demo.round_ticks", "Round length must be greater than zero");
        }

        if demo.fuse_ticks >= demo.round_ticks && demo.round_ticks > 0 {
            self.add_warning(
                "demo.fuse_ticks",
                "Hazard fuse is not shorter than the round; no hazard will detonate",
            );
        }
    }

    fn validate_observability(&mut self, observability: &ObservabilityConfig) {
        if observability.metrics_port == Some(0) {
            self.add_error("observability.metrics_port", "Metrics port must not be zero");
        }
        if let Some(path) = &observability.events_file {
            if path.as_os_str().is_empty() {
                self.add_error("observability.events_file", "Events file path is empty");
            }
        }
    }

    fn add_error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }
}
