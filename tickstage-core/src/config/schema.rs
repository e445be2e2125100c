//! Runtime configuration schema.
//!
//! Deserialized from YAML. Every section and field is optional; missing
//! values fall back to the defaults below, so an empty mapping is a
//! complete configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root configuration for a `tickstage` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Tick driver settings
    #[serde(default)]
    pub tick: TickConfig,

    /// Demonstration match settings
    #[serde(default)]
    pub demo: DemoConfig,

    /// Metrics and event output
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================================================
// Tick Driver
// ============================================================================

/// Tick driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct TickConfig {
    /// Period between two ticks, in milliseconds
    #[serde(default = "TickConfig::default_period_ms")]
    pub period_ms: u64,
}

impl TickConfig {
    /// Default tick period: 20 ticks per second.
    pub const DEFAULT_PERIOD_MS: u64 = 50;

    const fn default_period_ms() -> u64 {
        Self::DEFAULT_PERIOD_MS
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period_ms: Self::DEFAULT_PERIOD_MS,
        }
    }
}

// ============================================================================
// Demo Match
// ============================================================================

/// Settings for the bundled elimination match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct DemoConfig {
    /// Number of simulated participants joining before start
    #[serde(default = "DemoConfig::default_participants")]
    pub participants: usize,

    /// Ticks spent in the countdown phase
    #[serde(default = "DemoConfig::default_countdown_ticks")]
    pub countdown_ticks: u32,

    /// Maximum ticks a round may last before it is called
    #[serde(default = "DemoConfig::default_round_ticks")]
    pub round_ticks: u32,

    /// Ticks the result is held before the match stops
    #[serde(default = "DemoConfig::default_win_hold_ticks")]
    pub win_hold_ticks: u32,

    /// Ticks between placing a hazard and its detonation
    #[serde(default = "DemoConfig::default_fuse_ticks")]
    pub fuse_ticks: u32,

    /// RNG seed; random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl DemoConfig {
    const fn default_participants() -> usize {
        4
    }

    const fn default_countdown_ticks() -> u32 {
        100
    }

    const fn default_round_ticks() -> u32 {
        1200
    }

    const fn default_win_hold_ticks() -> u32 {
        200
    }

    const fn default_fuse_ticks() -> u32 {
        40
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            participants: Self::default_participants(),
            countdown_ticks: Self::default_countdown_ticks(),
            round_ticks: Self::default_round_ticks(),
            win_hold_ticks: Self::default_win_hold_ticks(),
            fuse_ticks: Self::default_fuse_ticks(),
            seed: None,
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Metrics exporter and structured event output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Port for the Prometheus scrape endpoint; no exporter when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,

    /// JSONL file receiving lifecycle events; no output when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mapping_uses_defaults() {
        let config: RuntimeConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.tick.period_ms, 50);
        assert_eq!(config.demo.participants, 4);
        assert!(config.demo.seed.is_none());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let yaml = r"
tick:
  period_ms: 10
demo:
  participants: 6
  seed: 42
observability:
  events_file: events.jsonl
";
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tick.period_ms, 10);
        assert_eq!(config.demo.participants, 6);
        assert_eq!(config.demo.seed, Some(42));
        assert_eq!(config.demo.countdown_ticks, 100);
        assert_eq!(
            config.observability.events_file,
            Some(PathBuf::from("events.jsonl"))
        );
        assert!(config.observability.metrics_port.is_none());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<RuntimeConfig, _> = serde_yaml::from_str("tick:\n  period: 5\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_skips_absent_options() {
        let json = serde_json::to_value(RuntimeConfig::default()).unwrap();
        assert!(json["demo"].get("seed").is_none());
        assert!(json["observability"].get("metrics_port").is_none());
        assert_eq!(json["tick"]["period_ms"], 50);
    }
}
