//! Configuration and validation error types shared across the workspace.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}{}: {message}", line.map_or_else(String::new, |l| format!(" (line {l})")))]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// Validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Configuration file not found or unreadable
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the offending field
        field: String,
        /// The value provided
        value: String,
        /// What was expected
        expected: String,
    },

    /// A `${VAR:?msg}` reference named an unset variable
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location or message attached to the reference
        location: String,
    },

    /// One or more files passed to `validate` failed.
    #[error("{count} file(s) failed validation")]
    ValidationFailed {
        /// Number of files that failed.
        count: usize,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single issue found while validating a configuration.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Dotted path to the field (e.g. `tick.period_ms`)
    pub path: String,
    /// Description of the issue
    pub message: String,
    /// Severity level
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the configuration from being used
    Error,
    /// Reported, but the configuration still loads
    Warning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "tick.period_ms".to_string(),
            message: "period must be positive".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: period must be positive at tick.period_ms"
        );
    }

    #[test]
    fn test_validation_issue_warning_display() {
        let issue = ValidationIssue {
            path: "demo.participants".to_string(),
            message: "a single participant wins immediately".to_string(),
            severity: Severity::Warning,
        };
        assert_eq!(
            issue.to_string(),
            "warning: a single participant wins immediately at demo.participants"
        );
    }

    #[test]
    fn test_parse_error_display_includes_line() {
        let err = ConfigError::ParseError {
            path: PathBuf::from("match.yaml"),
            line: Some(7),
            message: "unexpected token".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("match.yaml"));
        assert!(text.contains("(line 7)"));
        assert!(text.contains("unexpected token"));
    }

    #[test]
    fn test_env_var_error_display() {
        let err = ConfigError::EnvVarNotSet {
            var: "ARENA_SEED".to_string(),
            location: "demo.seed".to_string(),
        };
        assert!(err.to_string().contains("ARENA_SEED"));
        assert!(err.to_string().contains("demo.seed"));
    }
}
