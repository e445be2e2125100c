//! Configuration loader
//!
//! Loading runs in stages:
//! 1. Size check against [`ConfigLimits::max_config_size`]
//! 2. Environment variable expansion (on raw text, before parsing)
//! 3. YAML parsing and deserialization into [`RuntimeConfig`]
//! 4. Validation
//! 5. Freeze with `Arc`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::validation::Validator;
use crate::error::ConfigError;
use tickstage_core::config::schema::RuntimeConfig;

// ============================================================================
// Public API
// ============================================================================

/// Limits applied while loading.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum configuration file size in bytes.
    pub max_config_size: usize,

    /// Largest accepted tick period, in milliseconds.
    pub max_tick_period_ms: u64,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_config_size: env_or("TICKSTAGE_MAX_CONFIG_SIZE", 1024 * 1024),
            max_tick_period_ms: env_or("TICKSTAGE_MAX_TICK_PERIOD_MS", 60_000),
        }
    }
}

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration.
    pub config: Arc<RuntimeConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during configuration loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    limits: ConfigLimits,
}

impl ConfigLoader {
    /// Creates a loader with the given limits.
    #[must_use]
    pub const fn new(limits: ConfigLimits) -> Self {
        Self { limits }
    }

    /// Creates a loader with limits taken from the environment.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ConfigLimits::default())
    }

    /// The limits in effect.
    #[must_use]
    pub const fn limits(&self) -> &ConfigLimits {
        &self.limits
    }

    /// Loads, expands, parses, and validates the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read or exceeds the size limit
    /// - A `${VAR:?message}` reference names an unset variable
    /// - YAML parsing or deserialization fails
    /// - Validation reports errors
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > self.limits.max_config_size {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {} bytes", self.limits.max_config_size),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        debug!(path = %path.display(), bytes = raw.len(), "configuration read");
        self.load_str(&raw, path)
    }

    /// Like [`Self::load`] for text already in memory. `origin` is only
    /// used in messages.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_str(&self, raw: &str, origin: &Path) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut env_sub = EnvSubstitution::new();
        let substituted = env_sub.substitute(raw, origin)?;
        warnings.extend(env_sub.warnings);

        let root: serde_yaml::Value =
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;
        if root.is_null() {
            return Err(ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: None,
                message: "Configuration file is empty".to_string(),
            });
        }

        let config: RuntimeConfig =
            serde_yaml::from_value(root).map_err(|e| ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: format!("Failed to deserialize configuration: {e}"),
            })?;

        let result = Validator::new().validate(&config, &self.limits);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: origin.display().to_string(),
                errors: result.errors,
            });
        }
        warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

/// Pre-parse environment variable substitution.
///
/// Runs on raw YAML text so substituted numbers keep their type.
struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

impl EnvSubstitution {
    const fn new() -> Self {
        Self {
            warnings: Vec::new(),
        }
    }

    /// Supports:
    /// - `${VAR}` - value, or empty string with a warning if unset
    /// - `${VAR:-default}` - `default` if unset
    /// - `${VAR:?message}` - error if unset
    /// - `$$` - literal `$`
    fn substitute(&mut self, raw: &str, origin: &Path) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('{') => {
                    chars.next();
                    let reference = Self::parse_reference(&mut chars, origin)?;
                    match (std::env::var(&reference.name), reference.fallback) {
                        (Ok(value), _) => out.push_str(&value),
                        (Err(_), Some(Fallback::Default(value))) => out.push_str(&value),
                        (Err(_), Some(Fallback::Required(message))) => {
                            return Err(ConfigError::EnvVarNotSet {
                                var: reference.name,
                                location: message,
                            });
                        }
                        (Err(_), None) => self.warnings.push(LoadWarning {
                            message: format!(
                                "Environment variable '{}' is not set, using empty string",
                                reference.name
                            ),
                            location: Some(origin.display().to_string()),
                        }),
                    }
                }
                _ => out.push(c),
            }
        }
        Ok(out)
    }

    fn parse_reference(chars: &mut Chars<'_>, origin: &Path) -> Result<Reference, ConfigError> {
        let mut name = String::new();
        while let Some(c) = chars.next() {
            match c {
                '}' => {
                    return Ok(Reference {
                        name,
                        fallback: None,
                    });
                }
                ':' => match chars.peek() {
                    Some('-') => {
                        chars.next();
                        let value = Self::read_until_close(chars, origin)?;
                        return Ok(Reference {
                            name,
                            fallback: Some(Fallback::Default(value)),
                        });
                    }
                    Some('?') => {
                        chars.next();
                        let message = Self::read_until_close(chars, origin)?;
                        return Ok(Reference {
                            name,
                            fallback: Some(Fallback::Required(message)),
                        });
                    }
                    _ => name.push(':'),
                },
                _ => name.push(c),
            }
        }
        Err(unclosed(origin, &name))
    }

    /// Reads up to the matching `}`, keeping nested braces.
    fn read_until_close(chars: &mut Chars<'_>, origin: &Path) -> Result<String, ConfigError> {
        let mut value = String::new();
        let mut depth = 1_u32;
        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(value);
                    }
                }
                _ => {}
            }
            value.push(c);
        }
        Err(unclosed(origin, &value))
    }
}

struct Reference {
    name: String,
    fallback: Option<Fallback>,
}

enum Fallback {
    Default(String),
    Required(String),
}

fn unclosed(origin: &Path, partial: &str) -> ConfigError {
    ConfigError::ParseError {
        path: PathBuf::from(origin),
        line: None,
        message: format!("Unclosed environment variable reference: ${{{partial}"),
    }
}

/// Parses an environment variable with a default value.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_env_substitution_simple() {
        let mut sub = EnvSubstitution::new();
        let result = sub.substitute("path: ${PATH}", Path::new("test.yaml")).unwrap();
        assert!(!result.contains("${PATH}"));
        assert!(result.len() > "path: ".len());
    }

    #[test]
    fn test_env_substitution_default() {
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute(
                "period_ms: ${TICKSTAGE_TEST_UNSET_PERIOD_XYZ:-75}",
                Path::new("test.yaml"),
            )
            .unwrap();
        assert_eq!(result, "period_ms: 75");
        assert!(sub.warnings.is_empty());
    }

    #[test]
    fn test_env_substitution_required_missing() {
        let mut sub = EnvSubstitution::new();
        let err = sub
            .substitute(
                "seed: ${TICKSTAGE_TEST_REQUIRED_XYZ:?seed must be set}",
                Path::new("test.yaml"),
            )
            .unwrap_err();
        match err {
            ConfigError::EnvVarNotSet { var, location } => {
                assert_eq!(var, "TICKSTAGE_TEST_REQUIRED_XYZ");
                assert_eq!(location, "seed must be set");
            }
            other => panic!("expected EnvVarNotSet, got {other:?}"),
        }
    }

    #[test]
    fn test_env_substitution_escaped_dollar() {
        let mut sub = EnvSubstitution::new();
        let result = sub.substitute("note: $$5 and $x", Path::new("test.yaml")).unwrap();
        assert_eq!(result, "note: $5 and $x");
    }

    #[test]
    fn test_env_substitution_missing_warning() {
        let mut sub = EnvSubstitution::new();
        let result = sub
            .substitute("value: ${TICKSTAGE_TEST_WARN_XYZ}", Path::new("test.yaml"))
            .unwrap();
        assert_eq!(result, "value: ");
        assert_eq!(sub.warnings.len(), 1);
        assert!(sub.warnings[0].message.contains("TICKSTAGE_TEST_WARN_XYZ"));
    }

    #[test]
    fn test_env_substitution_unclosed() {
        let mut sub = EnvSubstitution::new();
        let err = sub.substitute("value: ${OPEN", Path::new("test.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_load_file() {
        let file = write_config(
            "tick:\n  period_ms: 20\ndemo:\n  participants: 6\n  seed: 42\n",
        );
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert_eq!(result.config.tick.period_ms, 20);
        assert_eq!(result.config.demo.participants, 6);
        assert_eq!(result.config.demo.seed, Some(42));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_load_strips_bom() {
        let file = write_config("\u{feff}tick:\n  period_ms: 10\n");
        let result = ConfigLoader::with_defaults().load(file.path()).unwrap();
        assert_eq!(result.config.tick.period_ms, 10);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ConfigLoader::with_defaults()
            .load(Path::new("/nonexistent/tickstage.yaml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn test_load_empty_file() {
        let file = write_config("");
        let err = ConfigLoader::with_defaults().load(file.path()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let file = write_config("tick:\n  period: 20\n");
        let err = ConfigLoader::with_defaults().load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_load_enforces_size_limit() {
        let file = write_config("tick:\n  period_ms: 20\n");
        let loader = ConfigLoader::new(ConfigLimits {
            max_config_size: 4,
            ..ConfigLimits::default()
        });
        let err = loader.load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "file_size"));
    }

    #[test]
    fn test_load_reports_validation_errors() {
        let file = write_config("tick:\n  period_ms: 0\ndemo:\n  participants: 0\n");
        let err = ConfigLoader::with_defaults().load(file.path()).unwrap_err();
        match err {
            ConfigError::ValidationError { errors, .. } => {
                let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
                assert!(paths.contains(&"tick.period_ms"));
                assert!(paths.contains(&"demo.participants"));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_warnings_become_load_warnings() {
        let result = ConfigLoader::with_defaults()
            .load_str("demo:\n  participants: 1\n", Path::new("inline.yaml"))
            .unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].location.as_deref(), Some("demo.participants"));
    }
}
