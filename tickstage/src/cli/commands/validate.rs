//! `validate` command handler.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::loader::ConfigLoader;
use crate::error::{ConfigError, TickstageError};

#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl FileReport {
    fn check(loader: &ConfigLoader, path: &Path, strict: bool) -> Self {
        let file = path.display().to_string();
        match loader.load(path) {
            Ok(result) => {
                let warnings: Vec<String> = result
                    .warnings
                    .iter()
                    .map(|w| match &w.location {
                        Some(location) => format!("{} at {location}", w.message),
                        None => w.message.clone(),
                    })
                    .collect();
                Self {
                    file,
                    valid: !(strict && !warnings.is_empty()),
                    errors: Vec::new(),
                    warnings,
                }
            }
            Err(ConfigError::ValidationError { errors, .. }) => Self {
                file,
                valid: false,
                errors: errors.iter().map(ToString::to_string).collect(),
                warnings: Vec::new(),
            },
            Err(err) => Self {
                file,
                valid: false,
                errors: vec![err.to_string()],
                warnings: Vec::new(),
            },
        }
    }
}

/// Validate configuration files without running a match.
///
/// Every file is checked even after a failure.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationFailed`] if any file is invalid, or
/// has warnings under `--strict`.
pub fn run(args: &ValidateArgs) -> Result<(), TickstageError> {
    let loader = ConfigLoader::with_defaults();
    let reports: Vec<FileReport> = args
        .files
        .iter()
        .map(|path| {
            tracing::info!(file = %path.display(), "validating configuration");
            FileReport::check(&loader, path, args.strict)
        })
        .collect();

    match args.format {
        OutputFormat::Human => {
            for report in &reports {
                let status = if report.valid { "ok" } else { "FAILED" };
                println!("{status}: {}", report.file);
                for error in &report.errors {
                    println!("  {error}");
                }
                for warning in &report.warnings {
                    println!("  warning: {warning}");
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    let count = reports.iter().filter(|report| !report.valid).count();
    if count > 0 {
        return Err(ConfigError::ValidationFailed { count }.into());
    }
    Ok(())
}
