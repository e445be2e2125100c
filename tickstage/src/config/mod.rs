//! Runtime configuration: loading and validation.
//!
//! The schema lives in `tickstage-core`; this module reads it from YAML
//! files with environment expansion and checks it before a run.

pub mod loader;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning};
pub use tickstage_core::config::schema::*;
pub use validation::{ValidationResult, Validator};
