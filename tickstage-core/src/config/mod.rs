//! Configuration schema.

pub mod schema;
