//! `tickstage` core: shared configuration schema and error types.
//!
//! Kept separate from the runtime crate so tools that only read or
//! validate configuration do not pull in the async stack.

pub mod config;
pub mod error;
