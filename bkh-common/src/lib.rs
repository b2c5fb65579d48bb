//! # BKH Common Library
//!
//! Shared code for the book harvester crates including:
//! - Error types
//! - Configuration file resolution and loading
//! - Human-readable size parsing (disk buffer thresholds)

pub mod config;
pub mod error;
pub mod human_size;

pub use error::{Error, Result};
