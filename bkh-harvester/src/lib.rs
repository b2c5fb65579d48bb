//! bkh-harvester library interface
//!
//! Harvests converted book packages from the conversion service into
//! workflow records. The binary drives [`HarvestOrchestrator`]; integration
//! tests drive it directly with their own [`workflow::WorkflowStore`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::config::HarvesterConfig;
pub use crate::error::{HarvestError, Result};
pub use crate::services::HarvestOrchestrator;
