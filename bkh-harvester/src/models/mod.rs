//! Data models for the harvester

pub mod archive;
pub mod catalog;
pub mod run_report;
pub mod workflow;

pub use archive::{ArchiveNaming, ArchiveReference, BookRef, NamingError};
pub use catalog::{CatalogIdentifier, CatalogRecord};
pub use run_report::{
    BlockReason, BookFailure, BookReport, ConversionRequestOutcome, FailureKind, HarvestOutcome,
    RunReport, RunState,
};
pub use workflow::{LogLevel, Step, StepStatus, WorkflowRecord};
