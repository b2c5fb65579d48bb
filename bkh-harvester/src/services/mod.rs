//! Harvest pipeline services

pub mod archive_extractor;
pub mod conversion_client;
pub mod disk_guard;
pub mod harvest_orchestrator;
pub mod identifier_extractor;
pub mod process_runner;
pub mod run_sentinel;
pub mod sru_catalog;

pub use archive_extractor::{ArchiveExtractor, EntryRole, ExtractError, ExtractionSummary, ExtractionTargets};
pub use conversion_client::{ConversionClient, ConversionError};
pub use disk_guard::{BufferPolicy, DiskSpaceGuard};
pub use harvest_orchestrator::HarvestOrchestrator;
pub use identifier_extractor::{IdentifierError, IdentifierExtractor, IdentifierPolicy, KeepMatches};
pub use process_runner::{ProcessCommand, ProcessError, ProcessOutput, ProcessRunner};
pub use run_sentinel::{RunLock, RunSentinel};
pub use sru_catalog::SruCatalogClient;
