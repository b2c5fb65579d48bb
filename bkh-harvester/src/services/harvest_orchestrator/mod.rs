//! Harvest orchestrator
//!
//! One call to [`HarvestOrchestrator::run_once`] is one scheduled pass.
//!
//! # State Progression
//! STARTING → FETCHING → PER_BOOK_LOOP → DRAINING → DONE
//!
//! Any guard failure ends the pass in BLOCKED: before fetching (stop
//! sentinel, another run in progress, low space, fetch failure) or between
//! books (stop sentinel, low space). Books are processed strictly in listed
//! order, one at a time.
//!
//! - **guards** (`phase_guard`): sentinel and free-space checks
//! - **per book** (`phase_book`): create, download, unpack, identify, advance
//! - **draining** (`phase_conversion`): queue conversions for the next pass

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::HarvesterConfig;
use crate::error::Result;
use crate::models::{ArchiveNaming, BlockReason, RunReport, RunState};
use crate::services::{
    ArchiveExtractor, BufferPolicy, ConversionClient, DiskSpaceGuard, IdentifierExtractor,
    RunSentinel,
};
use crate::workflow::{CatalogLookup, WorkflowStore};

mod phase_book;
mod phase_conversion;
mod phase_guard;

/// Harvest orchestrator service
pub struct HarvestOrchestrator {
    config: HarvesterConfig,
    store: Arc<dyn WorkflowStore>,
    catalog: Option<Arc<dyn CatalogLookup>>,
    sentinel: RunSentinel,
    disk_guard: DiskSpaceGuard,
    conversion: ConversionClient,
    extractor: ArchiveExtractor,
    identifiers: IdentifierExtractor,
    naming: ArchiveNaming,
}

impl HarvestOrchestrator {
    /// Wire every component from the configuration
    ///
    /// Fails only when the decrypt passphrase source is configured but
    /// unreadable.
    pub fn new(
        config: HarvesterConfig,
        store: Arc<dyn WorkflowStore>,
        catalog: Option<Arc<dyn CatalogLookup>>,
    ) -> Result<Self> {
        let runner = config.process_runner();
        let passphrase = config.resolve_passphrase()?;
        if passphrase.is_none() {
            warn!("No decrypt passphrase configured, relying on the decrypt command's own agent");
        }

        let sentinel = RunSentinel::new(
            config.sentinels.stop_file.clone(),
            config.sentinels.running_file.clone(),
        );
        let disk_guard = DiskSpaceGuard::new(
            config.storage_root.clone(),
            BufferPolicy::from_config(config.buffer.as_deref()),
        );
        let conversion = ConversionClient::new(
            runner.clone(),
            config.conversion.command.clone(),
            config.conversion.script_dir.clone(),
            config.conversion.site_directory.clone(),
        );
        let extractor = ArchiveExtractor::new(
            runner,
            config.decryption.command.clone(),
            passphrase,
            config.archive.encryption_suffix.clone(),
        );
        let identifiers = IdentifierExtractor::new(
            config.identifier.policy(),
            config.identifier.search_field.clone(),
        );
        let naming = config.archive.clone();

        Ok(Self {
            config,
            store,
            catalog,
            sentinel,
            disk_guard,
            conversion,
            extractor,
            identifiers,
            naming,
        })
    }

    pub fn sentinel(&self) -> &RunSentinel {
        &self.sentinel
    }

    pub fn disk_guard(&self) -> &DiskSpaceGuard {
        &self.disk_guard
    }

    /// Run one harvest pass
    ///
    /// Never panics on book failures; everything that happened is in the
    /// returned report. The run-in-progress sentinel is released on every
    /// path once taken.
    pub async fn run_once(&self) -> RunReport {
        let mut report = RunReport::new();
        info!(run_id = %report.run_id, "Harvest run starting");

        if let Some(reason) = self.check_start_guards() {
            warn!(run_id = %report.run_id, ?reason, "Harvest run blocked");
            report.transition_to(RunState::Blocked { reason });
            return report;
        }

        report.transition_to(RunState::Fetching);
        let references = match self.conversion.list_converted().await {
            Ok(references) => references,
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Could not fetch converted archive list");
                report.transition_to(RunState::Blocked {
                    reason: BlockReason::FetchFailed(e.to_string()),
                });
                return report;
            }
        };
        info!(run_id = %report.run_id, count = references.len(), "Converted archives listed");

        let lock = match self.sentinel.try_acquire_run_lock() {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                warn!(run_id = %report.run_id, "Another harvest run took the lock");
                report.transition_to(RunState::Blocked {
                    reason: BlockReason::AlreadyRunning,
                });
                return report;
            }
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Could not create running file");
                report.transition_to(RunState::Blocked {
                    reason: BlockReason::LockFailed(e.to_string()),
                });
                return report;
            }
        };

        report.transition_to(RunState::PerBookLoop);
        let mut interrupted = None;
        for reference in &references {
            let book = self.process_book(reference).await;
            report.record(book);

            if let Some(reason) = self.check_between_books() {
                warn!(run_id = %report.run_id, ?reason, "Stopping harvest run between books");
                interrupted = Some(reason);
                break;
            }
        }
        lock.release();

        info!(
            run_id = %report.run_id,
            closed = report.closed(),
            skipped = report.skipped(),
            failed = report.failed(),
            "{} records were created",
            report.closed()
        );

        if let Some(reason) = interrupted {
            report.transition_to(RunState::Blocked { reason });
            return report;
        }

        report.transition_to(RunState::Draining);
        report.conversion_request = Some(self.request_conversions().await);

        report.transition_to(RunState::Done);
        report
    }
}
