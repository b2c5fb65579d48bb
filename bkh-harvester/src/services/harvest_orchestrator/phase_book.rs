//! PER_BOOK_LOOP: one archive to one workflow record
//!
//! Failure handling depends on the stage:
//! - before the record exists: nothing to undo
//! - download / decrypt / unpack: the record and its directory are deleted
//! - metadata (document, identifier, catalog): the record is kept, its first
//!   step is set to ERROR and an error log entry is added

use tracing::{error, info, warn};

use super::HarvestOrchestrator;
use crate::config::MetadataStrategy;
use crate::error::Result;
use crate::models::{
    ArchiveReference, BookRef, BookReport, CatalogIdentifier, HarvestOutcome, LogLevel,
    StepStatus, WorkflowRecord,
};
use crate::services::{ExtractionSummary, ExtractionTargets};
use crate::workflow::CatalogError;

impl HarvestOrchestrator {
    /// Process one archive reference; never fails the pass
    pub(super) async fn process_book(&self, reference: &ArchiveReference) -> BookReport {
        let book = match self.naming.book(reference) {
            Ok(book) => book,
            Err(e) => {
                error!(reference = %reference, error = %e, "Unusable archive reference");
                return BookReport {
                    reference: reference.clone(),
                    title: None,
                    outcome: HarvestOutcome::aborted(e.to_string()),
                };
            }
        };

        let outcome = self.harvest_book(&book).await;
        BookReport {
            reference: book.reference,
            title: Some(book.title),
            outcome,
        }
    }

    async fn harvest_book(&self, book: &BookRef) -> HarvestOutcome {
        match self.store.record_exists(&book.title).await {
            Ok(true) => {
                info!(reference = %book.reference, title = %book.title, "Record already exists, skipping");
                return HarvestOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => {
                error!(reference = %book.reference, title = %book.title, error = %e, "Record lookup failed");
                return HarvestOutcome::aborted(format!("record lookup failed: {}", e));
            }
        }

        let record = match self
            .store
            .create_from_template(&self.config.template_title, &book.title)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                error!(
                    reference = %book.reference,
                    title = %book.title,
                    template = %self.config.template_title,
                    error = %e,
                    "Record creation failed"
                );
                return HarvestOutcome::aborted(format!("record creation failed: {}", e));
            }
        };
        info!(reference = %book.reference, book_id = %book.book_id, title = %record.title, "Record created");

        let summary = match self.download_and_unpack(book, &record).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(
                    reference = %book.reference,
                    book_id = %book.book_id,
                    error = %e,
                    "Harvest failed, removing record"
                );
                self.roll_back(&record).await;
                return HarvestOutcome::aborted(e.to_string());
            }
        };

        if let Err(reason) = self.attach_metadata(&record, &summary).await {
            error!(reference = %book.reference, book_id = %book.book_id, reason = %reason, "Metadata stage failed");
            self.flag_error(&record, &reason).await;
            return HarvestOutcome::degraded(reason);
        }

        self.close_first_open_step(&record).await
    }

    /// Download into the source dir, then decrypt and unpack
    async fn download_and_unpack(
        &self,
        book: &BookRef,
        record: &WorkflowRecord,
    ) -> Result<ExtractionSummary> {
        let source_dir = record.source_dir();
        tokio::fs::create_dir_all(&source_dir).await?;

        let encrypted = source_dir.join(book.reference.as_str());
        self.conversion.download(&book.reference, &encrypted).await?;

        let targets = ExtractionTargets {
            image_master_dir: record.image_master_dir(),
            ocr_structured_dir: record.ocr_structured_dir(),
            ocr_plaintext_dir: record.ocr_plaintext_dir(),
            metadata_dir: source_dir,
        };
        let summary = self.extractor.extract(&encrypted, &targets).await?;
        Ok(summary)
    }

    /// Mine identifiers and put them on the record; `Err` carries the reason
    async fn attach_metadata(
        &self,
        record: &WorkflowRecord,
        summary: &ExtractionSummary,
    ) -> std::result::Result<(), String> {
        let document = summary
            .metadata_document
            .as_deref()
            .ok_or_else(|| "no metadata document in archive".to_string())?;

        let identifiers = self
            .identifiers
            .extract_from_path(document)
            .await
            .map_err(|e| format!("metadata document unusable: {}", e))?;
        if identifiers.is_empty() {
            return Err(format!(
                "no identifier found in {}",
                document.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            ));
        }

        match self.config.metadata.strategy {
            MetadataStrategy::Direct => {
                let values: Vec<String> =
                    identifiers.iter().map(|i| i.search_value.clone()).collect();
                self.store
                    .set_metadata(record, &self.config.metadata.field_name, &values)
                    .await
                    .map_err(|e| format!("could not store identifier: {}", e))?;
                info!(title = %record.title, identifiers = ?values, "Identifier stored on record");
                Ok(())
            }
            MetadataStrategy::Catalog => self.attach_from_catalog(record, &identifiers).await,
        }
    }

    /// Try identifiers in document order; the first catalog hit wins
    async fn attach_from_catalog(
        &self,
        record: &WorkflowRecord,
        identifiers: &[CatalogIdentifier],
    ) -> std::result::Result<(), String> {
        let catalog_name = &self.config.metadata.catalog_name;
        let Some(catalog) = &self.catalog else {
            return Err(format!("catalog lookup for '{}' not available", catalog_name));
        };

        let mut last_error = None;
        for identifier in identifiers {
            match catalog.lookup(identifier, catalog_name).await {
                Ok(found) => {
                    self.store
                        .attach_catalog_record(record, &found)
                        .await
                        .map_err(|e| format!("could not store catalog record: {}", e))?;
                    info!(
                        title = %record.title,
                        identifier = %identifier.search_value,
                        catalog = %catalog_name,
                        "Catalog record attached"
                    );
                    return Ok(());
                }
                Err(e @ CatalogError::NotConfigured(_)) => return Err(e.to_string()),
                Err(e) => {
                    warn!(identifier = %identifier.search_value, error = %e, "Catalog lookup failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => e.to_string(),
            None => "no identifier to look up".to_string(),
        })
    }

    /// Advance the first OPEN step, if the template has one
    async fn close_first_open_step(&self, record: &WorkflowRecord) -> HarvestOutcome {
        match self.store.first_open_step(record).await {
            Ok(Some(step)) => match self.store.advance_step(&step).await {
                Ok(()) => {
                    info!(title = %record.title, step = %step.title, "Record harvested, step closed");
                    HarvestOutcome::Closed
                }
                Err(e) => {
                    error!(title = %record.title, step = %step.title, error = %e, "Could not close step");
                    HarvestOutcome::degraded(format!("could not close step: {}", e))
                }
            },
            Ok(None) => {
                error!(
                    title = %record.title,
                    template = %self.config.template_title,
                    "No open step on record, check the template"
                );
                HarvestOutcome::Unadvanced {
                    reason: "no open step".to_string(),
                }
            }
            Err(e) => {
                error!(title = %record.title, error = %e, "Could not read record steps");
                HarvestOutcome::degraded(format!("could not read steps: {}", e))
            }
        }
    }

    async fn roll_back(&self, record: &WorkflowRecord) {
        if let Err(e) = self.store.delete_record_and_storage(record).await {
            error!(title = %record.title, error = %e, "Rollback failed, record left behind");
        }
    }

    /// Keep the record but mark it for manual attention
    async fn flag_error(&self, record: &WorkflowRecord, reason: &str) {
        if let Err(e) = self
            .store
            .append_log_entry(record, reason, LogLevel::Error)
            .await
        {
            error!(title = %record.title, error = %e, "Could not write record log entry");
        }

        match self.store.first_step(record).await {
            Ok(Some(step)) => {
                if let Err(e) = self.store.set_step_status(&step, StepStatus::Error).await {
                    error!(title = %record.title, error = %e, "Could not flag step as ERROR");
                }
            }
            Ok(None) => warn!(title = %record.title, "Record has no steps to flag"),
            Err(e) => error!(title = %record.title, error = %e, "Could not read record steps"),
        }
    }
}
