use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{CatalogIdentifier, CatalogRecord, LogLevel, Step, StepStatus, WorkflowRecord};

/// Workflow store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Title uniqueness violated
    #[error("A record titled '{0}' already exists")]
    DuplicateTitle(String),

    #[error("Invalid stored value: {0}")]
    Invalid(String),
}

/// Catalog lookup errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No endpoint configured under this catalog name
    #[error("Catalog '{0}' is not configured")]
    NotConfigured(String),

    /// Catalog answered but has no record for the identifier
    #[error("No catalog record for {field}={value}")]
    NoMatch { field: String, value: String },

    #[error("Catalog request failed: {0}")]
    Network(String),

    #[error("Unreadable catalog response: {0}")]
    Parse(String),
}

/// Workflow-record persistence and step engine
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// True when a record with this title exists (the idempotency check)
    async fn record_exists(&self, title: &str) -> Result<bool, StoreError>;

    /// Create `new_title` by copying the template's steps and metadata
    async fn create_from_template(
        &self,
        template_title: &str,
        new_title: &str,
    ) -> Result<WorkflowRecord, StoreError>;

    /// Remove the record and its on-disk directory
    async fn delete_record_and_storage(&self, record: &WorkflowRecord) -> Result<(), StoreError>;

    /// Lowest-ordinal step in OPEN status
    async fn first_open_step(&self, record: &WorkflowRecord) -> Result<Option<Step>, StoreError>;

    /// Lowest-ordinal step regardless of status
    async fn first_step(&self, record: &WorkflowRecord) -> Result<Option<Step>, StoreError>;

    /// Close `step` and hand the record to the next stage
    async fn advance_step(&self, step: &Step) -> Result<(), StoreError>;

    async fn set_step_status(&self, step: &Step, status: StepStatus) -> Result<(), StoreError>;

    async fn append_log_entry(
        &self,
        record: &WorkflowRecord,
        message: &str,
        level: LogLevel,
    ) -> Result<(), StoreError>;

    /// Replace every value of `field` with `values`
    async fn set_metadata(
        &self,
        record: &WorkflowRecord,
        field: &str,
        values: &[String],
    ) -> Result<(), StoreError>;

    /// Store a full bibliographic description on the record
    async fn attach_catalog_record(
        &self,
        record: &WorkflowRecord,
        catalog: &CatalogRecord,
    ) -> Result<(), StoreError>;
}

/// Bibliographic catalog lookup
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn lookup(
        &self,
        identifier: &CatalogIdentifier,
        catalog_name: &str,
    ) -> Result<CatalogRecord, CatalogError>;
}
