//! Error types for bkh-harvester

use thiserror::Error;

use crate::services::archive_extractor::ExtractError;
use crate::services::conversion_client::ConversionError;
use crate::services::identifier_extractor::IdentifierError;
use crate::services::process_runner::ProcessError;
use crate::workflow::{CatalogError, StoreError};

/// Harvest error
///
/// Per-component errors meet here at the orchestrator seam.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Common(#[from] bkh_common::Error),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
