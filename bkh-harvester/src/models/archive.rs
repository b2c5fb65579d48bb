//! Archive references and the book identity derived from them
//!
//! The conversion service names each package e.g. `NLI_990012345.tar.gz.gpg`.
//! Stripping the site prefix and archive suffix yields the BookId, and the
//! BookId yields the downstream record title, which is the idempotency key.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque identifier of one externally produced archive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveReference(String);

impl ArchiveReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors deriving a book identity
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    /// Nothing left after stripping prefix and suffix
    #[error("Archive reference '{0}' yields an empty book id")]
    EmptyBookId(String),

    /// BookId would escape the storage layout
    #[error("Archive reference '{0}' contains path separators")]
    UnsafeReference(String),
}

/// Naming rules shared by the whole site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveNaming {
    /// Leading site prefix, e.g. `NLI_`
    pub site_prefix: String,
    /// Trailing archive suffix, e.g. `.tar.gz.gpg`
    pub archive_suffix: String,
    /// Encryption suffix removed by decryption, e.g. `.gpg`
    pub encryption_suffix: String,
    /// Record title prefix, e.g. `Google`
    pub title_prefix: String,
}

impl Default for ArchiveNaming {
    fn default() -> Self {
        Self {
            site_prefix: "NLI_".to_string(),
            archive_suffix: ".tar.gz.gpg".to_string(),
            encryption_suffix: ".gpg".to_string(),
            title_prefix: "Google".to_string(),
        }
    }
}

/// A reference together with its derived identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRef {
    pub reference: ArchiveReference,
    pub book_id: String,
    pub title: String,
}

impl ArchiveNaming {
    /// Derive BookId and record title from an archive reference
    pub fn book(&self, reference: &ArchiveReference) -> Result<BookRef, NamingError> {
        let raw = reference.as_str().trim();
        if raw.contains('/') || raw.contains('\\') || raw == ".." {
            return Err(NamingError::UnsafeReference(raw.to_string()));
        }

        let without_prefix = raw.strip_prefix(self.site_prefix.as_str()).unwrap_or(raw);
        let book_id = without_prefix
            .strip_suffix(self.archive_suffix.as_str())
            .unwrap_or(without_prefix);

        if book_id.is_empty() {
            return Err(NamingError::EmptyBookId(raw.to_string()));
        }

        Ok(BookRef {
            reference: ArchiveReference::new(raw),
            book_id: book_id.to_string(),
            title: format!("{}-{}", self.title_prefix, book_id),
        })
    }
}
