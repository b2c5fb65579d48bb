//! Catalog identifiers mined from embedded metadata, and catalog records

use serde::{Deserialize, Serialize};

/// One identifier extracted from a METS/MARC document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogIdentifier {
    /// Catalog search field the value is meant for (e.g. `1007`)
    pub search_field: String,
    /// Search value (trimmed)
    pub search_value: String,
}

impl CatalogIdentifier {
    pub fn new(search_field: impl Into<String>, search_value: impl Into<String>) -> Self {
        Self {
            search_field: search_field.into(),
            search_value: search_value.into(),
        }
    }
}

/// Bibliographic record returned by a catalog lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Catalog the record came from
    pub catalog_name: String,
    /// Identifier the record was found with
    pub identifier: CatalogIdentifier,
    /// Main title (MARC 245 $a), when present
    pub title: Option<String>,
    /// Raw MARCXML record
    pub marc_xml: String,
}
