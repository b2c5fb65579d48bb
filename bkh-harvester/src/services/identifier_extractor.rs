//! Identifier extractor
//!
//! Mines catalog identifiers from the MARC-in-METS document shipped inside
//! each package. Elements are matched by local name, so the MARC namespace
//! prefix used by the producer does not matter.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::CatalogIdentifier;

const CONTROL_NUMBER_TAG: &str = "001";
const HOLDINGS_TAG: &str = "955";
const STACKS_TOKEN: &str = "stacks";

/// Identifier extractor errors
///
/// Zero matches is not an error; callers get an empty list.
#[derive(Debug, Error)]
pub enum IdentifierError {
    #[error("Failed to read metadata document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed metadata document: {0}")]
    Parse(String),
}

/// Which matches of the subfield-pair rule to keep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepMatches {
    #[default]
    First,
    All,
}

/// Identifier selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierPolicy {
    /// Trimmed text of the first `controlfield[@tag=001]`
    ControlNumber,
    /// `$b` of every `datafield[@tag=955]` whose `$a` contains "stacks"
    /// (any case) and whose `$b` contains a hyphen
    StacksSubfieldPair { keep: KeepMatches },
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        IdentifierPolicy::StacksSubfieldPair {
            keep: KeepMatches::First,
        }
    }
}

/// Extracts identifiers according to one policy
#[derive(Debug, Clone)]
pub struct IdentifierExtractor {
    policy: IdentifierPolicy,
    search_field: String,
}

impl IdentifierExtractor {
    pub fn new(policy: IdentifierPolicy, search_field: impl Into<String>) -> Self {
        Self {
            policy,
            search_field: search_field.into(),
        }
    }

    pub fn policy(&self) -> IdentifierPolicy {
        self.policy
    }

    /// Read and mine a document on disk
    pub async fn extract_from_path(
        &self,
        path: &Path,
    ) -> Result<Vec<CatalogIdentifier>, IdentifierError> {
        let xml = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| IdentifierError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        self.extract_from_str(&xml)
    }

    /// Mine an in-memory document
    pub fn extract_from_str(&self, xml: &str) -> Result<Vec<CatalogIdentifier>, IdentifierError> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..Default::default()
        };
        let doc = roxmltree::Document::parse_with_options(xml, options)
            .map_err(|e| IdentifierError::Parse(e.to_string()))?;

        let values = match self.policy {
            IdentifierPolicy::ControlNumber => control_number(&doc).into_iter().collect(),
            IdentifierPolicy::StacksSubfieldPair { keep } => {
                let mut matches = stacks_pairs(&doc);
                if keep == KeepMatches::First {
                    matches.truncate(1);
                }
                matches
            }
        };

        Ok(values
            .into_iter()
            .map(|value| CatalogIdentifier::new(self.search_field.as_str(), value))
            .collect())
    }
}

fn control_number(doc: &roxmltree::Document) -> Option<String> {
    doc.descendants()
        .filter(|n| in_marc_record(n) && n.tag_name().name() == "controlfield")
        .find(|n| n.attribute("tag") == Some(CONTROL_NUMBER_TAG))
        .map(|n| element_text(&n).trim().to_string())
        .filter(|v| !v.is_empty())
}

fn stacks_pairs(doc: &roxmltree::Document) -> Vec<String> {
    doc.descendants()
        .filter(|n| in_marc_record(n) && n.tag_name().name() == "datafield")
        .filter(|n| n.attribute("tag") == Some(HOLDINGS_TAG))
        .filter_map(|field| {
            let a = subfield(&field, "a")?;
            let b = subfield(&field, "b")?;
            let matches = a.to_lowercase().contains(STACKS_TOKEN) && b.contains('-');
            matches.then(|| b.trim().to_string())
        })
        .collect()
}

fn subfield(field: &roxmltree::Node, code: &str) -> Option<String> {
    field
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "subfield")
        .find(|c| c.attribute("code") == Some(code))
        .map(|c| element_text(&c))
}

/// Whole text content; comments and CDATA sections split text nodes
fn element_text(node: &roxmltree::Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

fn in_marc_record(node: &roxmltree::Node) -> bool {
    node.parent_element()
        .map(|p| p.tag_name().name() == "record")
        .unwrap_or(false)
}
