//! Downstream workflow records and their steps
//!
//! The harvester creates records but does not own their semantics: it only
//! looks for the first OPEN step, advances it, or flags a step as ERROR.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Status of one workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    /// Waiting for an earlier step
    Locked,
    /// Ready to be worked on
    Open,
    /// Being worked on
    InWork,
    /// Finished
    Done,
    /// Failed, needs manual attention
    Error,
    /// Skipped for this record
    Deactivated,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Locked => "LOCKED",
            StepStatus::Open => "OPEN",
            StepStatus::InWork => "INWORK",
            StepStatus::Done => "DONE",
            StepStatus::Error => "ERROR",
            StepStatus::Deactivated => "DEACTIVATED",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCKED" => Ok(StepStatus::Locked),
            "OPEN" => Ok(StepStatus::Open),
            "INWORK" => Ok(StepStatus::InWork),
            "DONE" => Ok(StepStatus::Done),
            "ERROR" => Ok(StepStatus::Error),
            "DEACTIVATED" => Ok(StepStatus::Deactivated),
            other => Err(format!("Unknown step status: {}", other)),
        }
    }
}

/// Severity of a record log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// One stage of a workflow record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub record_id: i64,
    /// Position within the record (ascending)
    pub ordinal: i64,
    pub title: String,
    pub status: StepStatus,
}

/// A workflow record created from a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: i64,
    /// Unique title, e.g. `Google-990012345`
    pub title: String,
    /// Root of the record's on-disk data
    pub storage_dir: PathBuf,
}

impl WorkflowRecord {
    pub fn new(id: i64, title: impl Into<String>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            title: title.into(),
            storage_dir: storage_dir.into(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Download target and metadata document location
    pub fn source_dir(&self) -> PathBuf {
        self.storage_dir
            .join("images")
            .join(format!("{}_source", self.title))
    }

    /// Image master folder (jp2)
    pub fn image_master_dir(&self) -> PathBuf {
        self.storage_dir
            .join("images")
            .join(format!("master_{}_media", self.title))
    }

    /// Structured OCR folder (hOCR html)
    pub fn ocr_structured_dir(&self) -> PathBuf {
        self.storage_dir
            .join("ocr")
            .join(format!("{}_hocr", self.title))
    }

    /// Plain-text OCR folder
    pub fn ocr_plaintext_dir(&self) -> PathBuf {
        self.storage_dir
            .join("ocr")
            .join(format!("{}_txt", self.title))
    }
}
