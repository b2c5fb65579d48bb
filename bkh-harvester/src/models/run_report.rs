//! Harvest run state machine and report
//!
//! A run progresses FETCHING → PER_BOOK_LOOP → DRAINING → DONE, or ends
//! early in BLOCKED when a guard fails before or between books.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ArchiveReference;

/// Why a run did not start or stopped early
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum BlockReason {
    /// Operator stop sentinel present
    StopRequested,
    /// Run-in-progress sentinel owned by another run
    AlreadyRunning,
    /// Free space at or below the configured buffer
    LowSpace,
    /// Converted-archive list could not be fetched
    FetchFailed(String),
    /// Run-in-progress sentinel could not be created
    LockFailed(String),
}

/// Harvest run state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "state")]
pub enum RunState {
    /// Guards are being evaluated
    Starting,
    /// Run did not start, or stopped between books
    Blocked { reason: BlockReason },
    /// Asking the service for converted archives
    Fetching,
    /// Processing archives sequentially
    PerBookLoop,
    /// Requesting further conversions for the next run
    Draining,
    /// Run finished
    Done,
}

/// Category of a per-book failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Infrastructure failure; record and directory rolled back
    Aborted,
    /// Metadata failure; record kept with its first step flagged ERROR
    Degraded,
}

/// Per-book failure detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookFailure {
    pub kind: FailureKind,
    pub reason: String,
}

/// Per-book result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum HarvestOutcome {
    /// Record created and its first open step advanced
    Closed,
    /// A record with this title already exists
    Skipped,
    /// Record created but the template had no OPEN step
    Unadvanced { reason: String },
    /// Book failed
    Failed(BookFailure),
}

impl HarvestOutcome {
    pub fn aborted(reason: impl Into<String>) -> Self {
        HarvestOutcome::Failed(BookFailure {
            kind: FailureKind::Aborted,
            reason: reason.into(),
        })
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        HarvestOutcome::Failed(BookFailure {
            kind: FailureKind::Degraded,
            reason: reason.into(),
        })
    }
}

/// Result for one archive reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookReport {
    pub reference: ArchiveReference,
    /// Derived record title, if the reference was well-formed
    pub title: Option<String>,
    #[serde(flatten)]
    pub outcome: HarvestOutcome,
}

/// Result of the post-loop conversion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum ConversionRequestOutcome {
    /// Nothing to request (limit 0 or nothing available)
    NothingRequested,
    /// Conversion requested for these barcodes
    Requested { barcodes: Vec<String> },
    /// Listing or requesting failed
    Failed { error: String },
}

/// Report of one harvest pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub books: Vec<BookReport>,
    pub conversion_request: Option<ConversionRequestOutcome>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::Starting,
            started_at: Utc::now(),
            ended_at: None,
            books: Vec::new(),
            conversion_request: None,
        }
    }

    /// Transition to new state, stamping the end time for terminal states
    pub fn transition_to(&mut self, new_state: RunState) {
        tracing::debug!(run_id = %self.run_id, from = ?self.state, to = ?new_state, "Run state transition");
        self.state = new_state;
        if self.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RunState::Done | RunState::Blocked { .. })
    }

    pub fn record(&mut self, book: BookReport) {
        self.books.push(book);
    }

    /// Records created and advanced
    pub fn closed(&self) -> usize {
        self.count(|o| matches!(o, HarvestOutcome::Closed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, HarvestOutcome::Skipped))
    }

    pub fn unadvanced(&self) -> usize {
        self.count(|o| matches!(o, HarvestOutcome::Unadvanced { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, HarvestOutcome::Failed(_)))
    }

    /// Books that reached the download stage (everything but skips)
    pub fn processed(&self) -> usize {
        self.books.len() - self.skipped()
    }

    /// False when the converted list could not be fetched, the run lock
    /// could not be taken, or the conversion request failed
    pub fn succeeded(&self) -> bool {
        let fetch_failed = matches!(
            self.state,
            RunState::Blocked {
                reason: BlockReason::FetchFailed(_) | BlockReason::LockFailed(_)
            }
        );
        let request_failed = matches!(
            self.conversion_request,
            Some(ConversionRequestOutcome::Failed { .. })
        );
        !fetch_failed && !request_failed
    }

    fn count(&self, predicate: impl Fn(&HarvestOutcome) -> bool) -> usize {
        self.books.iter().filter(|b| predicate(&b.outcome)).count()
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
