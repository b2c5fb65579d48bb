//! Guards: stop sentinel, run-in-progress sentinel, free space
//!
//! Evaluated fresh on every call; nothing is cached between books.

use super::HarvestOrchestrator;
use crate::models::BlockReason;

impl HarvestOrchestrator {
    /// Checks made before anything else happens in a pass
    pub(super) fn check_start_guards(&self) -> Option<BlockReason> {
        if self.sentinel.is_stop_requested() {
            tracing::warn!(
                stop_file = %self.sentinel.stop_path().display(),
                "Stop requested, not starting harvest run"
            );
            return Some(BlockReason::StopRequested);
        }

        if self.sentinel.is_run_in_progress() {
            tracing::warn!(
                running_file = %self.sentinel.running_path().display(),
                "Harvest run already in progress"
            );
            return Some(BlockReason::AlreadyRunning);
        }

        if !self.disk_guard.has_space() {
            return Some(BlockReason::LowSpace);
        }

        None
    }

    /// Checks made after each book; either ends the whole pass
    pub(super) fn check_between_books(&self) -> Option<BlockReason> {
        if self.sentinel.is_stop_requested() {
            return Some(BlockReason::StopRequested);
        }
        if !self.disk_guard.has_space() {
            return Some(BlockReason::LowSpace);
        }
        None
    }
}
