//! Run-state sentinel
//!
//! Two filesystem markers act as the run's go/no-go signals:
//! - stop file: operator-controlled, never removed by a run
//! - running file: created exclusively when a run takes the lock, removed
//!   when the [`RunLock`] is released or dropped (including on error)
//!
//! The lock is advisory and only meaningful with a single scheduler.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Stop and run-in-progress markers
#[derive(Debug, Clone)]
pub struct RunSentinel {
    stop_path: PathBuf,
    running_path: PathBuf,
}

impl RunSentinel {
    pub fn new(stop_path: impl Into<PathBuf>, running_path: impl Into<PathBuf>) -> Self {
        Self {
            stop_path: stop_path.into(),
            running_path: running_path.into(),
        }
    }

    pub fn stop_path(&self) -> &Path {
        &self.stop_path
    }

    pub fn running_path(&self) -> &Path {
        &self.running_path
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_path.exists()
    }

    pub fn is_run_in_progress(&self) -> bool {
        self.running_path.exists()
    }

    /// Take the run lock
    ///
    /// Returns `Ok(None)` when another run already holds it.
    pub fn try_acquire_run_lock(&self) -> std::io::Result<Option<RunLock>> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.running_path)
        {
            Ok(_) => {
                tracing::debug!(path = %self.running_path.display(), "Run lock acquired");
                Ok(Some(RunLock {
                    path: self.running_path.clone(),
                    released: false,
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create the stop marker (operator command)
    pub fn request_stop(&self) -> std::io::Result<()> {
        if let Some(parent) = self.stop_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.stop_path)?;
        Ok(())
    }

    /// Remove the stop marker (operator command)
    pub fn clear_stop(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.stop_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Ownership of the run-in-progress marker
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    /// Remove the marker now
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Run lock released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to delete running file"
            ),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.remove();
    }
}
