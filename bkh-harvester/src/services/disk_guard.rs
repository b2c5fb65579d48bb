//! Disk-space guard
//!
//! Compares the configured buffer against the live usable space of the
//! storage volume. Nothing is cached: every call measures again. Any failure
//! to resolve or measure counts as "not enough space".

use bkh_common::human_size::{format_bytes, parse_buffer};
use std::path::{Path, PathBuf};

/// Free-space threshold parsed from the configured buffer string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPolicy {
    pub threshold_bytes: u64,
}

impl BufferPolicy {
    /// Parse e.g. `"150G"`; missing or invalid values fall back to 150 GiB
    pub fn from_config(buffer: Option<&str>) -> Self {
        Self {
            threshold_bytes: parse_buffer(buffer),
        }
    }
}

/// Disk-space guard for one storage directory
#[derive(Debug, Clone)]
pub struct DiskSpaceGuard {
    storage_dir: PathBuf,
    policy: BufferPolicy,
}

impl DiskSpaceGuard {
    pub fn new(storage_dir: impl Into<PathBuf>, policy: BufferPolicy) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            policy,
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn threshold_bytes(&self) -> u64 {
        self.policy.threshold_bytes
    }

    /// Usable free space on the volume holding the (symlink-resolved) storage dir
    pub fn free_space(&self) -> std::io::Result<u64> {
        let real = std::fs::canonicalize(&self.storage_dir)?;
        fs2::available_space(&real)
    }

    /// True when the buffer is strictly below the free space
    pub fn has_space(&self) -> bool {
        self.has_space_for(self.policy.threshold_bytes)
    }

    /// True when `threshold` is strictly below the free space
    pub fn has_space_for(&self, threshold: u64) -> bool {
        match self.free_space() {
            Ok(free) => {
                let enough = threshold < free;
                if !enough {
                    tracing::warn!(
                        storage_dir = %self.storage_dir.display(),
                        free = %format_bytes(free),
                        threshold = %format_bytes(threshold),
                        "Not enough free space in storage dir"
                    );
                }
                enough
            }
            Err(e) => {
                tracing::error!(
                    storage_dir = %self.storage_dir.display(),
                    error = %e,
                    "Could not determine free space, treating as full"
                );
                false
            }
        }
    }
}
