//! Snapshot metadata.

use std::path::PathBuf;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of a directory tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// `{name}_{YYYYmmdd_HHMMSS}`, suffixed on collision
    pub id: String,

    /// Directory that was copied
    pub source_path: PathBuf,

    /// Where the copy lives
    pub backup_path: PathBuf,

    /// Timestamp when the snapshot was taken (UTC)
    pub created_at: Timestamp,

    pub label: Option<String>,
}

/// Disk usage across all retained snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotUsage {
    pub count: usize,
    pub total_bytes: u64,
    pub directory: PathBuf,
}
