//! Filesystem snapshots for rollback.
//!
//! A snapshot is a full copy of a directory tree stored under the snapshot
//! root, plus one metadata row in `snapshots.db` next to the copies. Only the
//! most recent `max_snapshots` are retained.

pub mod copy;
pub mod store;

use std::path::{Path, PathBuf};

use jiff::{Timestamp, Zoned};
use log::{debug, info, warn};

pub use store::SnapshotStore;

use crate::{
    config::SnapshotConfig,
    error::{EngineError, IoResultExt, Result},
    models::{Snapshot, SnapshotUsage},
};

const DATABASE_FILE: &str = "snapshots.db";

/// Creates, retains and restores snapshots.
pub struct SnapshotManager {
    store: SnapshotStore,
    directory: PathBuf,
    max_snapshots: usize,
    current: Option<String>,
}

impl SnapshotManager {
    /// Opens the snapshot root at `directory`, creating it if needed.
    pub fn open(directory: impl Into<PathBuf>, max_snapshots: usize) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).fs_context(&directory)?;
        let store = SnapshotStore::open(directory.join(DATABASE_FILE))?;

        Ok(Self {
            store,
            directory,
            max_snapshots: max_snapshots.max(1),
            current: None,
        })
    }

    /// Opens the configured root, or the XDG default.
    pub fn from_config(config: &SnapshotConfig) -> Result<Self> {
        let directory = match &config.directory {
            Some(dir) => dir.clone(),
            None => Self::default_directory()?,
        };
        Self::open(directory, config.max_snapshots)
    }

    /// `$XDG_DATA_HOME/forge/snapshots` or `~/.local/share/forge/snapshots`.
    pub fn default_directory() -> Result<PathBuf> {
        xdg::BaseDirectories::with_prefix("forge")
            .create_data_directory("snapshots")
            .map_err(|e| EngineError::XdgDirectory(e.to_string()))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// ID of the last snapshot created by this manager.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Copies `path` into a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::SourceMissing` if `path` does not exist; nothing
    /// is recorded in that case.
    pub fn create(&mut self, path: &Path, label: Option<&str>) -> Result<Snapshot> {
        if !path.exists() {
            return Err(EngineError::SourceMissing {
                path: path.to_path_buf(),
            });
        }
        let source = path.canonicalize().fs_context(path)?;
        let root = self.directory.canonicalize().fs_context(&self.directory)?;
        if root.starts_with(&source) {
            return Err(EngineError::invalid_input("path")
                .with_reason(format!("'{}' contains the snapshot directory", source.display())));
        }

        let id = self.next_id(&source)?;
        let backup_path = self.directory.join(&id);
        let bytes = copy::copy_tree(&source, &backup_path)?;

        let snapshot = Snapshot {
            id,
            source_path: source,
            backup_path,
            created_at: Timestamp::now(),
            label: label.map(String::from),
        };
        if let Err(e) = self.store.insert(&snapshot) {
            let _ = copy::remove_tree(&snapshot.backup_path);
            return Err(e);
        }

        info!(
            "Created snapshot {} of {} ({bytes} bytes)",
            snapshot.id,
            snapshot.source_path.display()
        );
        self.current = Some(snapshot.id.clone());
        self.enforce_retention()?;
        Ok(snapshot)
    }

    /// Replaces the live tree with a snapshot; the latest one when `id` is
    /// `None`.
    pub fn restore(&mut self, id: Option<&str>) -> Result<Snapshot> {
        let snapshot = match id {
            Some(id) => self.get(id)?,
            None => self.latest()?.ok_or(EngineError::NoSnapshots)?,
        };

        if !snapshot.backup_path.is_dir() {
            warn!(
                "Snapshot {} has no backup at {}",
                snapshot.id,
                snapshot.backup_path.display()
            );
            return Err(EngineError::SnapshotNotFound { id: snapshot.id });
        }

        copy::remove_tree(&snapshot.source_path)?;
        copy::copy_tree(&snapshot.backup_path, &snapshot.source_path)?;
        info!(
            "Restored {} from snapshot {}",
            snapshot.source_path.display(),
            snapshot.id
        );
        Ok(snapshot)
    }

    pub fn get(&self, id: &str) -> Result<Snapshot> {
        self.store
            .get(id)?
            .ok_or_else(|| EngineError::SnapshotNotFound { id: id.to_string() })
    }

    /// All retained snapshots, oldest first.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        self.store.list()
    }

    pub fn latest(&self) -> Result<Option<Snapshot>> {
        Ok(self.store.list()?.pop())
    }

    /// Bytes on disk of one snapshot.
    pub fn size(&self, id: &str) -> Result<u64> {
        let snapshot = self.get(id)?;
        copy::tree_size(&snapshot.backup_path)
    }

    pub fn usage(&self) -> Result<SnapshotUsage> {
        let snapshots = self.store.list()?;
        let mut total_bytes = 0;
        for snapshot in &snapshots {
            if snapshot.backup_path.exists() {
                total_bytes += copy::tree_size(&snapshot.backup_path)?;
            }
        }

        Ok(SnapshotUsage {
            count: snapshots.len(),
            total_bytes,
            directory: self.directory.clone(),
        })
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        let snapshot = self.get(id)?;
        copy::remove_tree(&snapshot.backup_path)?;
        self.store.delete(id)?;
        if self.current.as_deref() == Some(id) {
            self.current = None;
        }
        debug!("Deleted snapshot {id}");
        Ok(())
    }

    /// Deletes every snapshot and returns how many there were.
    pub fn clear(&mut self) -> Result<usize> {
        let snapshots = self.store.list()?;
        for snapshot in &snapshots {
            copy::remove_tree(&snapshot.backup_path)?;
        }
        self.store.delete_all()?;
        self.current = None;
        Ok(snapshots.len())
    }

    fn enforce_retention(&mut self) -> Result<()> {
        let snapshots = self.store.list()?;
        let excess = snapshots.len().saturating_sub(self.max_snapshots);
        for snapshot in snapshots.iter().take(excess) {
            debug!("Evicting snapshot {}", snapshot.id);
            self.delete(&snapshot.id)?;
        }
        Ok(())
    }

    /// `{name}_{YYYYmmdd_HHMMSS}`, with `_{n}` appended until unused.
    fn next_id(&self, source: &Path) -> Result<String> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let base = format!("{name}_{}", Zoned::now().strftime("%Y%m%d_%H%M%S"));

        let mut id = base.clone();
        let mut n = 2;
        while self.store.exists(&id)? || self.directory.join(&id).exists() {
            id = format!("{base}_{n}");
            n += 1;
        }
        Ok(id)
    }
}
