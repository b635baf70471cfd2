//! SQLite persistence for snapshot metadata.

use std::path::{Path, PathBuf};

use jiff::Timestamp;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};

use crate::{
    error::{DatabaseResultExt, Result},
    models::Snapshot,
};

const INSERT_SNAPSHOT_SQL: &str = "INSERT INTO snapshots (id, source_path, backup_path, created_at, label) VALUES (?1, ?2, ?3, ?4, ?5)";
const SELECT_SNAPSHOT_SQL: &str =
    "SELECT id, source_path, backup_path, created_at, label FROM snapshots WHERE id = ?1";
const LIST_SNAPSHOTS_SQL: &str =
    "SELECT id, source_path, backup_path, created_at, label FROM snapshots ORDER BY rowid";
const CHECK_SNAPSHOT_EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM snapshots WHERE id = ?1)";
const DELETE_SNAPSHOT_SQL: &str = "DELETE FROM snapshots WHERE id = ?1";
const DELETE_ALL_SQL: &str = "DELETE FROM snapshots";

/// Snapshot metadata table.
pub struct SnapshotStore {
    connection: Connection,
}

impl SnapshotStore {
    /// Opens (creating if needed) the metadata database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection =
            Connection::open(path).db_context("Failed to open snapshot database")?;
        let store = Self { connection };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory store, for callers that do not need persistence.
    pub fn in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().db_context("Failed to open in-memory database")?;
        let store = Self { connection };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let schema_sql = include_str!("../../assets/schema.sql");
        self.connection
            .execute_batch(schema_sql)
            .db_context("Failed to initialize snapshot schema")
    }

    pub fn insert(&self, snapshot: &Snapshot) -> Result<()> {
        self.connection
            .execute(
                INSERT_SNAPSHOT_SQL,
                params![
                    snapshot.id,
                    snapshot.source_path.to_string_lossy(),
                    snapshot.backup_path.to_string_lossy(),
                    snapshot.created_at.to_string(),
                    snapshot.label,
                ],
            )
            .db_context("Failed to insert snapshot")?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Snapshot>> {
        self.connection
            .query_row(SELECT_SNAPSHOT_SQL, params![id], row_to_snapshot)
            .optional()
            .db_context("Failed to load snapshot")
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        self.connection
            .query_row(CHECK_SNAPSHOT_EXISTS_SQL, params![id], |row| row.get(0))
            .db_context("Failed to check snapshot")
    }

    /// All snapshots, oldest first.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        let mut stmt = self
            .connection
            .prepare(LIST_SNAPSHOTS_SQL)
            .db_context("Failed to prepare snapshot query")?;
        let rows = stmt
            .query_map([], row_to_snapshot)
            .db_context("Failed to list snapshots")?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .db_context("Failed to read snapshot row")
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .connection
            .execute(DELETE_SNAPSHOT_SQL, params![id])
            .db_context("Failed to delete snapshot")?;
        Ok(removed > 0)
    }

    pub fn delete_all(&self) -> Result<usize> {
        self.connection
            .execute(DELETE_ALL_SQL, [])
            .db_context("Failed to clear snapshots")
    }
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        source_path: PathBuf::from(row.get::<_, String>(1)?),
        backup_path: PathBuf::from(row.get::<_, String>(2)?),
        created_at: row.get::<_, String>(3)?.parse::<Timestamp>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
        })?,
        label: row.get(4)?,
    })
}
