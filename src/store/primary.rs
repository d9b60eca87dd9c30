/// SQLite-backed primary store
///
/// Uses WAL mode for crash resilience. Opening the database is the
/// native-dependency gate the recovery runner guards: on hosts where the
/// engine cannot load, open fails and the selector downgrades.
use super::{StateStore, StoreKind};
use crate::capability::{Availability, Capability};
use crate::{SetupError, SetupResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

pub struct SqliteStore {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create or open the database file and schema
    pub fn open(db_path: &Path) -> SetupResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| SetupError::StoreOpen(e.to_string()))?;

        // WAL for crash resilience, NORMAL sync for speed without losing safety
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| SetupError::StoreOpen(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| SetupError::StoreOpen(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| SetupError::StoreOpen(e.to_string()))?;

        tracing::debug!(path = %db_path.display(), "primary store opened");

        Ok(Self {
            conn,
            db_path: db_path.to_path_buf(),
        })
    }

    /// In-memory database, for capability probing and tests
    pub fn open_in_memory() -> SetupResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SetupError::StoreOpen(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| SetupError::StoreOpen(e.to_string()))?;

        Ok(Self {
            conn,
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl StateStore for SqliteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Primary
    }

    fn get(&self, key: &str) -> SetupResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SetupError::StoreIo(e.to_string()))
    }

    fn put(&mut self, key: &str, value: &str) -> SetupResult<()> {
        self.conn
            .execute(
                "INSERT INTO state (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![key, value, Utc::now()],
            )
            .map_err(|e| SetupError::StoreIo(e.to_string()))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> SetupResult<()> {
        self.conn
            .execute("DELETE FROM state WHERE key = ?1", params![key])
            .map_err(|e| SetupError::StoreIo(e.to_string()))?;
        Ok(())
    }

    fn keys(&self) -> SetupResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM state ORDER BY key")
            .map_err(|e| SetupError::StoreIo(e.to_string()))?;
        let keys = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| SetupError::StoreIo(e.to_string()))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| SetupError::StoreIo(e.to_string()))?;
        Ok(keys)
    }

    fn flush(&mut self) -> SetupResult<()> {
        // wal_checkpoint reports (busy, log, checkpointed); the row is irrelevant here
        self.conn
            .query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_row| Ok(()))
            .optional()
            .map_err(|e| SetupError::StoreIo(e.to_string()))?;
        Ok(())
    }
}

/// Capability adapter for the native engine
pub struct SqliteBackend;

impl Capability for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn probe(&self) -> Availability {
        match Connection::open_in_memory() {
            Ok(_) => Availability::Available,
            Err(e) => Availability::Unavailable(e.to_string()),
        }
    }
}
