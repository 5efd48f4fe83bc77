//! SQLite-backed durable tier.

use super::traits::{DurableRecord, DurableStore};
use crate::error::{PgxError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// SQLite durable store.
///
/// One shared database file, records isolated by namespace. Each write is a
/// single `INSERT OR REPLACE`, so a record is replaced atomically.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PgxError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| PgxError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // WAL lets readers proceed while a writer holds the lock
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| PgxError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory database, for tests and throwaway runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| PgxError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_records (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                stored_at TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_stored
                ON cache_records(namespace, stored_at);
            "#,
        )
        .map_err(|e| PgxError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    /// Number of records in a namespace.
    pub fn count(&self, namespace: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_records WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl DurableStore for SqliteStore {
    fn load(&self, namespace: &str, key: &str) -> Result<Option<DurableRecord>> {
        let conn = self.lock()?;

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT stored_at, data FROM cache_records WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| PgxError::Database {
                message: format!("Failed to query cache record: {}", e),
                source: Some(e),
            })?;

        let (stored_at, data) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let timestamp = match DateTime::parse_from_rfc3339(&stored_at) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                warn!("Unreadable timestamp for {}/{}: {}", namespace, key, e);
                return Ok(None);
            }
        };
        let data = match serde_json::from_str(&data) {
            Ok(value) => value,
            Err(e) => {
                warn!("Corrupt cache payload for {}/{}: {}", namespace, key, e);
                return Ok(None);
            }
        };

        Ok(Some(DurableRecord { timestamp, data }))
    }

    fn store(&self, namespace: &str, key: &str, record: &DurableRecord) -> Result<()> {
        let data = serde_json::to_string(&record.data)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_records (namespace, key, stored_at, data)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![namespace, key, record.timestamp.to_rfc3339(), data],
        )
        .map_err(|e| PgxError::Database {
            message: format!("Failed to write cache record: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM cache_records WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(deleted > 0)
    }

    fn purge_older_than(&self, namespace: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        // RFC 3339 in UTC sorts lexicographically, but parse to stay independent
        // of fractional-second formatting.
        let mut stmt = conn.prepare("SELECT key, stored_at FROM cache_records WHERE namespace = ?1")?;
        let stale: Vec<String> = stmt
            .query_map(params![namespace], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .filter_map(|r| r.ok())
            .filter(|(_, stored_at)| {
                DateTime::parse_from_rfc3339(stored_at)
                    .map(|ts| ts.with_timezone(&Utc) < cutoff)
                    .unwrap_or(true)
            })
            .map(|(key, _)| key)
            .collect();
        drop(stmt);

        let mut deleted = 0;
        for key in &stale {
            deleted += conn.execute(
                "DELETE FROM cache_records WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )?;
        }

        if deleted > 0 {
            debug!("Purged {} expired records from namespace '{}'", deleted, namespace);
        }
        Ok(deleted)
    }
}
