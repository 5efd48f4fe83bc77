//! JSON-file durable tier.
//!
//! Layout: `<root>/<namespace>/<key>.json`, each file holding one
//! `{"timestamp": ..., "data": ...}` record. Writes go to a temp file in the
//! same directory, are synced, then renamed over the target.

use super::key::file_safe;
use super::traits::{DurableRecord, DurableStore};
use crate::error::{PgxError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-per-record durable store.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Create the store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| PgxError::Io {
            message: format!("Failed to create cache directory: {}", e),
            path: Some(root.clone()),
            source: Some(e),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(file_safe(namespace))
    }

    fn record_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.namespace_dir(namespace)
            .join(format!("{}.json", file_safe(key)))
    }
}

impl DurableStore for JsonFileStore {
    fn load(&self, namespace: &str, key: &str) -> Result<Option<DurableRecord>> {
        let path = self.record_path(namespace, key);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PgxError::io_with_path(e, path)),
        };

        match serde_json::from_str(&contents) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Corrupt cache file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    fn store(&self, namespace: &str, key: &str, record: &DurableRecord) -> Result<()> {
        let dir = self.namespace_dir(namespace);
        fs::create_dir_all(&dir).map_err(|e| PgxError::io_with_path(e, &dir))?;

        let serialized = serde_json::to_vec_pretty(record)?;
        let target = self.record_path(namespace, key);

        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| PgxError::io_with_path(e, &dir))?;
        temp.write_all(&serialized)
            .map_err(|e| PgxError::io_with_path(e, temp.path()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| PgxError::io_with_path(e, temp.path()))?;
        temp.persist(&target)
            .map_err(|e| PgxError::io_with_path(e.error, &target))?;

        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        let path = self.record_path(namespace, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PgxError::io_with_path(e, path)),
        }
    }

    fn purge_older_than(&self, namespace: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let dir = self.namespace_dir(namespace);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PgxError::io_with_path(e, dir)),
        };

        let mut purged = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stale = fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<DurableRecord>(&c).ok())
                .map(|r| r.timestamp < cutoff)
                .unwrap_or(true);
            if stale && fs::remove_file(&path).is_ok() {
                purged += 1;
            }
        }

        if purged > 0 {
            debug!("Purged {} expired files from {}", purged, dir.display());
        }
        Ok(purged)
    }
}
