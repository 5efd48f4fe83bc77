//! Two-tier cache store.
//!
//! Lookup order is memory, then durable. A durable hit is promoted into
//! memory. Freshness is always judged from the timestamp stored with the
//! payload, so an entry that expired in memory is re-checked against the
//! durable record rather than refetched.

use super::traits::{is_fresh, DurableRecord, DurableStore};
use crate::config::CacheSettings;
use crate::error::Result;
use chrono::{DateTime, Utc};
use mini_moka::sync::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the memory tier.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries kept in memory.
    pub memory_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: CacheSettings::MEMORY_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn with_memory_capacity(mut self, capacity: u64) -> Self {
        self.memory_capacity = capacity;
        self
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    stored_at: DateTime<Utc>,
    payload: Arc<Value>,
}

/// Which tier answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Durable,
}

/// A fresh cached payload.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub payload: Value,
    pub stored_at: DateTime<Utc>,
    pub tier: CacheTier,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

/// Tiered cache shared by every resilient client in a process.
///
/// Construct one at startup and hand out `Arc<CacheStore>` clones.
pub struct CacheStore {
    memory: Cache<String, MemoryEntry>,
    durable: Arc<dyn DurableStore>,
    counters: Counters,
}

impl CacheStore {
    pub fn new(durable: Arc<dyn DurableStore>) -> Self {
        Self::with_config(durable, CacheConfig::default())
    }

    pub fn with_config(durable: Arc<dyn DurableStore>, config: CacheConfig) -> Self {
        Self {
            memory: Cache::builder()
                .max_capacity(config.memory_capacity)
                .build(),
            durable,
            counters: Counters::default(),
        }
    }

    fn memory_key(namespace: &str, key: &str) -> String {
        format!("{}\u{1f}{}", namespace, key)
    }

    /// Look up a fresh entry.
    ///
    /// Returns `None` on a miss or when the stored entry is older than `ttl`.
    /// Durable read errors are logged and reported as misses.
    pub fn get(&self, namespace: &str, key: &str, ttl: Duration) -> Option<CacheHit> {
        let now = Utc::now();
        let memory_key = Self::memory_key(namespace, key);

        if let Some(entry) = self.memory.get(&memory_key) {
            if is_fresh(entry.stored_at, ttl, now) {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                return Some(CacheHit {
                    payload: (*entry.payload).clone(),
                    stored_at: entry.stored_at,
                    tier: CacheTier::Memory,
                });
            }
            debug!("Memory entry {}/{} expired", namespace, key);
            self.memory.invalidate(&memory_key);
        }

        let record = match self.durable.load(namespace, key) {
            Ok(record) => record,
            Err(e) => {
                warn!("Durable cache read failed for {}/{}: {}", namespace, key, e);
                None
            }
        };

        match record {
            Some(record) if record.is_fresh_at(ttl, now) => {
                self.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
                self.memory.insert(
                    memory_key,
                    MemoryEntry {
                        stored_at: record.timestamp,
                        payload: Arc::new(record.data.clone()),
                    },
                );
                Some(CacheHit {
                    payload: record.data,
                    stored_at: record.timestamp,
                    tier: CacheTier::Durable,
                })
            }
            _ => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a payload stamped with the current time.
    pub fn put(&self, namespace: &str, key: &str, payload: &Value) -> Result<()> {
        self.put_at(namespace, key, payload, Utc::now())
    }

    /// Store a payload with an explicit timestamp.
    ///
    /// The durable write happens first; memory is only updated once it
    /// succeeds, so the memory tier never holds an entry durable lacks.
    pub fn put_at(
        &self,
        namespace: &str,
        key: &str,
        payload: &Value,
        stored_at: DateTime<Utc>,
    ) -> Result<()> {
        let record = DurableRecord::at(payload.clone(), stored_at);
        if let Err(e) = self.durable.store(namespace, key, &record) {
            self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
            // a stale memory copy must not outlive a failed refresh
            self.memory.invalidate(&Self::memory_key(namespace, key));
            return Err(e);
        }

        self.memory.insert(
            Self::memory_key(namespace, key),
            MemoryEntry {
                stored_at,
                payload: Arc::new(record.data),
            },
        );
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Drop a key from both tiers.
    pub fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        self.memory.invalidate(&Self::memory_key(namespace, key));
        self.durable.remove(namespace, key)
    }

    /// Empty the memory tier. Durable records are untouched.
    pub fn clear_memory(&self) {
        self.memory.invalidate_all();
    }

    /// Delete durable records older than `ttl`. Maintenance only; reads
    /// already treat such records as misses.
    pub fn purge_expired(&self, namespace: &str, ttl: Duration) -> Result<usize> {
        let cutoff = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.durable.purge_older_than(namespace, cutoff)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.counters.durable_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }
}
