//! Durable tier trait and record type.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One durable cache record: the payload and when it was stored.
///
/// Serialized as `{"timestamp": "<RFC 3339>", "data": <JSON>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableRecord {
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl DurableRecord {
    pub fn new(data: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn at(data: Value, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, data }
    }

    /// Whether the record is still within `ttl` at time `now`.
    pub fn is_fresh_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        is_fresh(self.timestamp, ttl, now)
    }
}

/// Freshness rule shared by both tiers: age must not exceed the TTL.
pub fn is_fresh(stored_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(stored_at);
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => age <= ttl,
        // TTL beyond chrono's range never expires
        Err(_) => true,
    }
}

/// Persistent key-value storage for cache records, isolated by namespace.
///
/// All operations are synchronous to match rusqlite's API. Implementations
/// must make `store` atomic per key: a reader sees either the previous record
/// or the new one, never a partial write.
pub trait DurableStore: Send + Sync {
    /// Load the record for a key. Expiry is the caller's decision.
    fn load(&self, namespace: &str, key: &str) -> Result<Option<DurableRecord>>;

    /// Write a record, replacing any existing one with the same key.
    fn store(&self, namespace: &str, key: &str, record: &DurableRecord) -> Result<()>;

    /// Delete a key. Returns whether anything was removed.
    fn remove(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Delete every record in a namespace stored before `cutoff`.
    fn purge_older_than(&self, namespace: &str, cutoff: DateTime<Utc>) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_wire_format() {
        let ts = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let record = DurableRecord::at(json!({"esearchresult": {"idlist": ["12345"]}}), ts);
        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded["timestamp"], "2026-01-02T03:04:05Z");
        assert_eq!(encoded["data"]["esearchresult"]["idlist"][0], "12345");
    }

    #[test]
    fn test_freshness_boundary() {
        let now = Utc::now();
        let ttl = Duration::from_secs(3600);
        assert!(is_fresh(now - chrono::Duration::seconds(3600), ttl, now));
        assert!(!is_fresh(now - chrono::Duration::seconds(3601), ttl, now));
        assert!(is_fresh(now, Duration::MAX, now));
    }
}
