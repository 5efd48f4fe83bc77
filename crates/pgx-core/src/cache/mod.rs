//! Tiered response cache.
//!
//! A fast in-memory tier (mini-moka) sits in front of a durable tier. Two
//! durable implementations are provided:
//! - [`SqliteStore`]: one database, namespace-isolated rows
//! - [`JsonFileStore`]: one `{timestamp, data}` JSON file per key
//!
//! Expiry is lazy: records are judged against the caller's TTL on read and
//! never swept from the fetch path.

mod file;
mod key;
mod sqlite;
mod store;
mod traits;

pub use file::JsonFileStore;
pub use key::{cache_key, file_safe};
pub use sqlite::SqliteStore;
pub use store::{CacheConfig, CacheHit, CacheStats, CacheStore, CacheTier};
pub use traits::{is_fresh, DurableRecord, DurableStore};
