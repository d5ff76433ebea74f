use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Client-opaque flags stored alongside every value
pub type Flags = u32;

/// Memcached-style expiration time
///
/// `0` never expires, values up to 30 days are relative seconds,
/// anything larger is an absolute unix timestamp.
pub type ExpTime = u32;

/// Unique token bumped on every mutation of an item
pub type CasUnique = u64;

const RELATIVE_EXPTIME_LIMIT: u32 = 60 * 60 * 24 * 30;

/// Stored value in the KV store with metadata
#[derive(Debug, Clone)]
pub struct StoredValue {
    /// Raw byte data
    pub data: Vec<u8>,
    /// Client flags
    pub flags: Flags,
    /// CAS unique for this version of the value
    pub cas: CasUnique,
    /// Optional expiration time
    pub expires_at: Option<Instant>,
    /// Last access time
    pub accessed_at: Instant,
}

impl StoredValue {
    /// Create a new stored value
    pub fn new(data: Vec<u8>, flags: Flags, exptime: ExpTime, cas: CasUnique) -> Self {
        Self {
            data,
            flags,
            cas,
            expires_at: expiration_deadline(exptime),
            accessed_at: Instant::now(),
        }
    }

    /// Check if the value has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires| Instant::now() >= expires)
    }

    /// Update access time
    pub fn update_access(&mut self) {
        self.accessed_at = Instant::now();
    }

    /// Snapshot the value as seen by a reader
    pub fn to_item(&self, with_cas: bool) -> Item {
        Item {
            value: self.data.clone(),
            flags: self.flags,
            cas: with_cas.then_some(self.cas),
        }
    }
}

/// Translate a memcached exptime into a monotonic deadline
pub fn expiration_deadline(exptime: ExpTime) -> Option<Instant> {
    match exptime {
        0 => None,
        secs if secs <= RELATIVE_EXPTIME_LIMIT => {
            Some(Instant::now() + Duration::from_secs(u64::from(secs)))
        }
        absolute => {
            let now_unix = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            // An absolute time in the past expires immediately.
            let remaining = u64::from(absolute).saturating_sub(now_unix);
            Some(Instant::now() + Duration::from_secs(remaining))
        }
    }
}

/// Value returned by `get` / `get_cas`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub value: Vec<u8>,
    pub flags: Flags,
    /// Only populated by `get_cas`
    pub cas: Option<CasUnique>,
}

/// Outcome of the set family (`set`, `add`, `replace`, `cas`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetResult {
    Stored,
    NotStored,
    Exists,
    NotFound,
}

/// Outcome of `incr` / `decr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrDecrResult {
    Success(u64),
    NotFound,
    NotNumeric,
}

/// Outcome of `append` / `prepend`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendPrependResult {
    Success,
    NotFound,
}

/// Outcome of `delete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteResult {
    Deleted,
    NotFound,
}

/// Configuration for KV store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KVConfig {
    /// Maximum memory in MB
    pub max_memory_mb: usize,
    /// Expired item cleanup interval in milliseconds
    pub ttl_cleanup_interval_ms: u64,
}

impl Default for KVConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 4096,
            ttl_cleanup_interval_ms: 100,
        }
    }
}

/// Statistics for KV store
#[derive(Debug, Default, Clone, Serialize)]
pub struct KVStats {
    /// Total number of keys
    pub total_keys: usize,
    /// Estimated memory usage in bytes
    pub total_memory_bytes: usize,
    /// Number of GET operations
    pub gets: u64,
    /// Number of successful mutations
    pub sets: u64,
    /// Number of DELETE operations
    pub dels: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
}

impl KVStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
