use super::error::{Result, StoreError};
use super::store::Store;
use super::types::{
    AppendPrependResult, CasUnique, DeleteResult, ExpTime, Flags, IncrDecrResult, Item, KVConfig,
    KVStats, SetResult, StoredValue,
};
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_KEY_LEN: usize = 250;

/// How a set-family write treats an existing item
#[derive(Debug, Clone, Copy)]
enum StoreMode {
    Set,
    Add,
    Replace,
    Cas(CasUnique),
}

/// Key-Value store using radix trie for memory-efficient storage
#[derive(Clone)]
pub struct KVStore {
    data: Arc<RwLock<Trie<String, StoredValue>>>,
    stats: Arc<RwLock<KVStats>>,
    next_cas: Arc<AtomicU64>,
    config: KVConfig,
}

impl KVStore {
    /// Create a new KV store with the given configuration
    pub fn new(config: KVConfig) -> Self {
        info!(
            "Initializing KV store with max_memory={}MB",
            config.max_memory_mb
        );

        Self {
            data: Arc::new(RwLock::new(Trie::new())),
            stats: Arc::new(RwLock::new(KVStats::default())),
            next_cas: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    /// Start background expired-item cleanup task
    pub fn start_ttl_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let interval_ms = self.config.ttl_cleanup_interval_ms;
        info!("Starting TTL cleanup task (interval={}ms)", interval_ms);

        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));

            loop {
                interval.tick().await;
                store.cleanup_expired();
            }
        })
    }

    /// Get statistics
    pub fn stats(&self) -> KVStats {
        self.stats.read().clone()
    }

    fn validate_key(key: &str) -> Result<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(StoreError::InvalidKey(format!(
                "key length must be 1..={} bytes",
                MAX_KEY_LEN
            )));
        }
        if key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
            return Err(StoreError::InvalidKey(
                "key contains whitespace or control characters".to_string(),
            ));
        }
        Ok(())
    }

    fn next_cas(&self) -> CasUnique {
        self.next_cas.fetch_add(1, Ordering::SeqCst)
    }

    /// Drop `key` if its value has expired so callers only see live items
    fn purge_expired(&self, data: &mut Trie<String, StoredValue>, key: &str) {
        if data.get(key).is_some_and(|v| v.is_expired()) {
            if let Some(old) = data.remove(key) {
                debug!("Key expired: {}", key);
                let mut stats = self.stats.write();
                stats.total_keys = stats.total_keys.saturating_sub(1);
                stats.total_memory_bytes = stats
                    .total_memory_bytes
                    .saturating_sub(Self::estimate_entry_size(key, &old));
            }
        }
    }

    /// Insert `value`, enforcing the memory limit against the entry it replaces
    fn insert_value(
        &self,
        data: &mut Trie<String, StoredValue>,
        key: &str,
        value: StoredValue,
    ) -> Result<()> {
        let new_size = Self::estimate_entry_size(key, &value);
        let old_size = data
            .get(key)
            .map(|old| Self::estimate_entry_size(key, old))
            .unwrap_or(0);

        let mut stats = self.stats.write();
        let max_bytes = self.config.max_memory_mb * 1024 * 1024;
        let projected = (stats.total_memory_bytes + new_size).saturating_sub(old_size);
        if projected > max_bytes {
            warn!(
                "Memory limit exceeded: {}/{}",
                stats.total_memory_bytes, max_bytes
            );
            return Err(StoreError::MemoryLimitExceeded);
        }

        if data.insert(key.to_string(), value).is_none() {
            stats.total_keys += 1;
        }
        stats.total_memory_bytes = projected;
        stats.sets += 1;
        Ok(())
    }

    fn store(
        &self,
        mode: StoreMode,
        key: &str,
        value: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
    ) -> Result<SetResult> {
        Self::validate_key(key)?;
        debug!(
            "STORE mode={:?} key={}, size={}, flags={}, exptime={}",
            mode,
            key,
            value.len(),
            flags,
            exptime
        );

        let mut data = self.data.write();
        self.purge_expired(&mut data, key);

        let existing_cas = data.get(key).map(|v| v.cas);
        match (mode, existing_cas) {
            (StoreMode::Add, Some(_)) => return Ok(SetResult::NotStored),
            (StoreMode::Replace, None) => return Ok(SetResult::NotStored),
            (StoreMode::Cas(_), None) => return Ok(SetResult::NotFound),
            (StoreMode::Cas(expected), Some(actual)) if expected != actual => {
                return Ok(SetResult::Exists);
            }
            _ => {}
        }

        let stored = StoredValue::new(value, flags, exptime, self.next_cas());
        self.insert_value(&mut data, key, stored)?;
        Ok(SetResult::Stored)
    }

    fn adjust(&self, key: &str, amount: u64, incr: bool) -> Result<IncrDecrResult> {
        Self::validate_key(key)?;
        debug!("INCR/DECR key={}, amount={}, incr={}", key, amount, incr);

        let mut data = self.data.write();
        self.purge_expired(&mut data, key);

        let Some(current) = data.get(key) else {
            return Ok(IncrDecrResult::NotFound);
        };
        let Some(number) = std::str::from_utf8(&current.data)
            .ok()
            .and_then(|s| s.trim_end().parse::<u64>().ok())
        else {
            return Ok(IncrDecrResult::NotNumeric);
        };

        let new_value = if incr {
            number.wrapping_add(amount)
        } else {
            number.saturating_sub(amount)
        };

        let mut updated = current.clone();
        updated.data = new_value.to_string().into_bytes();
        updated.cas = self.next_cas();
        updated.update_access();
        self.insert_value(&mut data, key, updated)?;

        Ok(IncrDecrResult::Success(new_value))
    }

    fn concat(&self, key: &str, extra: Vec<u8>, append: bool) -> Result<AppendPrependResult> {
        Self::validate_key(key)?;
        debug!(
            "APPEND/PREPEND key={}, size={}, append={}",
            key,
            extra.len(),
            append
        );

        let mut data = self.data.write();
        self.purge_expired(&mut data, key);

        let Some(current) = data.get(key) else {
            return Ok(AppendPrependResult::NotFound);
        };

        let mut updated = current.clone();
        if append {
            updated.data.extend_from_slice(&extra);
        } else {
            let mut joined = extra;
            joined.extend_from_slice(&current.data);
            updated.data = joined;
        }
        updated.cas = self.next_cas();
        self.insert_value(&mut data, key, updated)?;

        Ok(AppendPrependResult::Success)
    }

    fn lookup(&self, key: &str, with_cas: bool) -> Result<Option<Item>> {
        Self::validate_key(key)?;
        debug!("GET key={}, cas={}", key, with_cas);

        let mut data = self.data.write();
        self.purge_expired(&mut data, key);

        let item = data.get_mut(key).map(|value| {
            value.update_access();
            value.to_item(with_cas)
        });

        let mut stats = self.stats.write();
        stats.gets += 1;
        if item.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        Ok(item)
    }

    /// Clean up expired keys
    fn cleanup_expired(&self) {
        let mut data = self.data.write();

        let expired_keys: Vec<String> = data
            .iter()
            .filter(|(_, v)| v.is_expired())
            .map(|(k, _)| k.clone())
            .collect();

        if !expired_keys.is_empty() {
            debug!("Cleaning up {} expired keys", expired_keys.len());
            let mut stats = self.stats.write();
            for key in expired_keys {
                if let Some(old) = data.remove(&key) {
                    stats.total_keys = stats.total_keys.saturating_sub(1);
                    stats.total_memory_bytes = stats
                        .total_memory_bytes
                        .saturating_sub(Self::estimate_entry_size(&key, &old));
                }
            }
        }
    }

    /// Estimate memory size of an entry
    fn estimate_entry_size(key: &str, value: &StoredValue) -> usize {
        key.len() + value.data.len() + std::mem::size_of::<StoredValue>()
    }
}

impl Store for KVStore {
    fn get(&self, key: &str) -> Result<Option<Item>> {
        self.lookup(key, false)
    }

    fn get_cas(&self, key: &str) -> Result<Option<Item>> {
        self.lookup(key, true)
    }

    fn set(&self, key: &str, data: Vec<u8>, flags: Flags, exptime: ExpTime) -> Result<SetResult> {
        self.store(StoreMode::Set, key, data, flags, exptime)
    }

    fn add(&self, key: &str, data: Vec<u8>, flags: Flags, exptime: ExpTime) -> Result<SetResult> {
        self.store(StoreMode::Add, key, data, flags, exptime)
    }

    fn replace(
        &self,
        key: &str,
        data: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
    ) -> Result<SetResult> {
        self.store(StoreMode::Replace, key, data, flags, exptime)
    }

    fn cas(
        &self,
        key: &str,
        data: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
        unique: CasUnique,
    ) -> Result<SetResult> {
        self.store(StoreMode::Cas(unique), key, data, flags, exptime)
    }

    fn incr(&self, key: &str, amount: u64) -> Result<IncrDecrResult> {
        self.adjust(key, amount, true)
    }

    fn decr(&self, key: &str, amount: u64) -> Result<IncrDecrResult> {
        self.adjust(key, amount, false)
    }

    fn append(&self, key: &str, data: Vec<u8>) -> Result<AppendPrependResult> {
        self.concat(key, data, true)
    }

    fn prepend(&self, key: &str, data: Vec<u8>) -> Result<AppendPrependResult> {
        self.concat(key, data, false)
    }

    fn delete(&self, key: &str) -> Result<DeleteResult> {
        Self::validate_key(key)?;
        debug!("DELETE key={}", key);

        let mut data = self.data.write();
        self.purge_expired(&mut data, key);

        match data.remove(key) {
            Some(old) => {
                let mut stats = self.stats.write();
                stats.dels += 1;
                stats.total_keys = stats.total_keys.saturating_sub(1);
                stats.total_memory_bytes = stats
                    .total_memory_bytes
                    .saturating_sub(Self::estimate_entry_size(key, &old));
                Ok(DeleteResult::Deleted)
            }
            None => Ok(DeleteResult::NotFound),
        }
    }
}
