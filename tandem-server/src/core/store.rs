use super::error::Result;
use super::types::{
    AppendPrependResult, CasUnique, DeleteResult, ExpTime, Flags, IncrDecrResult, Item, SetResult,
};

/// Memcached-style storage interface
///
/// Implemented by the local [`KVStore`](super::KVStore) and, by delegation,
/// by the replication slave that fronts it. Implementations carry their own
/// concurrency discipline; callers never add locking around them.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Item>>;

    /// Like `get`, but the returned item carries its CAS unique
    fn get_cas(&self, key: &str) -> Result<Option<Item>>;

    fn set(&self, key: &str, data: Vec<u8>, flags: Flags, exptime: ExpTime) -> Result<SetResult>;

    /// Store only if the key is absent
    fn add(&self, key: &str, data: Vec<u8>, flags: Flags, exptime: ExpTime) -> Result<SetResult>;

    /// Store only if the key is present
    fn replace(
        &self,
        key: &str,
        data: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
    ) -> Result<SetResult>;

    /// Store only if the item still carries `unique`
    fn cas(
        &self,
        key: &str,
        data: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
        unique: CasUnique,
    ) -> Result<SetResult>;

    fn incr(&self, key: &str, amount: u64) -> Result<IncrDecrResult>;

    fn decr(&self, key: &str, amount: u64) -> Result<IncrDecrResult>;

    fn append(&self, key: &str, data: Vec<u8>) -> Result<AppendPrependResult>;

    fn prepend(&self, key: &str, data: Vec<u8>) -> Result<AppendPrependResult>;

    fn delete(&self, key: &str) -> Result<DeleteResult>;
}
