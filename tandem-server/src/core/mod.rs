pub mod error;
pub mod kv_store;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use kv_store::KVStore;
pub use store::Store;
pub use types::{
    AppendPrependResult, CasUnique, DeleteResult, ExpTime, Flags, IncrDecrResult, Item, KVConfig,
    KVStats, SetResult, StoredValue,
};
