pub mod config;
pub mod core;
pub mod replication;
pub mod server;

// Re-export commonly used types
pub use config::ServerConfig;
pub use core::{KVConfig, KVStore, Store, StoreError};
pub use replication::{
    BackoffConfig, FailoverConfig, MasterAddress, ReplicationConfig, ReplicationError,
    ReplicationSlave, SlaveStatus,
};
pub use server::{AppState, create_router};
