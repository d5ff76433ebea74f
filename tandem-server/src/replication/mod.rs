/// Replication module - slave side of master-slave replication
///
/// Design:
/// - 1 Master node streams its data set and live mutations
/// - This node is a read-only slave applying that stream to a local store
/// - Failover: the slave stops answering queries while out of sync and
///   notifies an external script
///
/// Features:
/// - Handshake, backfill and live stream over a checksummed frame codec
/// - Exponential reconnect backoff with give-up for a flapping master
/// - Admin controls: `failover-reset`, `new-master`
pub mod backoff;
pub mod config;
pub mod control;
pub mod failover;
pub mod protocol;
pub mod session;
pub mod slave;
pub mod types;

pub use backoff::ReconnectBackoff;
pub use config::{BackoffConfig, FailoverConfig, MasterAddress, ReplicationConfig};
pub use control::{ControlCommand, ControlInfo, ControlTable};
pub use failover::{
    FailoverController, FailoverState, RecoveryAction, ScriptRecoveryAction, ServingFlag,
};
pub use protocol::{Hello, Message};
pub use slave::{ReplicationSlave, SlaveStatus};
pub use types::{
    CloseReason, ReplicationError, ReplicationResult, ReplicationStats, SlaveConnectionState,
};
