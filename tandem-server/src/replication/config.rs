use super::types::{ReplicationError, ReplicationResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Initial time to wait before reconnecting to the master after a failure (ms)
pub const INITIAL_TIMEOUT_MS: u64 = 100;
/// Every failed reconnect multiplies the wait by this factor
pub const TIMEOUT_GROWTH_FACTOR: u64 = 2;
/// Width of the window used to detect a flapping master (seconds)
pub const N_SECONDS: u64 = 5 * 60;
/// More successful reconnects than this inside the window means we give up
pub const MAX_RECONNECTS_PER_N_SECONDS: usize = 5;

/// Address of the master a slave replicates from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for MasterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses the admin syntax `"<host> <port>"`
impl FromStr for MasterAddress {
    type Err = ReplicationError;

    fn from_str(s: &str) -> ReplicationResult<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let [host, port] = parts.as_slice() else {
            return Err(ReplicationError::InvalidControlArgs(format!(
                "expected \"<host> <port>\", got {:?}",
                s
            )));
        };

        let port: u16 = port.parse().map_err(|_| {
            ReplicationError::InvalidControlArgs(format!(
                "port must be a number between 1 and 65535, got {:?}",
                port
            ))
        })?;
        if port == 0 {
            return Err(ReplicationError::InvalidControlArgs(
                "port must be a number between 1 and 65535, got \"0\"".to_string(),
            ));
        }

        Ok(Self {
            host: (*host).to_string(),
            port,
        })
    }
}

/// Replication configuration for one connection attempt
///
/// Replaced wholesale by `new-master`, never patched while an attempt is in
/// flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Master host name or IP
    pub master_host: String,

    /// Master replication port
    pub master_port: u16,

    /// Give up on a TCP connect after this long (ms)
    pub connect_timeout_ms: u64,

    /// Fail the connection if the master stays silent this long (ms)
    pub inactivity_timeout_ms: Option<u64>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            master_host: "127.0.0.1".to_string(),
            master_port: 15501,
            connect_timeout_ms: 5000,
            inactivity_timeout_ms: None,
        }
    }
}

impl ReplicationConfig {
    /// Validate configuration
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.master_host.trim().is_empty() {
            return Err(ReplicationError::InvalidConfig(
                "master_host must not be empty".to_string(),
            ));
        }
        if self.master_port == 0 {
            return Err(ReplicationError::InvalidConfig(
                "master_port must not be 0".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ReplicationError::InvalidConfig(
                "connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.inactivity_timeout_ms == Some(0) {
            return Err(ReplicationError::InvalidConfig(
                "inactivity_timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn master(&self) -> MasterAddress {
        MasterAddress {
            host: self.master_host.clone(),
            port: self.master_port,
        }
    }

    /// Same settings, pointed at another master
    pub fn with_master(&self, master: MasterAddress) -> Self {
        Self {
            master_host: master.host,
            master_port: master.port,
            ..self.clone()
        }
    }
}

/// Recovery action settings, read-only after startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Script run with `down` on master failure and `up` on resume
    pub script: Option<PathBuf>,

    /// Extra arguments passed before the `down`/`up` argument
    pub script_args: Vec<String>,
}

/// Reconnect backoff and give-up policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_timeout_ms: u64,

    pub growth_factor: u64,

    /// Upper bound for the reconnect delay; unbounded when unset
    pub max_timeout_ms: Option<u64>,

    /// Trailing window for give-up accounting (seconds)
    pub window_secs: u64,

    /// Successful reconnects tolerated inside the window
    pub max_reconnects_per_window: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_timeout_ms: INITIAL_TIMEOUT_MS,
            growth_factor: TIMEOUT_GROWTH_FACTOR,
            max_timeout_ms: None,
            window_secs: N_SECONDS,
            max_reconnects_per_window: MAX_RECONNECTS_PER_N_SECONDS,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.initial_timeout_ms == 0 {
            return Err(ReplicationError::InvalidConfig(
                "initial_timeout_ms must be positive".to_string(),
            ));
        }
        if self.growth_factor == 0 {
            return Err(ReplicationError::InvalidConfig(
                "growth_factor must be at least 1".to_string(),
            ));
        }
        if let Some(max) = self.max_timeout_ms {
            if max < self.initial_timeout_ms {
                return Err(ReplicationError::InvalidConfig(
                    "max_timeout_ms must not be below initial_timeout_ms".to_string(),
                ));
            }
        }
        Ok(())
    }
}
