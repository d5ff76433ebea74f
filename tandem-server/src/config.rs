use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::KVConfig;
use crate::replication::{BackoffConfig, FailoverConfig, ReplicationConfig};

/// Main server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: Server,
    pub kv_store: KVStoreConfig,
    pub logging: LoggingConfig,
    pub replication: ReplicationConfig,
    pub failover: FailoverConfig,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 15500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KVStoreConfig {
    pub max_memory_mb: usize,
    pub ttl_cleanup_interval_ms: u64,
}

impl Default for KVStoreConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 4096,
            ttl_cleanup_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Check every section before anything is started
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kv_store.ttl_cleanup_interval_ms == 0 {
            anyhow::bail!("kv_store.ttl_cleanup_interval_ms must be positive");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            );
        }
        self.replication.validate()?;
        self.backoff.validate()?;
        Ok(())
    }

    /// Convert to KVConfig
    pub fn to_kv_config(&self) -> KVConfig {
        KVConfig {
            max_memory_mb: self.kv_store.max_memory_mb,
            ttl_cleanup_interval_ms: self.kv_store.ttl_cleanup_interval_ms,
        }
    }

    /// Get server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server_addr(), "0.0.0.0:15500");
        assert_eq!(config.to_kv_config().max_memory_mb, 4096);
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            r#"
server:
  port: 16000
logging:
  format: pretty
replication:
  master_host: db-1
  master_port: 15601
  inactivity_timeout_ms: 30000
failover:
  script: /usr/local/bin/failover.sh
  script_args: [replica-a]
backoff:
  max_timeout_ms: 60000
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 16000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.replication.master().to_string(), "db-1:15601");
        assert_eq!(config.replication.inactivity_timeout_ms, Some(30000));
        assert_eq!(config.failover.script_args, vec!["replica-a".to_string()]);
        assert_eq!(config.backoff.max_timeout_ms, Some(60000));
        assert_eq!(config.backoff.initial_timeout_ms, 100);
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let mut config = ServerConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.replication.master_port = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.backoff.growth_factor = 0;
        assert!(config.validate().is_err());
    }
}
