//! Configuration for quorum-auction components
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file
//! (`auction.toml`, or the path in `AUCTION_CONFIG`), then `AUCTION__*`
//! environment variables (`AUCTION__COORDINATOR__BIND_ADDR=...`). The
//! binaries apply command-line overrides on top.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "auction.toml";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID (unique identifier)
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Coordinator-specific config
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Replica-specific config
    #[serde(default)]
    pub replica: ReplicaConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_node_id() -> String {
    "node-1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            coordinator: CoordinatorConfig::default(),
            replica: ReplicaConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default file location plus environment.
    pub fn load() -> crate::Result<Self> {
        let path = std::env::var("AUCTION_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load_from(Path::new(&path))
    }

    /// Load from a specific file (missing file is fine) plus environment.
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("AUCTION")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.coordinator.round_timeout_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "coordinator.round_timeout_ms must be positive".into(),
            ));
        }
        if self.replica.heartbeat_interval_ms == 0 {
            return Err(crate::Error::InvalidConfig(
                "replica.heartbeat_interval_ms must be positive".into(),
            ));
        }
        if self.coordinator.heartbeat_ttl_ms < self.replica.heartbeat_interval_ms {
            return Err(crate::Error::InvalidConfig(
                "coordinator.heartbeat_ttl_ms must not be shorter than replica.heartbeat_interval_ms"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_coord_bind")]
    pub bind_addr: SocketAddr,

    /// How long a round waits for replica answers
    #[serde(default = "default_round_timeout")]
    pub round_timeout_ms: u64,

    /// Replicas silent for longer than this are left out of rounds
    #[serde(default = "default_heartbeat_ttl")]
    pub heartbeat_ttl_ms: u64,

    /// Hex-encoded ed25519 secret key; a fresh one is generated when absent
    #[serde(default)]
    pub signing_key: Option<String>,

    /// Registered users: username → hex-encoded ed25519 public key
    #[serde(default)]
    pub users: BTreeMap<String, String>,

    /// Require a session token on auction endpoints
    #[serde(default)]
    pub require_session: bool,

    /// HMAC secret for session tokens; random per process when absent
    #[serde(default)]
    pub session_secret: Option<String>,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Audit log file (JSON lines); audit events only go to tracing when unset
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

fn default_coord_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}
fn default_round_timeout() -> u64 {
    1000
}
fn default_heartbeat_ttl() -> u64 {
    5000
}
fn default_session_ttl() -> u64 {
    900
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_coord_bind(),
            round_timeout_ms: default_round_timeout(),
            heartbeat_ttl_ms: default_heartbeat_ttl(),
            signing_key: None,
            users: BTreeMap::new(),
            require_session: false,
            session_secret: None,
            session_ttl_secs: default_session_ttl(),
            audit_log: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ttl_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Replica configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Bind address for the replica RPC endpoint
    #[serde(default = "default_replica_bind")]
    pub bind_addr: SocketAddr,

    /// URL peers and the coordinator use to reach this replica
    #[serde(default)]
    pub advertise_url: Option<String>,

    /// Coordinator base URL
    #[serde(default = "default_coordinator_url")]
    pub coordinator_url: String,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Bound on each peer's answer during state transfer
    #[serde(default = "default_join_timeout")]
    pub join_timeout_ms: u64,
}

fn default_replica_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6000))
}
fn default_coordinator_url() -> String {
    "http://127.0.0.1:5000".to_string()
}
fn default_heartbeat_interval() -> u64 {
    1000
}
fn default_join_timeout() -> u64 {
    2000
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_replica_bind(),
            advertise_url: None,
            coordinator_url: default_coordinator_url(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            join_timeout_ms: default_join_timeout(),
        }
    }
}

impl ReplicaConfig {
    /// Advertised URL, falling back to the bind address.
    pub fn advertise_url(&self) -> String {
        self.advertise_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.bind_addr))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.coordinator.round_timeout(), Duration::from_secs(1));
        assert_eq!(config.replica.advertise_url(), "http://127.0.0.1:6000");
        assert!(!config.coordinator.require_session);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auction.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
node_id = "coord-a"

[coordinator]
bind_addr = "127.0.0.1:7000"
round_timeout_ms = 250
require_session = true

[coordinator.users]
alice = "00aa"

[replica]
coordinator_url = "http://10.0.0.1:7000"
"#
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.node_id, "coord-a");
        assert_eq!(config.coordinator.bind_addr.port(), 7000);
        assert_eq!(config.coordinator.round_timeout_ms, 250);
        assert!(config.coordinator.require_session);
        assert_eq!(config.coordinator.users.get("alice").unwrap(), "00aa");
        assert_eq!(config.replica.coordinator_url, "http://10.0.0.1:7000");
        assert_eq!(config.replica.heartbeat_interval_ms, 1000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = Config::default();
        config.coordinator.round_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
