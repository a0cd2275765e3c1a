//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use meridian_crypto::{keypair_from_seed, seed_from_label};
use meridian_types::{ChainId, KeyPair, NetworkId};

use crate::logging::LogFormat;
use crate::NodeError;

/// Number of minutes in a block.
pub const MINUTES_PER_BLOCK: u32 = 10;

/// Configuration for a Meridian node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which federation to join.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Name used in logs and status output.
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Data directory for the LMDB store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Hex-encoded 32-byte identity seed. Derived from `node_name` when unset.
    #[serde(default)]
    pub identity_seed: Option<String>,

    /// Hex-encoded chain id of the first authority, installed by the
    /// bootstrap phase when the authority set is empty. Defaults to this
    /// node's own identity.
    #[serde(default)]
    pub bootstrap_identity: Option<String>,

    /// Whether this node starts as a leader.
    #[serde(default)]
    pub leader: bool,

    /// Block duration in seconds. One minute is a tenth of it.
    #[serde(default = "default_block_time_secs")]
    pub block_time_secs: u64,

    #[serde(default = "default_inbound_queue_capacity")]
    pub inbound_queue_capacity: usize,

    #[serde(default = "default_ticker_queue_capacity")]
    pub ticker_queue_capacity: usize,

    #[serde(default = "default_ack_queue_capacity")]
    pub ack_queue_capacity: usize,

    #[serde(default = "default_msg_queue_capacity")]
    pub msg_queue_capacity: usize,

    /// Seconds between state snapshots; 0 disables periodic saving.
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// How long the supervisor waits for the processing engine to release
    /// its resources after shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Forces the starting entry height when non-negative; -1 reads it from
    /// the store.
    #[serde(default = "default_sync2")]
    pub sync2: i64,

    /// Whether to serve the debug JSON-RPC API.
    #[serde(default = "default_true")]
    pub enable_rpc: bool,

    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// Basic-auth user for the debug API; auth is off unless both user and
    /// password are set.
    #[serde(default)]
    pub rpc_user: Option<String>,

    #[serde(default)]
    pub rpc_pass: Option<String>,

    /// Whether to serve Prometheus metrics on `/metrics`.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Inbound drop probability in parts per thousand.
    #[serde(default)]
    pub drop_rate: u32,

    /// Artificial inbound delivery delay in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,

    /// Predicted exchange rate reported by the debug API.
    #[serde(default)]
    pub predictive_fer: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Local
}

fn default_node_name() -> String {
    "FNode0".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./meridian_data")
}

fn default_block_time_secs() -> u64 {
    600
}

fn default_inbound_queue_capacity() -> usize {
    5000
}

fn default_ticker_queue_capacity() -> usize {
    100
}

fn default_ack_queue_capacity() -> usize {
    5000
}

fn default_msg_queue_capacity() -> usize {
    5000
}

fn default_snapshot_interval_secs() -> u64 {
    60
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_sync2() -> i64 {
    -1
}

fn default_true() -> bool {
    true
}

fn default_rpc_port() -> u16 {
    8088
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.block_time_secs == 0 {
            return Err(NodeError::Config("block_time_secs must be positive".into()));
        }
        for (name, cap) in [
            ("inbound_queue_capacity", self.inbound_queue_capacity),
            ("ticker_queue_capacity", self.ticker_queue_capacity),
            ("ack_queue_capacity", self.ack_queue_capacity),
            ("msg_queue_capacity", self.msg_queue_capacity),
        ] {
            if cap == 0 {
                return Err(NodeError::Config(format!("{name} must be positive")));
            }
        }
        if self.drop_rate > 1000 {
            return Err(NodeError::Config(format!(
                "drop_rate is per-mille, got {}",
                self.drop_rate
            )));
        }
        if LogFormat::parse(&self.log_format).is_none() {
            return Err(NodeError::Config(format!(
                "unknown log_format '{}'",
                self.log_format
            )));
        }
        Ok(())
    }

    /// Duration of one minute (round).
    pub fn minute_duration(&self) -> Duration {
        Duration::from_secs(self.block_time_secs) / MINUTES_PER_BLOCK
    }

    /// Delay before a suppressed round-end tick is retried.
    pub fn retry_delay(&self) -> Duration {
        self.minute_duration() / 10
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn snapshot_interval(&self) -> Option<Duration> {
        (self.snapshot_interval_secs > 0).then(|| Duration::from_secs(self.snapshot_interval_secs))
    }

    /// Signing identity: from `identity_seed` when set, otherwise derived
    /// deterministically from the node name.
    pub fn identity_keypair(&self) -> Result<KeyPair, NodeError> {
        let seed = match &self.identity_seed {
            Some(hex_seed) => {
                let bytes = hex::decode(hex_seed)
                    .map_err(|e| NodeError::Config(format!("identity_seed: {e}")))?;
                let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
                    NodeError::Config(format!("identity_seed: expected 32 bytes, got {}", b.len()))
                })?;
                seed
            }
            None => seed_from_label(&self.node_name),
        };
        Ok(keypair_from_seed(&seed))
    }

    pub fn bootstrap_chain_id(&self) -> Result<Option<ChainId>, NodeError> {
        self.bootstrap_identity
            .as_deref()
            .map(|s| {
                s.parse::<ChainId>()
                    .map_err(|e| NodeError::Config(format!("bootstrap_identity: {e}")))
            })
            .transpose()
    }

    /// Basic-auth credentials, when both halves are configured.
    pub fn rpc_credentials(&self) -> Option<(String, String)> {
        match (&self.rpc_user, &self.rpc_pass) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.clone(), pass.clone())),
            _ => None,
        }
    }

    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.log_format).unwrap_or(LogFormat::Human)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            node_name: default_node_name(),
            data_dir: default_data_dir(),
            identity_seed: None,
            bootstrap_identity: None,
            leader: false,
            block_time_secs: default_block_time_secs(),
            inbound_queue_capacity: default_inbound_queue_capacity(),
            ticker_queue_capacity: default_ticker_queue_capacity(),
            ack_queue_capacity: default_ack_queue_capacity(),
            msg_queue_capacity: default_msg_queue_capacity(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            sync2: default_sync2(),
            enable_rpc: default_true(),
            rpc_port: default_rpc_port(),
            rpc_user: None,
            rpc_pass: None,
            enable_metrics: false,
            log_format: default_log_format(),
            log_level: default_log_level(),
            drop_rate: 0,
            delay_ms: 0,
            predictive_fer: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.minute_duration(), Duration::from_secs(60));
        assert_eq!(config.retry_delay(), Duration::from_secs(6));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(config.sync2, -1);
    }

    #[test]
    fn partial_toml_overrides() {
        let config = NodeConfig::from_toml_str(
            r#"
            network = "test"
            node_name = "FNode3"
            leader = true
            block_time_secs = 60
            drop_rate = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.network, NetworkId::Test);
        assert_eq!(config.node_name, "FNode3");
        assert!(config.leader);
        assert_eq!(config.minute_duration(), Duration::from_secs(6));
        assert_eq!(config.retry_delay(), Duration::from_millis(600));
        assert_eq!(config.drop_rate, 250);
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = NodeConfig::default();
        config.rpc_user = Some("admin".into());
        config.rpc_pass = Some("secret".into());
        let text = config.to_toml_string().unwrap();
        assert_eq!(NodeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            NodeConfig::from_toml_str("block_time_secs = 0"),
            Err(NodeError::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("drop_rate = 1001"),
            Err(NodeError::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("log_format = \"xml\""),
            Err(NodeError::Config(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("leader = \"yes\""),
            Err(NodeError::Config(_))
        ));
    }

    #[test]
    fn identity_is_stable_per_node_name() {
        let a = NodeConfig::default().identity_keypair().unwrap();
        let b = NodeConfig::default().identity_keypair().unwrap();
        assert_eq!(a.public, b.public);

        let other = NodeConfig {
            node_name: "FNode1".into(),
            ..NodeConfig::default()
        };
        assert_ne!(other.identity_keypair().unwrap().public, a.public);
    }

    #[test]
    fn explicit_seed_must_be_32_bytes() {
        let config = NodeConfig {
            identity_seed: Some("abcd".into()),
            ..NodeConfig::default()
        };
        assert!(matches!(config.identity_keypair(), Err(NodeError::Config(_))));

        let config = NodeConfig {
            identity_seed: Some("07".repeat(32)),
            ..NodeConfig::default()
        };
        assert_eq!(
            config.identity_keypair().unwrap().public,
            keypair_from_seed(&[7u8; 32]).public
        );
    }

    #[test]
    fn credentials_need_both_halves() {
        let mut config = NodeConfig::default();
        assert_eq!(config.rpc_credentials(), None);
        config.rpc_user = Some("u".into());
        assert_eq!(config.rpc_credentials(), None);
        config.rpc_pass = Some("p".into());
        assert_eq!(config.rpc_credentials(), Some(("u".into(), "p".into())));
    }
}
