//! Binds the debug RPC surface to a running node.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde_json::Value;
use tokio::sync::mpsc;

use meridian_rpc::{AuthorityInfo, DebugBackend, FilterState, NetworkInfo, ServerInfo};

use crate::config::NodeConfig;
use crate::ingress::{FaultInjection, MessageFilters};
use crate::node_state::{NodeState, Server, ServerRole};

pub struct NodeDebugApi {
    config: RwLock<NodeConfig>,
    config_path: Option<PathBuf>,
    state: Arc<NodeState>,
    faults: Arc<FaultInjection>,
    filters: Arc<MessageFilters>,
    predictive_fer: AtomicU64,
    control_tx: mpsc::Sender<String>,
}

impl NodeDebugApi {
    pub fn new(
        config: NodeConfig,
        config_path: Option<PathBuf>,
        state: Arc<NodeState>,
        faults: Arc<FaultInjection>,
        filters: Arc<MessageFilters>,
        control_tx: mpsc::Sender<String>,
    ) -> Self {
        let predictive_fer = AtomicU64::new(config.predictive_fer);
        Self {
            config: RwLock::new(config),
            config_path,
            state,
            faults,
            filters,
            predictive_fer,
            control_tx,
        }
    }

    fn server_info(servers: Vec<Server>) -> Vec<ServerInfo> {
        servers
            .into_iter()
            .map(|s| ServerInfo {
                chain_id: s.chain_id.to_string(),
                name: s.name,
                online: s.online,
            })
            .collect()
    }

    fn validate_filter(pattern: &str) -> Result<(), String> {
        match pattern {
            "" | "off" => Ok(()),
            p => Regex::new(p).map(|_| ()).map_err(|e| e.to_string()),
        }
    }
}

impl DebugBackend for NodeDebugApi {
    fn audit_servers(&self) -> Vec<ServerInfo> {
        Self::server_info(self.state.audit_servers())
    }

    fn federated_servers(&self) -> Vec<ServerInfo> {
        Self::server_info(self.state.federated_servers())
    }

    fn authorities(&self) -> Vec<AuthorityInfo> {
        self.state
            .authorities()
            .into_iter()
            .map(|a| AuthorityInfo {
                chain_id: a.chain_id.to_string(),
                role: match a.role {
                    ServerRole::Federated => "federated",
                    ServerRole::Audit => "audit",
                }
                .to_string(),
            })
            .collect()
    }

    fn configuration(&self) -> Value {
        let mut config = self.config.read().unwrap_or_else(|e| e.into_inner()).clone();
        if config.rpc_pass.is_some() {
            config.rpc_pass = Some("********".to_string());
        }
        serde_json::to_value(&config).unwrap_or(Value::Null)
    }

    fn reload_configuration(&self) -> Result<Value, String> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| "node was started without a configuration file".to_string())?;
        let fresh = NodeConfig::from_toml_file(path).map_err(|e| e.to_string())?;

        self.faults.set_drop_rate(fresh.drop_rate);
        self.faults.set_delay_ms(fresh.delay_ms);
        self.state.set_leader(fresh.leader);
        self.predictive_fer
            .store(fresh.predictive_fer, Ordering::Relaxed);
        tracing::info!(
            path = %path.display(),
            drop_rate = fresh.drop_rate,
            delay_ms = fresh.delay_ms,
            leader = fresh.leader,
            "configuration reloaded"
        );

        *self.config.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        Ok(self.configuration())
    }

    fn current_minute(&self) -> u8 {
        self.state.current_minute()
    }

    fn delay(&self) -> u64 {
        self.faults.delay_ms()
    }

    fn set_delay(&self, delay_ms: u64) -> u64 {
        self.faults.set_delay_ms(delay_ms);
        tracing::info!(delay_ms, "delivery delay set over RPC");
        delay_ms
    }

    fn drop_rate(&self) -> u32 {
        self.faults.drop_rate()
    }

    fn set_drop_rate(&self, per_mille: u32) -> u32 {
        let applied = self.faults.set_drop_rate(per_mille);
        tracing::info!(drop_rate = applied, "drop rate set over RPC");
        applied
    }

    fn holding_queue(&self) -> Vec<Value> {
        self.state
            .holding_queue()
            .iter()
            .filter_map(|m| serde_json::to_value(m).ok())
            .collect()
    }

    fn messages(&self) -> Vec<Value> {
        self.state
            .journal()
            .iter()
            .filter_map(|m| serde_json::to_value(m).ok())
            .collect()
    }

    fn network_info(&self) -> NetworkInfo {
        let info = self.state.network_info();
        NetworkInfo {
            network_number: info.network_number,
            network_name: info.network_name.to_string(),
            network_id: info.network_id,
        }
    }

    fn summary(&self) -> String {
        self.state.summary()
    }

    fn predictive_fer(&self) -> u64 {
        self.predictive_fer.load(Ordering::Relaxed)
    }

    fn process_list(&self) -> String {
        self.state.process_list_string()
    }

    fn sim_ctrl(&self, commands: Vec<String>) -> Result<usize, String> {
        let mut queued = 0;
        for cmd in commands {
            tracing::info!(command = %cmd, "queueing control command");
            self.control_tx
                .try_send(cmd)
                .map_err(|e| format!("control queue: {e}"))?;
            queued += 1;
        }
        Ok(queued)
    }

    fn message_filter(&self, output: &str, input: &str) -> Result<FilterState, String> {
        // Check both before applying either.
        Self::validate_filter(output)?;
        Self::validate_filter(input)?;
        self.filters.set_output(output).map_err(|e| e.to_string())?;
        self.filters.set_input(input).map_err(|e| e.to_string())?;
        Ok(FilterState {
            input: self.filters.input(),
            output: self.filters.output(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use crate::queues::queue_set;
    use crate::state::ConsensusState;

    struct Fixture {
        api: NodeDebugApi,
        state: Arc<NodeState>,
        control_rx: mpsc::Receiver<String>,
    }

    fn fixture(config_path: Option<PathBuf>) -> Fixture {
        let config = NodeConfig {
            rpc_user: Some("admin".into()),
            rpc_pass: Some("secret".into()),
            ..NodeConfig::default()
        };
        let metrics = NodeMetrics::new();
        let (_p, _d, queues) = queue_set(&config, &metrics.inbound_queue_depth);
        let filters = Arc::new(MessageFilters::new());
        let state = Arc::new(NodeState::new(&config, queues, filters.clone()).unwrap());
        state.install_authority(state.identity(), "FNode0");
        let (control_tx, control_rx) = mpsc::channel(2);
        let api = NodeDebugApi::new(
            config,
            config_path,
            state.clone(),
            Arc::new(FaultInjection::default()),
            filters,
            control_tx,
        );
        Fixture {
            api,
            state,
            control_rx,
        }
    }

    #[test]
    fn configuration_hides_password() {
        let f = fixture(None);
        let config = f.api.configuration();
        assert_eq!(config["rpc_user"], "admin");
        assert_eq!(config["rpc_pass"], "********");
    }

    #[test]
    fn invalid_filter_changes_nothing() {
        let f = fixture(None);
        f.api.message_filter("EOM", "").unwrap();
        let err = f.api.message_filter("ACK", "[unclosed").unwrap_err();
        assert!(!err.is_empty());
        assert_eq!(f.api.filters.output().as_deref(), Some("EOM"));
        assert_eq!(f.api.filters.input(), None);

        let state = f.api.message_filter("off", "HEARTBEAT").unwrap();
        assert_eq!(state.output, None);
        assert_eq!(state.input.as_deref(), Some("HEARTBEAT"));
    }

    #[test]
    fn sim_ctrl_forwards_until_full() {
        let mut f = fixture(None);
        assert_eq!(f.api.sim_ctrl(vec!["summary".into()]), Ok(1));
        assert_eq!(f.control_rx.try_recv().unwrap(), "summary");
        let err = f
            .api
            .sim_ctrl(vec!["a".into(), "b".into(), "c".into()])
            .unwrap_err();
        assert!(err.contains("control queue"));
    }

    #[test]
    fn reload_applies_runtime_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meridian.toml");
        std::fs::write(
            &path,
            "leader = true\ndrop_rate = 125\ndelay_ms = 30\npredictive_fer = 9000\n",
        )
        .unwrap();
        let f = fixture(Some(path));
        let config = f.api.reload_configuration().unwrap();
        assert_eq!(config["drop_rate"], 125);
        assert_eq!(f.api.drop_rate(), 125);
        assert_eq!(f.api.delay(), 30);
        assert_eq!(f.api.predictive_fer(), 9000);
        assert!(f.state.leader_view().run_leader);
    }

    #[test]
    fn reload_without_file_fails() {
        let f = fixture(None);
        assert!(f.api.reload_configuration().is_err());
    }

    #[test]
    fn server_lists_use_hex_ids() {
        let f = fixture(None);
        let servers = f.api.federated_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].chain_id, f.state.identity().to_string());
        assert_eq!(f.api.authorities()[0].role, "federated");
        assert!(f.api.audit_servers().is_empty());
    }
}
