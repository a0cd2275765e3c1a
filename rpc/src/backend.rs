//! The node-side surface behind the debug API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub chain_id: String,
    pub name: String,
    pub online: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityInfo {
    pub chain_id: String,
    /// "federated" or "audit".
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub network_number: u8,
    pub network_name: String,
    pub network_id: u32,
}

/// Active message filters after an update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub input: Option<String>,
    pub output: Option<String>,
}

/// Everything the debug API can read or change on a running node.
///
/// Methods must not block: they run on the server's async workers.
pub trait DebugBackend: Send + Sync + 'static {
    fn audit_servers(&self) -> Vec<ServerInfo>;

    fn federated_servers(&self) -> Vec<ServerInfo>;

    fn authorities(&self) -> Vec<AuthorityInfo>;

    /// The effective configuration.
    fn configuration(&self) -> Value;

    /// Re-read the configuration file and apply its runtime-adjustable
    /// settings. Returns the new configuration.
    fn reload_configuration(&self) -> Result<Value, String>;

    fn current_minute(&self) -> u8;

    /// Inbound delivery delay in milliseconds.
    fn delay(&self) -> u64;

    fn set_delay(&self, delay_ms: u64) -> u64;

    /// Inbound drop rate in parts per thousand.
    fn drop_rate(&self) -> u32;

    /// Returns the rate actually applied.
    fn set_drop_rate(&self, per_mille: u32) -> u32;

    fn holding_queue(&self) -> Vec<Value>;

    /// Recently processed messages, oldest first.
    fn messages(&self) -> Vec<Value>;

    fn network_info(&self) -> NetworkInfo;

    fn summary(&self) -> String;

    fn predictive_fer(&self) -> u64;

    fn process_list(&self) -> String;

    /// Queue operator commands. Returns how many were accepted.
    fn sim_ctrl(&self, commands: Vec<String>) -> Result<usize, String>;

    /// Update the message filters. `"off"` clears a filter and `""` leaves it
    /// unchanged. An invalid pattern is an error and changes nothing.
    fn message_filter(&self, output: &str, input: &str) -> Result<FilterState, String>;
}
