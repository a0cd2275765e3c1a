//! Meridian daemon: entry point for running a federated node.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use meridian_node::{init_logging, Bootstrapper, ConsensusNode, NodeConfig, SupervisorOutcome};
use meridian_types::NetworkId;

#[derive(Parser)]
#[command(name = "meridian-daemon", about = "Meridian federated node daemon")]
struct Cli {
    /// Network to join: "main", "test", "local" or "custom".
    /// When a config file is provided, defaults to the file's network value.
    #[arg(long, env = "MERIDIAN_NETWORK")]
    network: Option<String>,

    /// Hex-encoded 4-byte magic for a custom network.
    #[arg(long, env = "MERIDIAN_CUSTOM_NET")]
    custom_net: Option<String>,

    /// Data directory for the node store.
    #[arg(long, env = "MERIDIAN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Node name used in logs and status output.
    #[arg(long, env = "MERIDIAN_NODE_NAME")]
    node_name: Option<String>,

    /// Start as a leader.
    #[arg(long, env = "MERIDIAN_LEADER")]
    leader: bool,

    /// Block time in seconds.
    #[arg(long, env = "MERIDIAN_BLOCK_TIME")]
    block_time: Option<u64>,

    /// Force the starting entry height (-1 reads it from the store).
    #[arg(long, env = "MERIDIAN_SYNC2", allow_hyphen_values = true)]
    sync2: Option<i64>,

    /// Enable or disable the debug RPC server.
    #[arg(long, env = "MERIDIAN_ENABLE_RPC")]
    rpc: Option<bool>,

    /// Debug RPC server port.
    #[arg(long, env = "MERIDIAN_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Enable the Prometheus metrics endpoint.
    #[arg(long, env = "MERIDIAN_ENABLE_METRICS")]
    metrics: bool,

    /// Inbound drop rate in parts per thousand.
    #[arg(long, env = "MERIDIAN_DROP_RATE")]
    drop_rate: Option<u32>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "MERIDIAN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "MERIDIAN_LOG_FORMAT")]
    log_format: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node commands.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node.
    Run,
    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    /// The file configuration (or defaults) with CLI overrides applied.
    fn effective_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };

        if let Some(name) = &self.network {
            let magic = self
                .custom_net
                .as_deref()
                .map(parse_magic)
                .transpose()?;
            config.network = NetworkId::parse(name, magic)
                .with_context(|| format!("unknown network '{name}'"))?;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(name) = &self.node_name {
            config.node_name = name.clone();
        }
        config.leader |= self.leader;
        config.enable_metrics |= self.metrics;
        if let Some(secs) = self.block_time {
            config.block_time_secs = secs;
        }
        if let Some(sync2) = self.sync2 {
            config.sync2 = sync2;
        }
        if let Some(rpc) = self.rpc {
            config.enable_rpc = rpc;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(rate) = self.drop_rate {
            config.drop_rate = rate;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_magic(s: &str) -> anyhow::Result<[u8; 4]> {
    let bytes = hex::decode(s.trim_start_matches("0x")).context("custom network magic")?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        anyhow::anyhow!("custom network magic must be 4 bytes, got {}", b.len())
    })
}

async fn run(config: NodeConfig, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    init_logging(config.log_format(), &config.log_level);
    tracing::info!(
        "Starting Meridian node {} on {} network (RPC:{})",
        config.node_name,
        config.network.as_str(),
        if config.enable_rpc {
            config.rpc_port.to_string()
        } else {
            "off".into()
        },
    );

    let mut node = ConsensusNode::open(config).context("failed to open node")?;
    if let Some(path) = config_path {
        node = node.with_config_path(path);
    }
    node.bootstrap(&mut Bootstrapper::new())?;
    node.start().await?;

    let shutdown = node.shutdown.clone();
    tokio::select! {
        _ = shutdown.wait_for_signal() => {
            tracing::info!("shutdown signal received, stopping node");
        }
        _ = node.until_stopped() => {
            tracing::warn!("node stopped on its own");
        }
    }

    match node.stop().await? {
        SupervisorOutcome::Clean => {
            tracing::info!("Meridian daemon exited cleanly");
            Ok(())
        }
        other => bail!("node stopped abnormally: {other:?}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.effective_config()?;

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Run => run(config, cli.config).await,
            NodeAction::Config => {
                print!("{}", config.to_toml_string()?);
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["meridian-daemon"];
        full.extend_from_slice(args);
        full.extend_from_slice(&["node", "run"]);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn defaults_without_flags() {
        let config = parse(&[]).effective_config().unwrap();
        assert_eq!(config, NodeConfig::default());
    }

    #[test]
    fn cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(
            &path,
            "node_name = \"FNode7\"\nrpc_port = 9000\ndrop_rate = 10\n",
        )
        .unwrap();

        let cli = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--rpc-port",
            "9100",
            "--leader",
            "--sync2",
            "-1",
        ]);
        let config = cli.effective_config().unwrap();
        assert_eq!(config.node_name, "FNode7");
        assert_eq!(config.rpc_port, 9100);
        assert_eq!(config.drop_rate, 10);
        assert!(config.leader);
        assert_eq!(config.sync2, -1);
    }

    #[test]
    fn custom_network_needs_magic() {
        assert!(parse(&["--network", "custom"]).effective_config().is_err());
        let config = parse(&["--network", "custom", "--custom-net", "0xdeadbeef"])
            .effective_config()
            .unwrap();
        assert_eq!(config.network, NetworkId::Custom([0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        assert!(parse(&["--drop-rate", "1500"]).effective_config().is_err());
        assert!(parse(&["--log-format", "xml"]).effective_config().is_err());
    }
}
