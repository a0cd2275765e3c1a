//! Operator control commands, fed by the `sim-ctrl` debug call.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::ingress::FaultInjection;
use crate::node_state::NodeState;
use crate::shutdown::ShutdownController;

/// Queue depth for pending control commands.
pub const CONTROL_QUEUE_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Shutdown,
    Leader(bool),
    Drop(u32),
    Delay(u64),
    Summary,
}

#[derive(Debug, PartialEq, Eq, Error)]
#[error("unknown control command '{0}'")]
pub struct UnknownCommand(pub String);

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self, UnknownCommand> {
        let mut words = line.split_whitespace();
        let cmd = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();
        let parsed = match (cmd.as_str(), arg, words.next()) {
            ("shutdown" | "quit", None, None) => Some(Self::Shutdown),
            ("summary", None, None) => Some(Self::Summary),
            ("leader", Some("on"), None) => Some(Self::Leader(true)),
            ("leader", Some("off"), None) => Some(Self::Leader(false)),
            ("drop", Some(n), None) => n.parse().ok().map(Self::Drop),
            ("delay", Some(ms), None) => ms.parse().ok().map(Self::Delay),
            _ => None,
        };
        parsed.ok_or_else(|| UnknownCommand(line.trim().to_string()))
    }
}

/// What the control task acts on.
#[derive(Clone)]
pub struct ControlContext {
    pub state: Arc<NodeState>,
    pub faults: Arc<FaultInjection>,
    pub shutdown: Arc<ShutdownController>,
}

impl ControlContext {
    /// Apply one command. Returns `false` once shutdown has been requested.
    pub fn apply(&self, cmd: &ControlCommand) -> bool {
        match cmd {
            ControlCommand::Shutdown => {
                tracing::info!("shutdown requested by control command");
                self.shutdown.shutdown();
                return false;
            }
            ControlCommand::Leader(on) => {
                self.state.set_leader(*on);
                tracing::info!(leader = on, "leadership toggled");
            }
            ControlCommand::Drop(rate) => {
                let applied = self.faults.set_drop_rate(*rate);
                tracing::info!(drop_rate = applied, "drop rate set");
            }
            ControlCommand::Delay(ms) => {
                self.faults.set_delay_ms(*ms);
                tracing::info!(delay_ms = ms, "delivery delay set");
            }
            ControlCommand::Summary => {
                tracing::info!(summary = %self.state.summary(), "node summary");
            }
        }
        true
    }

    /// Parse and apply one line; unknown commands are logged and ignored.
    pub fn handle_line(&self, line: &str) -> bool {
        match ControlCommand::parse(line) {
            Ok(cmd) => self.apply(&cmd),
            Err(e) => {
                tracing::warn!("{e}, ignoring");
                true
            }
        }
    }
}

pub fn spawn_control_task(
    mut commands: mpsc::Receiver<String>,
    ctx: ControlContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                line = commands.recv() => {
                    let Some(line) = line else { break };
                    tracing::debug!(command = %line, "control command");
                    if !ctx.handle_line(&line) {
                        break;
                    }
                }
            }
        }
        tracing::debug!("control task exited");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::ingress::MessageFilters;
    use crate::metrics::NodeMetrics;
    use crate::queues::queue_set;
    use crate::state::ConsensusState;

    fn context() -> ControlContext {
        let config = NodeConfig::default();
        let metrics = NodeMetrics::new();
        let (_p, _d, queues) = queue_set(&config, &metrics.inbound_queue_depth);
        let state = NodeState::new(&config, queues, Arc::new(MessageFilters::new())).unwrap();
        state.install_authority(state.identity(), "FNode0");
        ControlContext {
            state: Arc::new(state),
            faults: Arc::new(FaultInjection::default()),
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(ControlCommand::parse("shutdown"), Ok(ControlCommand::Shutdown));
        assert_eq!(
            ControlCommand::parse(" Leader on "),
            Ok(ControlCommand::Leader(true))
        );
        assert_eq!(ControlCommand::parse("drop 250"), Ok(ControlCommand::Drop(250)));
        assert_eq!(ControlCommand::parse("delay 40"), Ok(ControlCommand::Delay(40)));
        assert!(ControlCommand::parse("drop lots").is_err());
        assert!(ControlCommand::parse("leader maybe").is_err());
        assert!(ControlCommand::parse("").is_err());
        assert_eq!(
            ControlCommand::parse("fly away"),
            Err(UnknownCommand("fly away".into()))
        );
        assert_eq!(
            UnknownCommand("fly away".into()).to_string(),
            "unknown control command 'fly away'"
        );
    }

    #[test]
    fn applies_fault_and_leader_commands() {
        let ctx = context();
        assert!(ctx.handle_line("drop 5000"));
        assert_eq!(ctx.faults.drop_rate(), 1000);
        assert!(ctx.handle_line("delay 25"));
        assert_eq!(ctx.faults.delay_ms(), 25);
        assert!(ctx.handle_line("leader on"));
        assert!(ctx.state.leader_view().run_leader);
        assert!(ctx.handle_line("bogus"));
    }

    #[tokio::test]
    async fn shutdown_command_signals_controller() {
        let ctx = context();
        let mut observer = ctx.shutdown.subscribe();
        let (tx, rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let task = spawn_control_task(rx, ctx.clone(), ctx.shutdown.subscribe());
        tx.send("summary".into()).await.unwrap();
        tx.send("shutdown".into()).await.unwrap();
        observer.recv().await.unwrap();
        task.await.unwrap();
    }
}
