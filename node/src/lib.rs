//! Meridian federated node.
//!
//! The node core is a pair of cooperating workers:
//! - the processing engine, a dedicated thread that drives `process` and
//!   `update_state` on the consensus state in bounded bursts;
//! - the dispatch loop, an async task that waits on the round timer and two
//!   inbound queues, synthesizes round-end (EOM) signals with dedup and
//!   retries, and routes messages into the ack and message queues.
//!
//! A supervisor turns the dispatch loop's failure into an orderly shutdown,
//! run by the shutdown coordinator over the run-state register.

pub mod bootstrap;
pub mod config;
pub mod control;
pub mod debug_api;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ingress;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod node_state;
pub mod queues;
pub mod round_end;
pub mod run_state;
pub mod shutdown;
pub mod snapshot;
pub mod state;
pub mod supervisor;
pub mod timer;
pub mod tracing_spans;

#[cfg(test)]
mod testing;

pub use bootstrap::{BootstrapReport, Bootstrapper, EntryHeightSource};
pub use config::{NodeConfig, MINUTES_PER_BLOCK};
pub use control::{ControlCommand, ControlContext};
pub use dispatch::DispatchLoop;
pub use engine::{EngineHandle, ProcessingEngine, BATCH_LIMIT, IDLE_SLEEP};
pub use error::NodeError;
pub use ingress::{Delivery, DropReason, FaultInjection, Ingress, Lane, MessageFilters};
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::ConsensusNode;
pub use node_state::NodeState;
pub use queues::{queue_set, DispatchQueues, ProducerQueues, StateQueues};
pub use round_end::{RoundEndKey, RoundEndTracker, Tick, TickDecision, MAX_RETRIES};
pub use run_state::RunStateRegister;
pub use shutdown::{NodeResources, ShutdownController, ShutdownCoordinator};
pub use snapshot::StateSaver;
pub use state::{ConsensusState, LeaderView};
pub use supervisor::{supervise, SupervisorOutcome};
