//! Graceful shutdown for the Meridian node.
//!
//! [`ShutdownController`] listens for SIGINT/SIGTERM and broadcasts a
//! shutdown signal to all subsystems via a `tokio::sync::broadcast` channel.
//! [`ShutdownCoordinator`] runs the lifecycle sequence itself:
//! `Stopping`, stop the state saver, close the store, `Stopped`.

use std::sync::{Arc, Mutex};

use tokio::signal;
use tokio::sync::broadcast;

use meridian_store::NodeStore;
use meridian_types::RunState;

use crate::run_state::RunStateRegister;
use crate::snapshot::StateSaver;

/// Broadcasts the shutdown signal to every subsystem.
///
/// Subsystems call [`subscribe`](Self::subscribe) to get a receiver, then
/// `select!` on it alongside their main loop. When shutdown is triggered
/// (either by OS signal or programmatically), every receiver is notified.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
            _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// The resources released when the node stops: the store and the state
/// saver. Both releases are idempotent, so the engine and the coordinator
/// may each call [`release`](Self::release).
#[derive(Clone)]
pub struct NodeResources {
    store: Arc<dyn NodeStore>,
    saver: Arc<StateSaver>,
    sequence: Arc<Mutex<()>>,
}

impl NodeResources {
    pub fn new(store: Arc<dyn NodeStore>, saver: Arc<StateSaver>) -> Self {
        Self {
            store,
            saver,
            sequence: Arc::new(Mutex::new(())),
        }
    }

    /// Stop snapshotting, then close the store. A concurrent caller blocks
    /// until the first one has written the final snapshot and closed the
    /// store.
    pub fn release(&self, caller: &'static str) {
        let _sequence = self.sequence.lock().unwrap_or_else(|e| e.into_inner());
        if self.saver.stop_saving() {
            tracing::info!(caller, "state saver stopped");
        }
        match self.store.close() {
            Ok(()) => tracing::debug!(caller, "store closed"),
            Err(e) => tracing::warn!(caller, error = %e, "failed to close store"),
        }
    }
}

/// Runs the shutdown sequence. Safe to invoke repeatedly and concurrently:
/// every caller returns with the store closed and the state `Stopped`.
pub struct ShutdownCoordinator {
    run_state: RunStateRegister,
    resources: NodeResources,
}

impl ShutdownCoordinator {
    pub fn new(run_state: RunStateRegister, resources: NodeResources) -> Self {
        Self {
            run_state,
            resources,
        }
    }

    pub fn run_state(&self) -> &RunStateRegister {
        &self.run_state
    }

    pub fn shutdown(&self, reason: &str) {
        if self.run_state.advance(RunState::Stopping) {
            tracing::info!(reason, "node stopping");
        }
        self.resources.release("shutdown coordinator");
        if self.run_state.advance(RunState::Stopped) {
            tracing::info!("node stopped");
        }
    }
}
