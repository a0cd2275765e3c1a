//! Turns the dispatch loop's outcome into an orderly shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::engine::EngineHandle;
use crate::shutdown::{ShutdownController, ShutdownCoordinator};
use crate::NodeError;

/// How the supervised node ended.
#[derive(Debug, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Shutdown was requested and the engine finished within the grace period.
    Clean,
    /// The dispatch loop failed or panicked; the node was shut down.
    DispatchFault(String),
    /// The engine was still running when the grace period ran out.
    EngineTimedOut,
    /// The engine thread died without releasing its resources.
    EngineDied,
}

/// Wait for the dispatch loop to end, run the shutdown coordinator, then give
/// the engine up to `grace` to finish its own release sequence.
pub async fn supervise(
    dispatch: JoinHandle<Result<(), NodeError>>,
    engine: EngineHandle,
    controller: Arc<ShutdownController>,
    coordinator: Arc<ShutdownCoordinator>,
    grace: Duration,
) -> SupervisorOutcome {
    let fault = match dispatch.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) if e.is_panic() => Some(format!("dispatch loop panicked: {e}")),
        Err(e) => Some(format!("dispatch loop cancelled: {e}")),
    };

    match &fault {
        None => coordinator.shutdown("shutdown requested"),
        Some(reason) => {
            tracing::error!(reason = %reason, "dispatch loop fault, shutting down node");
            // Wake every other subscriber; the dispatch loop is gone.
            controller.shutdown();
            coordinator.shutdown(reason);
        }
    }

    let EngineHandle { done, thread } = engine;
    let engine_outcome = match tokio::time::timeout(grace, done).await {
        Ok(Ok(())) => {
            tracing::info!("processing engine finished");
            None
        }
        Ok(Err(_)) => {
            tracing::error!("processing engine terminated abnormally");
            Some(SupervisorOutcome::EngineDied)
        }
        Err(_) => {
            tracing::warn!(?grace, "processing engine did not finish within grace period");
            Some(SupervisorOutcome::EngineTimedOut)
        }
    };
    // A finished or dead engine thread is joined; a late one is left detached.
    if thread.is_finished() {
        let _ = thread.join();
    }

    match (fault, engine_outcome) {
        (Some(reason), _) => SupervisorOutcome::DispatchFault(reason),
        (None, Some(outcome)) => outcome,
        (None, None) => SupervisorOutcome::Clean,
    }
}
