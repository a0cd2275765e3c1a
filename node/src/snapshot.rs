//! Periodic state snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use meridian_store::{NodeStore, StateSnapshot, StoreError};

use crate::state::ConsensusState;
use crate::NodeError;

/// Writes [`StateSnapshot`]s to the store on a fixed interval.
///
/// [`stop_saving`](Self::stop_saving) is idempotent: the first call writes a
/// final snapshot and stops the periodic task, later calls do nothing.
pub struct StateSaver {
    stop_tx: watch::Sender<bool>,
    target: Option<(Arc<dyn NodeStore>, Arc<dyn ConsensusState>)>,
}

impl StateSaver {
    pub fn new(store: Arc<dyn NodeStore>, state: Arc<dyn ConsensusState>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            target: Some((store, state)),
        }
    }

    /// A saver with nothing to save.
    pub fn disabled() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            target: None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Write the current snapshot. Returns the snapshot written, if any.
    pub fn save_now(&self) -> Result<Option<StateSnapshot>, NodeError> {
        let Some((store, state)) = &self.target else {
            return Ok(None);
        };
        let Some(snapshot) = state.snapshot() else {
            return Ok(None);
        };
        store.save_snapshot(&snapshot)?;
        store.save_entry_height(snapshot.entry_height_complete)?;
        tracing::trace!(
            height = snapshot.height,
            minute = snapshot.minute,
            "state snapshot saved"
        );
        Ok(Some(snapshot))
    }

    /// Stop periodic saving. Returns `true` for the call that stopped it.
    pub fn stop_saving(&self) -> bool {
        let stopped_now = self.stop_tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
        if stopped_now {
            match self.save_now() {
                Ok(Some(snapshot)) => {
                    tracing::info!(height = snapshot.height, "final state snapshot saved")
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "failed to save final state snapshot"),
            }
        }
        stopped_now
    }

    /// Spawn the periodic save task. It ends when saving is stopped.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let saver = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.wait_for(|stopped| *stopped) => break,
                    _ = ticker.tick() => {
                        match saver.save_now() {
                            Ok(_) => {}
                            Err(NodeError::Store(StoreError::Closed)) => break,
                            Err(e) => tracing::warn!(error = %e, "periodic state snapshot failed"),
                        }
                    }
                }
            }
            tracing::debug!("state saver task exited");
        })
    }
}
