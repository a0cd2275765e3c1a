//! Round timer: one fresh tick per minute boundary.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use meridian_types::Timestamp;

use crate::round_end::Tick;

/// Spawn the timer. Ticks are aligned to wall-clock multiples of `minute`
/// and delivered without blocking: a full ticker queue drops the tick.
pub fn spawn_round_timer(
    ticker: mpsc::Sender<Tick>,
    minute: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let delay = Timestamp::now().until_next_boundary(minute);
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("round timer shutting down");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    match ticker.try_send(Tick::Fresh) {
                        Ok(()) => tracing::trace!(target: "timer", "minute boundary tick"),
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!(target: "timer", "ticker queue full, dropping tick")
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
            }
        }
    })
}
