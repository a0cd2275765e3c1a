//! The node's lifecycle register.

use prometheus::IntGauge;
use std::sync::Arc;
use tokio::sync::watch;

use meridian_types::RunState;

/// Shared, forward-only lifecycle flag.
///
/// Every loop reads it; only the shutdown coordinator advances it. Cloning
/// the register shares the same underlying state.
#[derive(Clone)]
pub struct RunStateRegister {
    tx: Arc<watch::Sender<RunState>>,
    gauge: Option<IntGauge>,
}

impl RunStateRegister {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RunState::Running);
        Self {
            tx: Arc::new(tx),
            gauge: None,
        }
    }

    /// Mirror every transition into `gauge`.
    pub fn with_gauge(mut self, gauge: IntGauge) -> Self {
        gauge.set(self.get().as_gauge());
        self.gauge = Some(gauge);
        self
    }

    pub fn get(&self) -> RunState {
        *self.tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.get().is_running()
    }

    /// Move to `next` if that is a forward transition. Returns whether the
    /// state changed.
    pub(crate) fn advance(&self, next: RunState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if current.can_advance_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            if let Some(gauge) = &self.gauge {
                gauge.set(next.as_gauge());
            }
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }

    /// Resolve once the state has reached `target` (or moved past it).
    pub async fn wait_for(&self, target: RunState) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state >= target).await;
    }
}

impl Default for RunStateRegister {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_forward_transitions_apply() {
        let reg = RunStateRegister::new();
        assert!(reg.is_running());
        assert!(reg.advance(RunState::Stopping));
        assert!(!reg.advance(RunState::Running));
        assert!(!reg.advance(RunState::Stopping));
        assert!(reg.advance(RunState::Stopped));
        assert!(!reg.advance(RunState::Stopping));
        assert_eq!(reg.get(), RunState::Stopped);
    }

    #[test]
    fn gauge_follows_transitions() {
        let gauge = IntGauge::new("test_run_state", "test").unwrap();
        let reg = RunStateRegister::new().with_gauge(gauge.clone());
        assert_eq!(gauge.get(), 0);
        reg.advance(RunState::Stopped);
        assert_eq!(gauge.get(), 2);
    }

    #[tokio::test]
    async fn wait_for_resolves_on_transition() {
        let reg = RunStateRegister::new();
        let waiter = {
            let reg = reg.clone();
            tokio::spawn(async move { reg.wait_for(RunState::Stopped).await })
        };
        reg.advance(RunState::Stopping);
        reg.advance(RunState::Stopped);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
