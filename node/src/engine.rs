//! The processing engine: a dedicated thread that drives `process` and
//! `update_state` in bounded bursts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};

use crate::metrics::NodeMetrics;
use crate::run_state::RunStateRegister;
use crate::shutdown::NodeResources;
use crate::state::ConsensusState;
use crate::tracing_spans::processing_engine_span;
use crate::NodeError;

/// Upper bound on consecutive calls to either stage per iteration.
pub const BATCH_LIMIT: usize = 20;
/// Backoff when an iteration found no work.
pub const IDLE_SLEEP: Duration = Duration::from_millis(10);

const THREAD_NAME: &str = "processing-engine";

/// Handle to a running engine thread.
pub struct EngineHandle {
    /// Resolves once the engine has released its resources. An error means
    /// the thread died first.
    pub done: oneshot::Receiver<()>,
    pub thread: thread::JoinHandle<()>,
}

pub struct ProcessingEngine {
    node_name: String,
    state: Arc<dyn ConsensusState>,
    run_state: RunStateRegister,
    exit: broadcast::Receiver<()>,
    resources: NodeResources,
    metrics: Arc<NodeMetrics>,
    sleeps: Arc<AtomicU64>,
}

impl ProcessingEngine {
    pub fn new(
        node_name: impl Into<String>,
        state: Arc<dyn ConsensusState>,
        run_state: RunStateRegister,
        exit: broadcast::Receiver<()>,
        resources: NodeResources,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            state,
            run_state,
            exit,
            resources,
            metrics,
            sleeps: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle to the sleep counter.
    pub fn sleep_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.sleeps)
    }

    /// Run `stage` up to [`BATCH_LIMIT`] times, stopping at the first call
    /// that reports no work.
    fn burst(stage: impl Fn() -> bool, calls: &prometheus::IntCounter) -> bool {
        let mut worked = false;
        for _ in 0..BATCH_LIMIT {
            calls.inc();
            if !stage() {
                break;
            }
            worked = true;
        }
        worked
    }

    /// One engine iteration. Returns whether any stage did work; an idle
    /// iteration sleeps for [`IDLE_SLEEP`] and bumps the sleep counter.
    pub fn iterate(&self) -> bool {
        let processed = Self::burst(|| self.state.process(), &self.metrics.process_calls);
        let updated = Self::burst(|| self.state.update_state(), &self.metrics.update_state_calls);
        if processed || updated {
            return true;
        }
        thread::sleep(IDLE_SLEEP);
        self.sleeps.fetch_add(1, Ordering::Relaxed);
        self.metrics.engine_sleeps.inc();
        false
    }

    fn should_exit(&mut self) -> bool {
        match self.exit.try_recv() {
            Err(broadcast::error::TryRecvError::Empty) => !self.run_state.is_running(),
            // Signalled, lagged past a signal, or the controller is gone.
            _ => true,
        }
    }

    /// Run until the node leaves `Running` or the exit signal fires, then
    /// release the store and stop the state saver.
    pub fn run(mut self) {
        let span = processing_engine_span(&self.node_name);
        let _enter = span.enter();
        tracing::info!("processing engine started");

        while !self.should_exit() {
            self.iterate();
        }

        tracing::info!(
            run_state = self.run_state.get().as_str(),
            sleeps = self.sleeps.load(Ordering::Relaxed),
            "processing engine exiting"
        );
        self.resources.release("processing engine");
    }

    /// Start the engine on its own named thread.
    ///
    /// A panic inside `process` or `update_state` is not caught: the thread
    /// dies, `done` resolves with an error, and nothing restarts it.
    pub fn spawn(self) -> Result<EngineHandle, NodeError> {
        let (done_tx, done) = oneshot::channel();
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                self.run();
                let _ = done_tx.send(());
            })?;
        Ok(EngineHandle { done, thread })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownController;
    use crate::snapshot::StateSaver;
    use crate::testing::ScriptedState;
    use meridian_nullables::NullStore;
    use meridian_store::NodeStore;
    use meridian_types::RunState;
    use std::time::Instant;

    struct Fixture {
        state: Arc<ScriptedState>,
        store: Arc<NullStore>,
        run_state: RunStateRegister,
        shutdown: ShutdownController,
        engine: ProcessingEngine,
    }

    fn fixture(state: ScriptedState) -> Fixture {
        let state = Arc::new(state);
        let store = Arc::new(NullStore::new());
        let run_state = RunStateRegister::new();
        let shutdown = ShutdownController::new();
        let resources = NodeResources::new(
            store.clone() as Arc<dyn NodeStore>,
            Arc::new(StateSaver::disabled()),
        );
        let engine = ProcessingEngine::new(
            "test",
            state.clone() as Arc<dyn ConsensusState>,
            run_state.clone(),
            shutdown.subscribe(),
            resources,
            Arc::new(NodeMetrics::new()),
        );
        Fixture {
            state,
            store,
            run_state,
            shutdown,
            engine,
        }
    }

    #[test]
    fn idle_iterations_sleep_and_count() {
        let f = fixture(ScriptedState::idle());
        let counter = f.engine.sleep_counter();
        let started = Instant::now();
        for _ in 0..5 {
            assert!(!f.engine.iterate());
        }
        assert_eq!(counter.load(Ordering::Relaxed), 5);
        assert!(started.elapsed() >= IDLE_SLEEP * 5);
        assert_eq!(f.engine.metrics.engine_sleeps.get(), 5);
    }

    #[test]
    fn work_suppresses_backoff() {
        let f = fixture(ScriptedState::idle());
        f.state.queue_process_work(3);
        assert!(f.engine.iterate());
        assert_eq!(f.engine.sleep_counter().load(Ordering::Relaxed), 0);
        assert_eq!(f.state.process_calls(), 4);
        assert!(!f.engine.iterate());
        assert_eq!(f.engine.sleep_counter().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn bursts_are_capped() {
        let f = fixture(ScriptedState::idle());
        f.state.queue_process_work(50);
        f.state.queue_update_work(50);
        assert!(f.engine.iterate());
        assert_eq!(f.state.process_calls(), BATCH_LIMIT);
        assert_eq!(f.state.update_calls(), BATCH_LIMIT);
    }

    #[test]
    fn exit_signal_stops_engine_and_releases_resources() {
        let f = fixture(ScriptedState::idle());
        let handle = f.engine.spawn().unwrap();
        f.shutdown.shutdown();
        handle.thread.join().unwrap();
        assert_eq!(f.store.releases(), 1);
        assert!(f.store.is_closed());
        // The engine never writes the run state.
        assert_eq!(f.run_state.get(), RunState::Running);
    }

    #[test]
    fn leaving_running_stops_engine() {
        let f = fixture(ScriptedState::idle());
        let handle = f.engine.spawn().unwrap();
        f.run_state.advance(RunState::Stopping);
        handle.thread.join().unwrap();
        assert!(f.store.is_closed());
    }

    #[tokio::test]
    async fn panic_in_process_kills_engine_thread() {
        let f = fixture(ScriptedState::idle());
        f.state.panic_on_next_process();
        let handle = f.engine.spawn().unwrap();
        assert!(handle.done.await.is_err());
        assert!(handle.thread.join().is_err());
        assert!(!f.store.is_closed());
    }
}
