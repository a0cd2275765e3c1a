//! Node orchestrator: wires the queue set, engine, dispatch loop, supervisor
//! and the auxiliary tasks together and owns their lifecycle.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use meridian_rpc::{RpcServer, RpcServerConfig, RpcState};
use meridian_store::NodeStore;
use meridian_store_lmdb::LmdbStore;
use meridian_types::RunState;

use crate::bootstrap::{BootstrapReport, Bootstrapper};
use crate::config::NodeConfig;
use crate::control::{spawn_control_task, ControlContext, CONTROL_QUEUE_CAPACITY};
use crate::debug_api::NodeDebugApi;
use crate::dispatch::DispatchLoop;
use crate::engine::ProcessingEngine;
use crate::error::NodeError;
use crate::ingress::{FaultInjection, Ingress, MessageFilters};
use crate::metrics::NodeMetrics;
use crate::node_state::NodeState;
use crate::queues::{queue_set, DispatchQueues};
use crate::round_end::Tick;
use crate::run_state::RunStateRegister;
use crate::shutdown::{NodeResources, ShutdownController, ShutdownCoordinator};
use crate::snapshot::StateSaver;
use crate::state::ConsensusState;
use crate::supervisor::{supervise, SupervisorOutcome};
use crate::timer::spawn_round_timer;
use crate::tracing_spans::{dispatch_loop_span, supervisor_span};

/// Timeout for waiting on auxiliary tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles consumed by [`ConsensusNode::start`].
struct Unstarted {
    dispatch: DispatchQueues,
    control_rx: mpsc::Receiver<String>,
}

/// A Meridian node.
pub struct ConsensusNode {
    pub config: NodeConfig,
    pub state: Arc<NodeState>,
    pub store: Arc<dyn NodeStore>,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,
    config_path: Option<PathBuf>,
    run_state: RunStateRegister,
    resources: NodeResources,
    coordinator: Arc<ShutdownCoordinator>,
    saver: Arc<StateSaver>,
    faults: Arc<FaultInjection>,
    filters: Arc<MessageFilters>,
    ingress: Ingress,
    ticker: mpsc::Sender<Tick>,
    control_tx: mpsc::Sender<String>,
    unstarted: Option<Unstarted>,
    supervisor: Option<JoinHandle<SupervisorOutcome>>,
    rpc_addr: Option<SocketAddr>,
    /// Handles for auxiliary tasks (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
}

impl ConsensusNode {
    /// Build a node over `store`. Nothing runs until [`start`](Self::start).
    pub fn new(config: NodeConfig, store: Arc<dyn NodeStore>) -> Result<Self, NodeError> {
        config.validate()?;
        let metrics = Arc::new(NodeMetrics::new());
        let run_state = RunStateRegister::new().with_gauge(metrics.run_state.clone());
        let (producers, dispatch, state_queues) = queue_set(&config, &metrics.inbound_queue_depth);

        let filters = Arc::new(MessageFilters::new());
        let faults = Arc::new(FaultInjection::new(config.drop_rate, config.delay_ms));
        let state = Arc::new(NodeState::new(&config, state_queues, filters.clone())?);

        let saver = Arc::new(StateSaver::new(
            store.clone(),
            state.clone() as Arc<dyn ConsensusState>,
        ));
        let resources = NodeResources::new(store.clone(), saver.clone());
        let coordinator = Arc::new(ShutdownCoordinator::new(
            run_state.clone(),
            resources.clone(),
        ));
        let ingress = Ingress::new(
            producers.inbound_1,
            producers.inbound_2,
            faults.clone(),
            filters.clone(),
            metrics.inbound_dropped.clone(),
        );
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);

        Ok(Self {
            config,
            state,
            store,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            config_path: None,
            run_state,
            resources,
            coordinator,
            saver,
            faults,
            filters,
            ingress,
            ticker: producers.ticker,
            control_tx,
            unstarted: Some(Unstarted {
                dispatch,
                control_rx,
            }),
            supervisor: None,
            rpc_addr: None,
            task_handles: Vec::new(),
        })
    }

    /// Build a node over the LMDB store in `config.data_dir`.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        let store = LmdbStore::open(&config.data_dir)?;
        Self::new(config, Arc::new(store))
    }

    /// Remember where the configuration came from, for `reload-configuration`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Run the bootstrap phase against this node's state and store.
    pub fn bootstrap(
        &self,
        bootstrapper: &mut Bootstrapper,
    ) -> Result<Option<BootstrapReport>, NodeError> {
        bootstrapper.run(&self.config, &self.state, self.store.as_ref())
    }

    /// Start every worker. Fails if the node was already started or the RPC
    /// listener cannot be bound.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        let unstarted = self.unstarted.take().ok_or(NodeError::AlreadyStarted)?;
        let name = self.config.node_name.clone();
        tracing::info!(
            node = %name,
            network = self.config.network.as_str(),
            identity = %self.state.identity(),
            "Meridian node starting"
        );

        // Bind the RPC listener first so a port clash leaves nothing running.
        if self.config.enable_rpc {
            self.start_rpc().await?;
        }

        match self.store.load_snapshot() {
            Ok(Some(snapshot)) => {
                self.state.restore(&snapshot);
                tracing::info!(
                    height = snapshot.height,
                    minute = snapshot.minute,
                    "state restored from snapshot"
                );
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to load state snapshot, starting fresh"),
        }
        self.state.finish_replay();

        let engine = ProcessingEngine::new(
            name.clone(),
            self.state.clone() as Arc<dyn ConsensusState>,
            self.run_state.clone(),
            self.shutdown.subscribe(),
            self.resources.clone(),
            self.metrics.clone(),
        )
        .spawn()?;

        let dispatch = DispatchLoop::new(
            self.state.clone() as Arc<dyn ConsensusState>,
            unstarted.dispatch,
            self.config.retry_delay(),
            self.metrics.clone(),
            self.shutdown.subscribe(),
        );
        let dispatch_handle = tokio::spawn(dispatch.run().instrument(dispatch_loop_span(&name)));
        self.supervisor = Some(tokio::spawn(
            supervise(
                dispatch_handle,
                engine,
                self.shutdown.clone(),
                self.coordinator.clone(),
                self.config.shutdown_grace(),
            )
            .instrument(supervisor_span(&name)),
        ));

        self.task_handles.push(spawn_round_timer(
            self.ticker.clone(),
            self.config.minute_duration(),
            self.shutdown.subscribe(),
        ));

        if let Some(interval) = self.config.snapshot_interval() {
            self.task_handles.push(self.saver.spawn(interval));
        }

        self.task_handles.push(spawn_control_task(
            unstarted.control_rx,
            ControlContext {
                state: self.state.clone(),
                faults: self.faults.clone(),
                shutdown: self.shutdown.clone(),
            },
            self.shutdown.subscribe(),
        ));

        tracing::info!("Meridian node started");
        Ok(())
    }

    async fn start_rpc(&mut self) -> Result<(), NodeError> {
        let backend = NodeDebugApi::new(
            self.config.clone(),
            self.config_path.clone(),
            self.state.clone(),
            self.faults.clone(),
            self.filters.clone(),
            self.control_tx.clone(),
        );
        let rpc_state = RpcState {
            backend: Arc::new(backend),
            credentials: self.config.rpc_credentials(),
            registry: self
                .config
                .enable_metrics
                .then(|| self.metrics.registry.clone()),
        };
        let mut shutdown_rx = self.shutdown.subscribe();
        let server = RpcServer::new(RpcServerConfig::local(self.config.rpc_port), rpc_state);
        let (addr, handle) = server
            .start(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("RPC server shutting down");
            })
            .await
            .map_err(|e| NodeError::Rpc(e.to_string()))?;
        self.rpc_addr = Some(addr);
        self.task_handles.push(handle);
        Ok(())
    }

    /// Handle the transport uses to deliver inbound messages.
    pub fn ingress(&self) -> Ingress {
        self.ingress.clone()
    }

    /// Sender onto the ticker queue.
    pub fn ticker(&self) -> mpsc::Sender<Tick> {
        self.ticker.clone()
    }

    /// Sender for operator control commands.
    pub fn control_sender(&self) -> mpsc::Sender<String> {
        self.control_tx.clone()
    }

    pub fn run_state(&self) -> &RunStateRegister {
        &self.run_state
    }

    pub fn fault_injection(&self) -> &Arc<FaultInjection> {
        &self.faults
    }

    pub fn message_filters(&self) -> &Arc<MessageFilters> {
        &self.filters
    }

    /// Address the debug RPC server is bound to, once started.
    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.rpc_addr
    }

    /// Resolves once the node has fully stopped, whatever stopped it.
    pub async fn until_stopped(&self) {
        self.run_state.wait_for(RunState::Stopped).await;
    }

    /// Stop the node gracefully.
    ///
    /// 1. Sends the shutdown signal to every task.
    /// 2. Waits for the supervisor to run the shutdown sequence.
    /// 3. Waits for auxiliary tasks to complete (with timeout).
    pub async fn stop(&mut self) -> Result<SupervisorOutcome, NodeError> {
        tracing::info!("Meridian node stopping");
        self.shutdown.shutdown();

        let outcome = match self.supervisor.take() {
            Some(handle) => match handle.await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    self.coordinator.shutdown("supervisor failed");
                    Err(NodeError::DispatchFault(format!("supervisor task failed: {e}")))
                }
            },
            None => {
                self.coordinator.shutdown("stopped before start");
                Ok(SupervisorOutcome::Clean)
            }
        };

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all)
            .await
            .is_err()
        {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
        }

        tracing::info!(outcome = ?outcome, "Meridian node stopped");
        outcome
    }
}
