//! The dispatch loop: round-end synthesis and routing.
//!
//! Each iteration waits on four sources in fixed priority order: shutdown,
//! ticker, inbound queue 1, inbound queue 2. A tick may produce a locally
//! generated round-end signal; an inbound message is taken as is. Whatever
//! was obtained is then classified onto the ack or msg queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinSet};

use meridian_messages::{EomMessage, Message};
use meridian_types::Timestamp;

use crate::metrics::NodeMetrics;
use crate::queues::{
    DispatchQueues, ACK_QUEUE, INBOUND_QUEUE_1, INBOUND_QUEUE_2, MSG_QUEUE, TICKER_QUEUE,
};
use crate::round_end::{RoundEndKey, RoundEndTracker, Tick, TickDecision};
use crate::state::{ConsensusState, LeaderView};
use crate::NodeError;

enum Event {
    Shutdown,
    Tick(Option<Tick>),
    Inbound(&'static str, Option<Message>),
    RetryFinished(Result<(), JoinError>),
}

enum Flow {
    Continue,
    Stop,
}

pub struct DispatchLoop {
    state: Arc<dyn ConsensusState>,
    queues: DispatchQueues,
    tracker: RoundEndTracker,
    retries: JoinSet<()>,
    retry_delay: Duration,
    metrics: Arc<NodeMetrics>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl DispatchLoop {
    pub fn new(
        state: Arc<dyn ConsensusState>,
        queues: DispatchQueues,
        retry_delay: Duration,
        metrics: Arc<NodeMetrics>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            state,
            queues,
            tracker: RoundEndTracker::new(),
            retries: JoinSet::new(),
            retry_delay,
            metrics,
            shutdown_rx,
        }
    }

    /// Run until shutdown is signalled (`Ok`) or routing breaks (`Err`).
    /// Pending retries are aborted either way.
    pub async fn run(mut self) -> Result<(), NodeError> {
        tracing::info!("dispatch loop started");
        let result = self.run_inner().await;
        self.retries.abort_all();
        match &result {
            Ok(()) => tracing::info!("dispatch loop stopped"),
            Err(e) => tracing::error!(error = %e, "dispatch loop failed"),
        }
        result
    }

    async fn run_inner(&mut self) -> Result<(), NodeError> {
        loop {
            let event = tokio::select! {
                biased;
                // Signalled, lagged or controller dropped: all mean stop.
                _ = self.shutdown_rx.recv() => Event::Shutdown,
                tick = self.queues.ticker_rx.recv() => Event::Tick(tick),
                msg = self.queues.inbound_1.recv() => Event::Inbound(INBOUND_QUEUE_1, msg),
                msg = self.queues.inbound_2.recv() => Event::Inbound(INBOUND_QUEUE_2, msg),
                Some(done) = self.retries.join_next() => Event::RetryFinished(done),
            };

            let (msg, source) = match event {
                Event::Shutdown => {
                    tracing::info!("dispatch loop received shutdown");
                    return Ok(());
                }
                Event::Tick(None) => return Err(NodeError::QueueClosed(TICKER_QUEUE)),
                Event::Tick(Some(tick)) => match self.on_tick(tick)? {
                    Some(eom) => (eom, TICKER_QUEUE),
                    None => continue,
                },
                Event::Inbound(queue, None) => return Err(NodeError::QueueClosed(queue)),
                Event::Inbound(queue, Some(msg)) => {
                    tracing::debug!(queue, msg = %msg, "dequeued");
                    (msg, queue)
                }
                Event::RetryFinished(Err(e)) if e.is_panic() => {
                    return Err(NodeError::DispatchFault(format!("retry task panicked: {e}")));
                }
                Event::RetryFinished(_) => continue,
            };

            if let Flow::Stop = self.route(msg, source).await? {
                tracing::info!("dispatch loop received shutdown while routing");
                return Ok(());
            }
        }
    }

    /// Apply the round-end rule to one tick. Returns the generated signal, if
    /// any.
    fn on_tick(&mut self, tick: Tick) -> Result<Option<Message>, NodeError> {
        let view = self.state.leader_view();
        match self.tracker.on_tick(tick, &view) {
            TickDecision::Discard => {
                self.metrics.eom_ticks_discarded.inc();
                tracing::trace!(
                    target: "timer",
                    signal = tick.as_signal(),
                    run_leader = view.run_leader,
                    db_finished = view.db_finished,
                    "tick discarded"
                );
                Ok(None)
            }
            TickDecision::Duplicate { retry } => {
                match retry {
                    Some(next) => self.schedule_retry(next, &view),
                    None => tracing::debug!(
                        target: "timer",
                        height = view.height,
                        minute = view.minute,
                        "round-end retries exhausted"
                    ),
                }
                Ok(None)
            }
            TickDecision::Generate(key) => Ok(Some(self.build_eom(key)?)),
        }
    }

    fn build_eom(&self, key: RoundEndKey) -> Result<Message, NodeError> {
        let mut eom = EomMessage::new(
            Timestamp::now(),
            self.state.identity(),
            key.height,
            key.vm_index,
            key.minute,
        )?
        .into_local();
        eom.sign_with(|bytes| self.state.sign(bytes))?;
        self.metrics.eom_generated.inc();
        tracing::debug!(target: "validator", msg = %eom, "generated round-end signal");
        Ok(eom.into())
    }

    fn schedule_retry(&mut self, next: Tick, view: &LeaderView) {
        self.metrics.eom_retries_scheduled.inc();
        tracing::debug!(
            target: "timer",
            height = view.height,
            minute = view.minute,
            vm = view.vm_index,
            next = next.as_signal(),
            "round-end already generated, retry scheduled"
        );
        let ticker = self.queues.ticker_tx.clone();
        let delay = self.retry_delay;
        self.retries.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = ticker.try_send(next) {
                tracing::trace!(target: "timer", error = %e, "dropping retry tick");
            }
        });
    }

    /// Classify and enqueue. Waits for room in the destination queue but
    /// gives up if shutdown is signalled meanwhile.
    async fn route(&mut self, msg: Message, source: &'static str) -> Result<Flow, NodeError> {
        let (queue, tx): (&'static str, &mpsc::Sender<Message>) = if msg.is_ack() {
            (ACK_QUEUE, &self.queues.ack_tx)
        } else {
            (MSG_QUEUE, &self.queues.msg_tx)
        };
        let summary = msg.to_string();
        tokio::select! {
            biased;
            _ = self.shutdown_rx.recv() => Ok(Flow::Stop),
            sent = tx.send(msg) => {
                sent.map_err(|_| NodeError::QueueClosed(queue))?;
                self.metrics.dispatched.with_label_values(&[queue]).inc();
                tracing::debug!(queue, from = source, msg = %summary, "enqueued");
                Ok(Flow::Continue)
            }
        }
    }
}
