//! The queue set connecting ingress, the dispatch loop and the state.
//!
//! ```text
//!  timer ──┐
//!  retries ┴─> ticker ──┐
//!  ingress ──> inbound_1 ├─> dispatch loop ─┬─> ack ─┐
//!  ingress ──> inbound_2 ┘                  └─> msg ─┴─> Process()
//! ```
//!
//! The dispatch loop is the only consumer of the first three queues and the
//! only producer of the last two.

use prometheus::IntGaugeVec;
use tokio::sync::mpsc::{self, error::TrySendError};

use meridian_messages::Message;

use crate::config::NodeConfig;
use crate::round_end::Tick;
use crate::NodeError;

pub const TICKER_QUEUE: &str = "ticker";
pub const INBOUND_QUEUE_1: &str = "inbound_1";
pub const INBOUND_QUEUE_2: &str = "inbound_2";
pub const ACK_QUEUE: &str = "ack";
pub const MSG_QUEUE: &str = "msg";

/// Producer half of an inbound queue. Increments the depth gauge for every
/// message accepted.
#[derive(Clone)]
pub struct InboundSender {
    name: &'static str,
    tx: mpsc::Sender<Message>,
    depth: IntGaugeVec,
}

impl InboundSender {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn send(&self, msg: Message) -> Result<(), NodeError> {
        let label = msg.msg_type().as_str();
        self.depth.with_label_values(&[self.name, label]).inc();
        self.tx.send(msg).await.map_err(|_| {
            self.depth.with_label_values(&[self.name, label]).dec();
            NodeError::QueueClosed(self.name)
        })
    }

    pub fn try_send(&self, msg: Message) -> Result<(), TrySendError<Message>> {
        let label = msg.msg_type().as_str();
        self.depth.with_label_values(&[self.name, label]).inc();
        self.tx.try_send(msg).inspect_err(|_| {
            self.depth.with_label_values(&[self.name, label]).dec();
        })
    }
}

/// Consumer half of an inbound queue. Each dequeue decrements the depth gauge
/// exactly once.
pub struct InboundReceiver {
    name: &'static str,
    rx: mpsc::Receiver<Message>,
    depth: IntGaugeVec,
}

impl InboundReceiver {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn recv(&mut self) -> Option<Message> {
        let msg = self.rx.recv().await?;
        self.depth
            .with_label_values(&[self.name, msg.msg_type().as_str()])
            .dec();
        Some(msg)
    }
}

fn inbound(name: &'static str, capacity: usize, depth: &IntGaugeVec) -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        InboundSender {
            name,
            tx,
            depth: depth.clone(),
        },
        InboundReceiver {
            name,
            rx,
            depth: depth.clone(),
        },
    )
}

/// Handles for the collaborators that feed the dispatch loop.
pub struct ProducerQueues {
    pub ticker: mpsc::Sender<Tick>,
    pub inbound_1: InboundSender,
    pub inbound_2: InboundSender,
}

/// Everything the dispatch loop owns.
pub struct DispatchQueues {
    pub ticker_rx: mpsc::Receiver<Tick>,
    /// Retry tasks re-deliver onto the ticker through this handle.
    pub ticker_tx: mpsc::Sender<Tick>,
    pub inbound_1: InboundReceiver,
    pub inbound_2: InboundReceiver,
    pub ack_tx: mpsc::Sender<Message>,
    pub msg_tx: mpsc::Sender<Message>,
}

/// Consumer side of the classification queues, drained by `Process()`.
pub struct StateQueues {
    pub ack_rx: mpsc::Receiver<Message>,
    pub msg_rx: mpsc::Receiver<Message>,
}

/// Build the queue set with capacities from `config`.
pub fn queue_set(
    config: &NodeConfig,
    depth: &IntGaugeVec,
) -> (ProducerQueues, DispatchQueues, StateQueues) {
    let (ticker_tx, ticker_rx) = mpsc::channel(config.ticker_queue_capacity);
    let (in1_tx, in1_rx) = inbound(INBOUND_QUEUE_1, config.inbound_queue_capacity, depth);
    let (in2_tx, in2_rx) = inbound(INBOUND_QUEUE_2, config.inbound_queue_capacity, depth);
    let (ack_tx, ack_rx) = mpsc::channel(config.ack_queue_capacity);
    let (msg_tx, msg_rx) = mpsc::channel(config.msg_queue_capacity);

    (
        ProducerQueues {
            ticker: ticker_tx.clone(),
            inbound_1: in1_tx,
            inbound_2: in2_tx,
        },
        DispatchQueues {
            ticker_rx,
            ticker_tx,
            inbound_1: in1_rx,
            inbound_2: in2_rx,
            ack_tx,
            msg_tx,
        },
        StateQueues { ack_rx, msg_rx },
    )
}
