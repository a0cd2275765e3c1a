//! Transport-facing ingress into the two inbound queues.
//!
//! Applies the debug fault-injection knobs (random drop, delivery delay) and
//! the input message filter before a message reaches the dispatch loop.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use prometheus::IntCounter;
use regex::Regex;

use meridian_crypto::random_u32;
use meridian_messages::Message;

use crate::queues::InboundSender;
use crate::NodeError;

/// Which inbound queue a transport delivers into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lane {
    Primary,
    Secondary,
}

/// Runtime-adjustable fault injection.
#[derive(Debug, Default)]
pub struct FaultInjection {
    drop_rate: AtomicU32,
    delay_ms: AtomicU64,
}

impl FaultInjection {
    pub fn new(drop_rate: u32, delay_ms: u64) -> Self {
        Self {
            drop_rate: AtomicU32::new(drop_rate.min(1000)),
            delay_ms: AtomicU64::new(delay_ms),
        }
    }

    /// Drop probability in parts per thousand.
    pub fn drop_rate(&self) -> u32 {
        self.drop_rate.load(Ordering::Relaxed)
    }

    /// Set the drop rate, clamped to 1000. Returns the value applied.
    pub fn set_drop_rate(&self, per_mille: u32) -> u32 {
        let applied = per_mille.min(1000);
        self.drop_rate.store(applied, Ordering::Relaxed);
        applied
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms.load(Ordering::Relaxed)
    }

    pub fn set_delay_ms(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::Relaxed);
    }

    fn should_drop(&self) -> bool {
        let rate = self.drop_rate();
        match rate {
            0 => false,
            r if r >= 1000 => true,
            _ => match random_u32() {
                Ok(r) => r % 1000 < rate,
                Err(e) => {
                    tracing::warn!(error = %e, "no randomness for drop decision, delivering");
                    false
                }
            },
        }
    }
}

/// Regex filters over the one-line message summary.
///
/// The input filter drops matching inbound messages at ingress; the output
/// filter keeps matching messages out of the journal.
#[derive(Debug, Default)]
pub struct MessageFilters {
    input: RwLock<Option<Regex>>,
    output: RwLock<Option<Regex>>,
}

/// How a filter update was applied.
#[derive(Debug, PartialEq, Eq)]
pub enum FilterUpdate {
    Unchanged,
    Cleared,
    Set(String),
}

impl MessageFilters {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(slot: &RwLock<Option<Regex>>, pattern: &str) -> Result<FilterUpdate, regex::Error> {
        let next = match pattern {
            "" => return Ok(FilterUpdate::Unchanged),
            "off" => None,
            p => Some(Regex::new(p)?),
        };
        let update = match &next {
            Some(re) => FilterUpdate::Set(re.as_str().to_string()),
            None => FilterUpdate::Cleared,
        };
        *slot.write().unwrap_or_else(|e| e.into_inner()) = next;
        Ok(update)
    }

    fn current(slot: &RwLock<Option<Regex>>) -> Option<String> {
        slot.read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|re| re.as_str().to_string())
    }

    fn matches(slot: &RwLock<Option<Regex>>, msg: &Message) -> bool {
        match slot.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(re) => re.is_match(&msg.to_string()),
            None => false,
        }
    }

    /// `"off"` clears the filter, `""` leaves it unchanged, anything else
    /// must be a valid regex.
    pub fn set_input(&self, pattern: &str) -> Result<FilterUpdate, regex::Error> {
        Self::update(&self.input, pattern)
    }

    pub fn set_output(&self, pattern: &str) -> Result<FilterUpdate, regex::Error> {
        Self::update(&self.output, pattern)
    }

    pub fn input(&self) -> Option<String> {
        Self::current(&self.input)
    }

    pub fn output(&self) -> Option<String> {
        Self::current(&self.output)
    }

    pub fn blocks_input(&self, msg: &Message) -> bool {
        Self::matches(&self.input, msg)
    }

    pub fn blocks_output(&self, msg: &Message) -> bool {
        Self::matches(&self.output, msg)
    }
}

/// Why ingress refused a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    FaultInjection,
    InputFilter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Dropped(DropReason),
}

/// Cloneable handle the transport uses to feed the node.
#[derive(Clone)]
pub struct Ingress {
    primary: InboundSender,
    secondary: InboundSender,
    faults: Arc<FaultInjection>,
    filters: Arc<MessageFilters>,
    dropped: IntCounter,
}

impl Ingress {
    pub fn new(
        primary: InboundSender,
        secondary: InboundSender,
        faults: Arc<FaultInjection>,
        filters: Arc<MessageFilters>,
        dropped: IntCounter,
    ) -> Self {
        Self {
            primary,
            secondary,
            faults,
            filters,
            dropped,
        }
    }

    pub async fn deliver(&self, lane: Lane, msg: Message) -> Result<Delivery, NodeError> {
        if self.filters.blocks_input(&msg) {
            self.dropped.inc();
            tracing::trace!(msg = %msg, "input filter dropped message");
            return Ok(Delivery::Dropped(DropReason::InputFilter));
        }
        if self.faults.should_drop() {
            self.dropped.inc();
            tracing::trace!(msg = %msg, "fault injection dropped message");
            return Ok(Delivery::Dropped(DropReason::FaultInjection));
        }
        let delay = self.faults.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let queue = match lane {
            Lane::Primary => &self.primary,
            Lane::Secondary => &self.secondary,
        };
        tracing::debug!(queue = queue.name(), msg = %msg, "enqueued inbound");
        queue.send(msg).await?;
        Ok(Delivery::Queued)
    }
}
