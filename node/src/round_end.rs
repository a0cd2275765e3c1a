//! Round-end (EOM) deduplication.
//!
//! The dispatch loop feeds every ticker signal through a [`RoundEndTracker`],
//! which decides whether the tick is ignored, suppressed as a duplicate
//! (possibly scheduling a retry) or produces a new round-end signal. The
//! tracker is a plain value owned by the dispatch loop; no locking is needed.

use meridian_messages::LAST_MINUTE;

use crate::state::LeaderView;

/// Retry budget given to a fresh tick that hits an already-signalled round.
pub const MAX_RETRIES: u8 = 8;

/// A ticker signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Periodic tick from the round timer.
    Fresh,
    /// Self-scheduled retry carrying the retries still allowed after it.
    Retry { remaining: u8 },
}

impl Tick {
    /// Retries this tick may still spend if it turns out to be a duplicate.
    pub fn retry_budget(&self) -> u8 {
        match self {
            Tick::Fresh => MAX_RETRIES,
            Tick::Retry { remaining } => *remaining,
        }
    }

    /// Wire-style value: -1 for a fresh tick, the remaining budget otherwise.
    pub fn as_signal(&self) -> i16 {
        match self {
            Tick::Fresh => -1,
            Tick::Retry { remaining } => i16::from(*remaining),
        }
    }
}

/// Minute used for round-end bookkeeping. The inter-block gap (minute 10)
/// belongs to the last minute of the block.
pub fn effective_minute(minute: u8) -> u8 {
    minute.min(LAST_MINUTE)
}

/// The (height, effective minute, vm) triple a round-end signal is issued for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RoundEndKey {
    pub height: u32,
    pub minute: u8,
    pub vm_index: u32,
}

impl RoundEndKey {
    pub fn from_view(view: &LeaderView) -> Self {
        Self {
            height: view.height,
            minute: effective_minute(view.minute),
            vm_index: view.vm_index,
        }
    }
}

/// Outcome of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickDecision {
    /// Not leader-capable or replay unfinished. Nothing emitted, no retry.
    Discard,
    /// This round was already signalled. `retry` is the tick to re-deliver
    /// later, `None` once the budget is spent.
    Duplicate { retry: Option<Tick> },
    /// Emit a round-end signal for this key.
    Generate(RoundEndKey),
}

/// Last-generated tuple plus the decision rule around it.
#[derive(Debug, Default)]
pub struct RoundEndTracker {
    last: Option<RoundEndKey>,
}

impl RoundEndTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of the most recent round-end signal, `None` before the first one.
    pub fn last_generated(&self) -> Option<RoundEndKey> {
        self.last
    }

    pub fn on_tick(&mut self, tick: Tick, view: &LeaderView) -> TickDecision {
        if !view.run_leader || !view.db_finished {
            return TickDecision::Discard;
        }
        let key = RoundEndKey::from_view(view);
        if self.last == Some(key) {
            let budget = tick.retry_budget();
            let retry = (budget > 0).then(|| Tick::Retry {
                remaining: budget - 1,
            });
            return TickDecision::Duplicate { retry };
        }
        self.last = Some(key);
        TickDecision::Generate(key)
    }
}
