//! Prometheus metrics for the Meridian node.
//!
//! Covers inbound queue depth, routing, round-end synthesis, engine backoff
//! and the lifecycle state. The [`NodeMetrics`] struct owns a dedicated
//! [`Registry`] that the RPC `/metrics` endpoint encodes into the Prometheus
//! text exposition format.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry, IntCounter,
    IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Queues ──────────────────────────────────────────────────────────
    /// Messages waiting in each inbound queue, by message type.
    pub inbound_queue_depth: IntGaugeVec,
    /// Messages routed to the ack or msg queue.
    pub dispatched: IntCounterVec,
    /// Inbound messages dropped by fault injection or the input filter.
    pub inbound_dropped: IntCounter,

    // ── Round end ───────────────────────────────────────────────────────
    pub eom_generated: IntCounter,
    pub eom_retries_scheduled: IntCounter,
    /// Ticks discarded because the node was not leader-capable.
    pub eom_ticks_discarded: IntCounter,

    // ── Engine ──────────────────────────────────────────────────────────
    /// Idle iterations of the processing engine.
    pub engine_sleeps: IntCounter,
    pub process_calls: IntCounter,
    pub update_state_calls: IntCounter,

    // ── Lifecycle ───────────────────────────────────────────────────────
    /// 0 running, 1 stopping, 2 stopped.
    pub run_state: IntGauge,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        let inbound_queue_depth = register_int_gauge_vec_with_registry!(
            Opts::new(
                "meridian_inbound_queue_depth",
                "Messages waiting in an inbound queue"
            ),
            &["queue", "msg_type"],
            registry
        )
        .expect("failed to register inbound_queue_depth gauge");

        let dispatched = register_int_counter_vec_with_registry!(
            Opts::new(
                "meridian_dispatched_total",
                "Messages routed by the dispatch loop"
            ),
            &["queue"],
            registry
        )
        .expect("failed to register dispatched counter");

        let inbound_dropped = register_int_counter_with_registry!(
            Opts::new(
                "meridian_inbound_dropped_total",
                "Inbound messages dropped before queueing"
            ),
            registry
        )
        .expect("failed to register inbound_dropped counter");

        let eom_generated = register_int_counter_with_registry!(
            Opts::new(
                "meridian_eom_generated_total",
                "Round-end signals generated by this node"
            ),
            registry
        )
        .expect("failed to register eom_generated counter");

        let eom_retries_scheduled = register_int_counter_with_registry!(
            Opts::new(
                "meridian_eom_retries_scheduled_total",
                "Round-end retries scheduled after a duplicate tick"
            ),
            registry
        )
        .expect("failed to register eom_retries_scheduled counter");

        let eom_ticks_discarded = register_int_counter_with_registry!(
            Opts::new(
                "meridian_eom_ticks_discarded_total",
                "Ticks discarded while not leader-capable"
            ),
            registry
        )
        .expect("failed to register eom_ticks_discarded counter");

        let engine_sleeps = register_int_counter_with_registry!(
            Opts::new(
                "meridian_engine_sleeps_total",
                "Processing engine iterations that found no work"
            ),
            registry
        )
        .expect("failed to register engine_sleeps counter");

        let process_calls = register_int_counter_with_registry!(
            Opts::new("meridian_process_calls_total", "Process() calls"),
            registry
        )
        .expect("failed to register process_calls counter");

        let update_state_calls = register_int_counter_with_registry!(
            Opts::new("meridian_update_state_calls_total", "UpdateState() calls"),
            registry
        )
        .expect("failed to register update_state_calls counter");

        let run_state = register_int_gauge_with_registry!(
            Opts::new("meridian_run_state", "Node lifecycle state"),
            registry
        )
        .expect("failed to register run_state gauge");

        Self {
            registry,
            inbound_queue_depth,
            dispatched,
            inbound_dropped,
            eom_generated,
            eom_retries_scheduled,
            eom_ticks_discarded,
            engine_sleeps,
            process_calls,
            update_state_calls,
            run_state,
        }
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
