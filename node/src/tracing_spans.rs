//! Pre-built [`tracing::Span`] constructors for the node's long-lived workers.
//!
//! Using consistent span names and field sets makes it easy to filter and
//! correlate log lines from the engine thread and the dispatch task.

use tracing::{info_span, Span};

/// Span covering the processing engine thread for its whole life.
pub fn processing_engine_span(node: &str) -> Span {
    info_span!("processing_engine", node = %node)
}

/// Span covering the dispatch loop task.
pub fn dispatch_loop_span(node: &str) -> Span {
    info_span!("dispatch_loop", node = %node)
}

/// Span covering the supervisor that turns dispatch faults into shutdown.
pub fn supervisor_span(node: &str) -> Span {
    info_span!("supervisor", node = %node)
}
