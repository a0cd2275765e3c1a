//! Nullable infrastructure for deterministic testing.
//!
//! Test-friendly implementations of the node's external dependencies that
//! never touch the filesystem and can be inspected or steered from a test.

pub mod store;

pub use store::NullStore;
