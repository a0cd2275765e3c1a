//! Abstract storage traits for the Meridian node.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits.

pub mod error;
pub mod meta;
pub mod node_store;
pub mod snapshot;

pub use error::StoreError;
pub use meta::MetaStore;
pub use node_store::NodeStore;
pub use snapshot::StateSnapshot;
