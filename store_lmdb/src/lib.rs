//! LMDB storage backend for the Meridian node.
//!
//! Implements the `meridian-store` traits using the `heed` LMDB bindings.
//! Node metadata lives in a single named database inside one environment.

pub mod environment;
pub mod error;
pub mod meta;
pub mod store;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use store::LmdbStore;
