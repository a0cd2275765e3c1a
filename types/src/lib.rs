//! Fundamental types for the Meridian node.
//!
//! Identities, message hashes, key material, timestamps, network selection and
//! the node lifecycle state shared by every other crate in the workspace.

pub mod hash;
pub mod keys;
pub mod network;
pub mod state;
pub mod time;

pub use hash::{ChainId, HashParseError, MessageHash};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use state::RunState;
pub use time::Timestamp;
