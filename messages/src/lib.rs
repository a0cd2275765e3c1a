//! Protocol messages handled by a Meridian node.
//!
//! Only the round-end signal ([`EomMessage`]) and acknowledgments
//! ([`AckMessage`]) have a structure the node itself depends on. Every other
//! protocol message travels as an opaque [`NetworkMessage`] tagged with its
//! [`MessageType`], which is all the dispatch loop needs to route it.

pub mod ack;
pub mod eom;
pub mod error;
pub mod message;

pub use ack::AckMessage;
pub use eom::{EomMessage, GAP_MINUTE, LAST_MINUTE};
pub use error::MessageError;
pub use message::{Message, MessageType, NetworkMessage};
