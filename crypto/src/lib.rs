//! Cryptographic primitives for the Meridian node.
//!
//! - **Ed25519** for signing round-end and acknowledgment messages
//! - **Blake2b-256** for message hashes and identity derivation

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi, hash_message_bytes};
pub use keys::{
    chain_id_for, generate_keypair, keypair_from_private, keypair_from_seed,
    public_from_private, random_u32, seed_from_label, CryptoError,
};
pub use sign::{sign_message, verify_signature};
