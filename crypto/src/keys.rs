//! Ed25519 key generation and identity derivation.

use ed25519_dalek::SigningKey;
use meridian_types::{ChainId, KeyPair, PrivateKey, PublicKey};
use thiserror::Error;

use crate::hash::blake2b_256_multi;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("operating system randomness unavailable: {0}")]
    Entropy(String),
}

/// Generate a new key pair from the operating system's entropy source.
pub fn generate_keypair() -> Result<KeyPair, CryptoError> {
    let mut seed = [0u8; 32];
    getrandom::getrandom(&mut seed).map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(keypair_from_seed(&seed))
}

/// Uniform random `u32`, used by fault injection.
pub fn random_u32() -> Result<u32, CryptoError> {
    let mut buf = [0u8; 4];
    getrandom::getrandom(&mut buf).map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(u32::from_le_bytes(buf))
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    PublicKey(SigningKey::from_bytes(&private.0).verifying_key().to_bytes())
}

/// Reconstruct a full key pair from a private key.
pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    let public = public_from_private(&private);
    KeyPair { public, private }
}

/// Derive a key pair deterministically from a 32-byte seed.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Seed for simulated or local nodes that have no configured identity:
/// `Blake2b("meridian-seed" || label)`.
pub fn seed_from_label(label: &str) -> [u8; 32] {
    blake2b_256_multi(&[b"meridian-seed", label.as_bytes()])
}

/// Identity chain id of a signing key: `Blake2b("meridian-identity" || pubkey)`.
pub fn chain_id_for(public: &PublicKey) -> ChainId {
    ChainId::new(blake2b_256_multi(&[b"meridian-identity", public.as_bytes()]))
}
