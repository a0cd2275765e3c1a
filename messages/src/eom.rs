//! End-of-minute (round-end) signal.

use serde::{Deserialize, Serialize};
use std::fmt;

use meridian_crypto::{hash_message_bytes, verify_signature};
use meridian_types::{ChainId, MessageHash, PublicKey, Signature, Timestamp};

use crate::MessageError;

/// Last real minute of a block.
pub const LAST_MINUTE: u8 = 9;
/// Minute value a node reports while between blocks.
pub const GAP_MINUTE: u8 = 10;

const DOMAIN: &[u8] = b"meridian/eom/v1";

/// Round-end signal.
///
/// A locally generated EOM (`local_only == true`) is a timeout indicator fed
/// back into this node's own processing; it is never rebroadcast. Once signed
/// the message is immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EomMessage {
    timestamp: Timestamp,
    chain_id: ChainId,
    db_height: u32,
    vm_index: u32,
    minute: u8,
    signature: Option<Signature>,
    local_only: bool,
}

impl EomMessage {
    /// Build an unsigned EOM. Minutes above [`LAST_MINUTE`] are rejected: the
    /// gap minute must be collapsed by the caller before generation.
    pub fn new(
        timestamp: Timestamp,
        chain_id: ChainId,
        db_height: u32,
        vm_index: u32,
        minute: u8,
    ) -> Result<Self, MessageError> {
        if minute > LAST_MINUTE {
            return Err(MessageError::MinuteOutOfRange(minute));
        }
        Ok(Self {
            timestamp,
            chain_id,
            db_height,
            vm_index,
            minute,
            signature: None,
            local_only: false,
        })
    }

    /// Mark as a local timeout indicator.
    pub fn into_local(mut self) -> Self {
        self.local_only = true;
        self
    }

    /// Bytes covered by the signature. The local flag is not part of them.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DOMAIN.len() + 8 + 32 + 4 + 4 + 1);
        out.extend_from_slice(DOMAIN);
        out.extend_from_slice(&self.timestamp.as_millis().to_le_bytes());
        out.extend_from_slice(self.chain_id.as_bytes());
        out.extend_from_slice(&self.db_height.to_le_bytes());
        out.extend_from_slice(&self.vm_index.to_le_bytes());
        out.push(self.minute);
        out
    }

    /// Sign with the supplied signer. Fails if a signature is already present.
    pub fn sign_with<F>(&mut self, signer: F) -> Result<(), MessageError>
    where
        F: FnOnce(&[u8]) -> Signature,
    {
        if self.signature.is_some() {
            return Err(MessageError::AlreadySigned);
        }
        self.signature = Some(signer(&self.signing_bytes()));
        Ok(())
    }

    pub fn verify(&self, public_key: &PublicKey) -> bool {
        match &self.signature {
            Some(sig) => verify_signature(&self.signing_bytes(), sig, public_key),
            None => false,
        }
    }

    pub fn hash(&self) -> MessageHash {
        let mut bytes = self.signing_bytes();
        if let Some(sig) = &self.signature {
            bytes.extend_from_slice(sig.as_bytes());
        }
        hash_message_bytes(&bytes)
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn db_height(&self) -> u32 {
        self.db_height
    }

    pub fn vm_index(&self) -> u32 {
        self.vm_index
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn is_local(&self) -> bool {
        self.local_only
    }
}

impl fmt::Display for EomMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EOM {}-:-{} vm{} from {}{}",
            self.db_height,
            self.minute,
            self.vm_index,
            self.chain_id.short(),
            if self.local_only { " (local)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_crypto::{keypair_from_seed, sign_message};

    fn eom(minute: u8) -> EomMessage {
        EomMessage::new(
            Timestamp::from_millis(1_000),
            ChainId::new([8u8; 32]),
            10,
            0,
            minute,
        )
        .unwrap()
    }

    #[test]
    fn gap_minute_is_rejected() {
        assert_eq!(
            EomMessage::new(Timestamp::EPOCH, ChainId::ZERO, 1, 0, GAP_MINUTE),
            Err(MessageError::MinuteOutOfRange(GAP_MINUTE))
        );
    }

    #[test]
    fn signed_eom_verifies_and_is_immutable() {
        let kp = keypair_from_seed(&[3u8; 32]);
        let mut msg = eom(3).into_local();
        msg.sign_with(|bytes| sign_message(bytes, &kp.private)).unwrap();
        assert!(msg.verify(&kp.public));
        assert!(msg.is_local());

        let before = msg.hash();
        assert_eq!(
            msg.sign_with(|bytes| sign_message(bytes, &kp.private)),
            Err(MessageError::AlreadySigned)
        );
        assert_eq!(msg.hash(), before);
    }

    #[test]
    fn unsigned_eom_never_verifies() {
        let kp = keypair_from_seed(&[3u8; 32]);
        assert!(!eom(1).verify(&kp.public));
    }

    #[test]
    fn local_flag_does_not_change_signing_bytes() {
        assert_eq!(eom(4).signing_bytes(), eom(4).into_local().signing_bytes());
        assert_ne!(eom(4).signing_bytes(), eom(5).signing_bytes());
    }

    #[test]
    fn display_shows_round_position() {
        assert_eq!(eom(3).into_local().to_string(), "EOM 10-:-3 vm0 from 08080808 (local)");
    }
}
