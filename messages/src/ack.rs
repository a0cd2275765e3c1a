//! Leader acknowledgments.

use serde::{Deserialize, Serialize};
use std::fmt;

use meridian_crypto::{hash_message_bytes, verify_signature};
use meridian_types::{ChainId, MessageHash, PublicKey, Signature, Timestamp};

const DOMAIN: &[u8] = b"meridian/ack/v1";

/// A leader's signed acknowledgment placing `message_hash` at position
/// `height` of its process-list lane `vm_index`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    pub timestamp: Timestamp,
    pub leader_chain_id: ChainId,
    pub db_height: u32,
    pub vm_index: u32,
    pub minute: u8,
    pub height: u32,
    pub message_hash: MessageHash,
    pub serial_hash: MessageHash,
    pub signature: Signature,
}

impl AckMessage {
    pub fn signing_bytes(
        timestamp: Timestamp,
        leader_chain_id: &ChainId,
        position: (u32, u32, u8, u32),
        message_hash: &MessageHash,
        serial_hash: &MessageHash,
    ) -> Vec<u8> {
        let (db_height, vm_index, minute, height) = position;
        let mut out = Vec::with_capacity(DOMAIN.len() + 8 + 32 * 3 + 13);
        out.extend_from_slice(DOMAIN);
        out.extend_from_slice(&timestamp.as_millis().to_le_bytes());
        out.extend_from_slice(leader_chain_id.as_bytes());
        out.extend_from_slice(&db_height.to_le_bytes());
        out.extend_from_slice(&vm_index.to_le_bytes());
        out.push(minute);
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(message_hash.as_bytes());
        out.extend_from_slice(serial_hash.as_bytes());
        out
    }

    fn own_signing_bytes(&self) -> Vec<u8> {
        Self::signing_bytes(
            self.timestamp,
            &self.leader_chain_id,
            (self.db_height, self.vm_index, self.minute, self.height),
            &self.message_hash,
            &self.serial_hash,
        )
    }

    pub fn verify(&self, leader_key: &PublicKey) -> bool {
        verify_signature(&self.own_signing_bytes(), &self.signature, leader_key)
    }

    pub fn hash(&self) -> MessageHash {
        let mut bytes = self.own_signing_bytes();
        bytes.extend_from_slice(self.signature.as_bytes());
        hash_message_bytes(&bytes)
    }
}

impl fmt::Display for AckMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ACK {}-:-{} vm{} #{} for {}",
            self.db_height,
            self.minute,
            self.vm_index,
            self.height,
            self.message_hash.short()
        )
    }
}
