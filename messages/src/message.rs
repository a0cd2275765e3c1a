//! The routed message envelope.

use serde::{Deserialize, Serialize};
use std::fmt;

use meridian_crypto::hash_message_bytes;
use meridian_types::{ChainId, MessageHash, Timestamp};

use crate::{AckMessage, EomMessage, MessageError};

/// Protocol message kinds known to the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Eom,
    Ack,
    DirectoryBlockSignature,
    CommitChain,
    CommitEntry,
    RevealEntry,
    FactoidTransaction,
    Heartbeat,
    MissingMessage,
    MissingMessageResponse,
    DbStateMissing,
    DbState,
    Bounce,
}

impl MessageType {
    pub const ALL: [MessageType; 13] = [
        Self::Eom,
        Self::Ack,
        Self::DirectoryBlockSignature,
        Self::CommitChain,
        Self::CommitEntry,
        Self::RevealEntry,
        Self::FactoidTransaction,
        Self::Heartbeat,
        Self::MissingMessage,
        Self::MissingMessageResponse,
        Self::DbStateMissing,
        Self::DbState,
        Self::Bounce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eom => "EOM",
            Self::Ack => "ACK",
            Self::DirectoryBlockSignature => "DBSIG",
            Self::CommitChain => "COMMIT_CHAIN",
            Self::CommitEntry => "COMMIT_ENTRY",
            Self::RevealEntry => "REVEAL_ENTRY",
            Self::FactoidTransaction => "FACTOID_TX",
            Self::Heartbeat => "HEARTBEAT",
            Self::MissingMessage => "MISSING_MSG",
            Self::MissingMessageResponse => "MISSING_MSG_RESPONSE",
            Self::DbStateMissing => "DBSTATE_MISSING",
            Self::DbState => "DBSTATE",
            Self::Bounce => "BOUNCE",
        }
    }

    /// Code used on the wire and in snapshots.
    pub fn code(&self) -> u8 {
        match self {
            Self::Eom => 0,
            Self::Ack => 1,
            Self::DirectoryBlockSignature => 2,
            Self::CommitChain => 3,
            Self::CommitEntry => 4,
            Self::RevealEntry => 5,
            Self::FactoidTransaction => 6,
            Self::Heartbeat => 7,
            Self::MissingMessage => 8,
            Self::MissingMessageResponse => 9,
            Self::DbStateMissing => 10,
            Self::DbState => 11,
            Self::Bounce => 12,
        }
    }

    /// Types with their own structure in this crate.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Eom | Self::Ack)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol message the node routes but does not interpret structurally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMessage {
    msg_type: MessageType,
    timestamp: Timestamp,
    origin: Option<ChainId>,
    payload: Vec<u8>,
}

impl NetworkMessage {
    pub fn new(
        msg_type: MessageType,
        timestamp: Timestamp,
        origin: Option<ChainId>,
        payload: Vec<u8>,
    ) -> Result<Self, MessageError> {
        if msg_type.is_structured() {
            return Err(MessageError::ReservedType(msg_type));
        }
        Ok(Self {
            msg_type,
            timestamp,
            origin,
            payload,
        })
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn origin(&self) -> Option<ChainId> {
        self.origin
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn hash(&self) -> MessageHash {
        let mut bytes = Vec::with_capacity(1 + 8 + 33 + self.payload.len());
        bytes.push(self.msg_type.code());
        bytes.extend_from_slice(&self.timestamp.as_millis().to_le_bytes());
        match &self.origin {
            Some(id) => {
                bytes.push(1);
                bytes.extend_from_slice(id.as_bytes());
            }
            None => bytes.push(0),
        }
        bytes.extend_from_slice(&self.payload);
        hash_message_bytes(&bytes)
    }
}

/// Any message travelling through the node's queues.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Eom(EomMessage),
    Ack(AckMessage),
    Network(NetworkMessage),
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Self::Eom(_) => MessageType::Eom,
            Self::Ack(_) => MessageType::Ack,
            Self::Network(m) => m.msg_type(),
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack(_))
    }

    pub fn hash(&self) -> MessageHash {
        match self {
            Self::Eom(m) => m.hash(),
            Self::Ack(m) => m.hash(),
            Self::Network(m) => m.hash(),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::Eom(m) => m.timestamp(),
            Self::Ack(m) => m.timestamp,
            Self::Network(m) => m.timestamp(),
        }
    }

    /// Whether the message must stay on this node.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Eom(m) if m.is_local())
    }
}

impl From<EomMessage> for Message {
    fn from(m: EomMessage) -> Self {
        Self::Eom(m)
    }
}

impl From<AckMessage> for Message {
    fn from(m: AckMessage) -> Self {
        Self::Ack(m)
    }
}

impl From<NetworkMessage> for Message {
    fn from(m: NetworkMessage) -> Self {
        Self::Network(m)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eom(m) => m.fmt(f),
            Self::Ack(m) => m.fmt(f),
            Self::Network(m) => write!(
                f,
                "{} {} ({} bytes)",
                m.msg_type(),
                m.hash().short(),
                m.payload().len()
            ),
        }
    }
}
