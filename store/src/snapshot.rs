//! Periodic state snapshot.

use serde::{Deserialize, Serialize};

use meridian_types::Timestamp;

use crate::StoreError;

/// Point-in-time view of the authoritative state written by the state saver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub height: u32,
    pub minute: u8,
    pub vm_index: u32,
    pub entry_height_complete: u32,
    pub saved_at: Timestamp,
}

impl StateSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
