//! Metadata storage trait.

use crate::StoreError;

/// Generic key-value store for node bookkeeping: persisted heights, the
/// latest state snapshot and the schema version.
pub trait MetaStore {
    /// Store a metadata value.
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a metadata value, `None` if absent.
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete a metadata entry. Deleting a missing key is not an error.
    fn delete_meta(&self, key: &str) -> Result<(), StoreError>;
}

/// Decode a little-endian `u32` stored under `key`.
pub(crate) fn decode_u32(key: &str, bytes: &[u8]) -> Result<u32, StoreError> {
    let arr: [u8; 4] = bytes.try_into().map_err(|_| {
        StoreError::Corruption(format!("{key} has unexpected byte length {}", bytes.len()))
    })?;
    Ok(u32::from_le_bytes(arr))
}
