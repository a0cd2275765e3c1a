//! The store handle owned by a running node.

use crate::meta::decode_u32;
use crate::{MetaStore, StateSnapshot, StoreError};

pub const ENTRY_HEIGHT_KEY: &str = "entry_height_complete";
pub const SNAPSHOT_KEY: &str = "state_snapshot";
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Persistent store shared by the processing engine, the state saver and the
/// shutdown coordinator.
///
/// `close` may be reached from more than one path during shutdown and must be
/// idempotent: the first call releases the backend, later calls return `Ok`.
/// Every other operation on a closed store fails with [`StoreError::Closed`].
pub trait NodeStore: MetaStore + Send + Sync {
    fn close(&self) -> Result<(), StoreError>;

    fn is_closed(&self) -> bool;

    /// Highest block whose entries are fully persisted, if recorded.
    fn fetch_entry_height(&self) -> Result<Option<u32>, StoreError> {
        self.get_meta(ENTRY_HEIGHT_KEY)?
            .map(|bytes| decode_u32(ENTRY_HEIGHT_KEY, &bytes))
            .transpose()
    }

    fn save_entry_height(&self, height: u32) -> Result<(), StoreError> {
        self.put_meta(ENTRY_HEIGHT_KEY, &height.to_le_bytes())
    }

    fn save_snapshot(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        self.put_meta(SNAPSHOT_KEY, &snapshot.encode()?)
    }

    fn load_snapshot(&self) -> Result<Option<StateSnapshot>, StoreError> {
        self.get_meta(SNAPSHOT_KEY)?
            .map(|bytes| StateSnapshot::decode(&bytes))
            .transpose()
    }

    /// Schema version, 0 for a fresh database.
    fn schema_version(&self) -> Result<u32, StoreError> {
        Ok(self
            .get_meta(SCHEMA_VERSION_KEY)?
            .map(|bytes| decode_u32(SCHEMA_VERSION_KEY, &bytes))
            .transpose()?
            .unwrap_or(0))
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StoreError> {
        self.put_meta(SCHEMA_VERSION_KEY, &version.to_le_bytes())
    }
}
