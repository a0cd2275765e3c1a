//! LMDB implementation of MetaStore.

use meridian_store::meta::MetaStore;
use meridian_store::StoreError;

use crate::{LmdbError, LmdbStore};

impl MetaStore for LmdbStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.with_env(|lmdb| {
            let mut wtxn = lmdb.env.write_txn()?;
            lmdb.meta_db.put(&mut wtxn, key.as_bytes(), value)?;
            wtxn.commit()?;
            Ok(())
        })
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_env(|lmdb| {
            let rtxn = lmdb.env.read_txn()?;
            let val = lmdb.meta_db.get(&rtxn, key.as_bytes())?;
            Ok::<_, LmdbError>(val.map(|bytes| bytes.to_vec()))
        })
    }

    fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        self.with_env(|lmdb| {
            let mut wtxn = lmdb.env.write_txn()?;
            lmdb.meta_db.delete(&mut wtxn, key.as_bytes())?;
            wtxn.commit()?;
            Ok(())
        })
    }
}
