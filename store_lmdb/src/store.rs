//! The node's LMDB-backed store handle.

use std::path::Path;
use std::sync::RwLock;

use meridian_store::{NodeStore, StoreError};

use crate::environment::DEFAULT_MAP_SIZE;
use crate::{LmdbEnvironment, LmdbError};

/// `NodeStore` over an LMDB environment. Closing takes the environment out of
/// the lock, so a second close finds nothing to release.
pub struct LmdbStore {
    inner: RwLock<Option<LmdbEnvironment>>,
}

impl LmdbStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(path: &Path, map_size: usize) -> Result<Self, StoreError> {
        let env = LmdbEnvironment::open(path, map_size)?;
        tracing::info!(path = %path.display(), "opened LMDB store");
        Ok(Self {
            inner: RwLock::new(Some(env)),
        })
    }

    pub(crate) fn with_env<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&LmdbEnvironment) -> Result<T, LmdbError>,
    {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))?;
        let env = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(f(env)?)
    }
}

impl NodeStore for LmdbStore {
    fn close(&self) -> Result<(), StoreError> {
        let taken = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))?
            .take();
        match taken {
            Some(env) => {
                let path = env.path().display().to_string();
                env.close()?;
                tracing::info!(path = %path, "closed LMDB store");
            }
            None => tracing::debug!("LMDB store already closed"),
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.read().map(|g| g.is_none()).unwrap_or(true)
    }
}
