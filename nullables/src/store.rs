//! Nullable store: thread-safe in-memory storage for testing.

use meridian_store::{MetaStore, NodeStore, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// An in-memory `NodeStore` for testing.
///
/// Counts how often `close` is called and how many of those calls actually
/// released the store, and can be switched into a mode where every read fails.
pub struct NullStore {
    meta: Mutex<HashMap<String, Vec<u8>>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    releases: AtomicUsize,
    failed_writes: AtomicUsize,
    fail_reads: AtomicBool,
}

impl NullStore {
    pub fn new() -> Self {
        Self {
            meta: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            failed_writes: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// A store whose reads all fail with a backend error.
    pub fn failing_reads() -> Self {
        let store = Self::new();
        store.set_fail_reads(true);
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `close` calls, including redundant ones.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Number of `close` calls that actually released the store.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Number of writes rejected because the store was closed.
    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }

    /// Open the store again, keeping its contents, as a restarted node would.
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaStore for NullStore {
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if let Err(e) = self.ensure_open() {
            self.failed_writes.fetch_add(1, Ordering::SeqCst);
            return Err(e);
        }
        self.meta
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_open()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("null store read of '{key}' failed")));
        }
        Ok(self.meta.lock().unwrap().get(key).cloned())
    }

    fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.meta.lock().unwrap().remove(key);
        Ok(())
    }
}

impl NodeStore for NullStore {
    fn close(&self) -> Result<(), StoreError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
