//! In-memory key-value storage for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::traits::{KeyValueStorage, StorageError};

/// In-memory storage with switchable failures.
///
/// Clones share the same map, so a test can keep a handle while the
/// token store owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
    fail_reads: Arc<Mutex<bool>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `get` fail with `Unavailable`.
    pub fn set_fail_reads(&self, should_fail: bool) {
        *self.fail_reads.lock().unwrap() = should_fail;
    }

    /// Make `set` and `remove` fail with `QuotaExceeded`.
    pub fn set_fail_writes(&self, should_fail: bool) {
        *self.fail_writes.lock().unwrap() = should_fail;
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().unwrap().is_empty()
    }

    /// Copy of everything stored (for assertions).
    pub fn entries(&self) -> HashMap<String, String> {
        self.values.lock().unwrap().clone()
    }
}

impl KeyValueStorage for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(StorageError::Unavailable("mock read failure".to_string()));
        }
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(StorageError::QuotaExceeded);
        }
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if *self.fail_writes.lock().unwrap() {
            return Err(StorageError::QuotaExceeded);
        }
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}
