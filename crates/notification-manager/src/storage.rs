use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Key/value store shared with the host.
///
/// Holds the raw configuration options the change signals re-read and the
/// persisted identifier counters.
pub trait StorageAdapter: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: String) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    store: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.store
            .lock()
            .map_err(|_| crate::Error::Storage("storage lock poisoned".to_string()))
    }
}

impl StorageAdapter for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }
}
