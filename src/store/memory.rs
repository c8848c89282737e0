use crate::core::error::PersistenceError;
use crate::core::store::Store;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory store, used for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let store = self.inner.lock().await;
        let value = store.get(key).cloned();
        if value.is_some() {
            debug!("Store HIT for key: {}", key);
        } else {
            debug!("Store MISS for key: {}", key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        let mut store = self.inner.lock().await;
        debug!("Store SET for key: {}", key);
        store.insert(key.to_string(), value);
        Ok(())
    }
}
