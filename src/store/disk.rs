use crate::core::error::PersistenceError;
use crate::core::store::Store;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

const SETTINGS_PARTITION: &str = "settings";

/// Store backed by a fjall keyspace under the app data directory.
pub struct DiskStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(path).map_err(|e| PersistenceError::Backend(e.to_string()))?;

        let keyspace = fjall::Config::new(path).open()?;
        let partition =
            keyspace.open_partition(SETTINGS_PARTITION, PartitionCreateOptions::default())?;
        debug!("Opened disk store at {}", path.display());
        Ok(Self {
            keyspace,
            partition,
        })
    }
}

#[async_trait]
impl Store for DiskStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match self.partition.get(key)? {
            Some(value) => {
                debug!("Store HIT for key: {}", key);
                Ok(Some(value.to_vec()))
            }
            None => {
                debug!("Store MISS for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        self.partition.insert(key, value)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Store SET for key: {}", key);
        Ok(())
    }
}
