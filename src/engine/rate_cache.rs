use crate::core::error::PersistenceError;
use crate::core::rates::RateTable;
use crate::core::store::{LAST_RATES_KEY, LAST_UPDATE_KEY, Store};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Last merged rate table as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRates {
    pub table: RateTable,
    /// Time of the fetch that produced the table, if it was recorded.
    pub fetched_at: Option<DateTime<Utc>>,
}

pub struct RateCache {
    store: Arc<dyn Store>,
}

impl RateCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Best-effort write of the table and its fetch time.
    pub async fn save(&self, table: &RateTable, fetched_at: DateTime<Utc>) {
        if let Err(e) = self.put(LAST_RATES_KEY, table).await {
            warn!(error = %e, "Failed to cache rates");
            return;
        }
        if let Err(e) = self.put(LAST_UPDATE_KEY, &fetched_at).await {
            warn!(error = %e, "Failed to cache rate timestamp");
        }
        debug!(count = table.len(), %fetched_at, "Cached rates");
    }

    /// `None` when nothing usable is cached.
    pub async fn load(&self) -> Option<CachedRates> {
        let table = self
            .read::<RateTable>(LAST_RATES_KEY)
            .await?
            .sanitized();
        if table.is_empty() {
            return None;
        }
        let fetched_at = self.read::<DateTime<Utc>>(LAST_UPDATE_KEY).await;
        debug!(count = table.len(), ?fetched_at, "Loaded cached rates");
        Some(CachedRates { table, fetched_at })
    }

    async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(value).map_err(|source| PersistenceError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, bytes).await
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.get(key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(error = %e, key, "Failed to read cache");
                return None;
            }
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| warn!(error = %e, key, "Discarding unreadable cache entry"))
            .ok()
    }
}
