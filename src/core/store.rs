//! Key-value persistence boundary

use crate::core::error::PersistenceError;
use async_trait::async_trait;

pub const SELECTED_CURRENCIES_KEY: &str = "selectedCurrencies";
pub const LAST_RATES_KEY: &str = "lastRates";
pub const LAST_UPDATE_KEY: &str = "lastUpdateTime";

/// Blob store keyed by string. An absent key is `Ok(None)`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), PersistenceError>;
}
