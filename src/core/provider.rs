//! Rate provider abstractions

use crate::core::currency::{Currency, CurrencyClass};
use crate::core::error::FetchError;
use crate::core::rates::RateTable;
use async_trait::async_trait;
use std::collections::HashMap;

/// Produces a unified rate table for a set of currencies. Each entry is keyed
/// by its canonical code and expressed in the native convention of its
/// class. A successful result may be incomplete.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch(&self, currencies: &[Currency]) -> Result<RateTable, FetchError>;
}

/// One upstream that serves a single currency class in one batched request.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &str;

    fn class(&self) -> CurrencyClass;

    /// Codes the source cannot map upstream are left out of the result.
    async fn fetch_batch(&self, codes: &[String]) -> Result<HashMap<String, f64>, FetchError>;
}
