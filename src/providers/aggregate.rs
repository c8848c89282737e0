//! Combines a fiat and a crypto [`RateSource`] into one [`RateProvider`].

use crate::core::currency::{Currency, CurrencyClass, normalize_code};
use crate::core::error::FetchError;
use crate::core::provider::{RateProvider, RateSource};
use crate::core::rates::RateTable;
use async_trait::async_trait;
use futures::future::join;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RateAggregator {
    fiat: Arc<dyn RateSource>,
    crypto: Arc<dyn RateSource>,
    base_currency: String,
    include_base_rate: bool,
}

impl RateAggregator {
    pub fn new(
        fiat: Arc<dyn RateSource>,
        crypto: Arc<dyn RateSource>,
        base_currency: &str,
        include_base_rate: bool,
    ) -> Self {
        debug_assert_eq!(fiat.class(), CurrencyClass::Fiat, "fiat slot got {}", fiat.name());
        debug_assert_eq!(
            crypto.class(),
            CurrencyClass::Crypto,
            "crypto slot got {}",
            crypto.name()
        );
        Self {
            fiat,
            crypto,
            base_currency: normalize_code(base_currency),
            include_base_rate,
        }
    }
}

fn codes_of(currencies: &[Currency], class: CurrencyClass) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for currency in currencies.iter().filter(|c| c.class == class) {
        if !codes.contains(&currency.code) {
            codes.push(currency.code.clone());
        }
    }
    codes
}

async fn fetch_partition(
    source: &dyn RateSource,
    codes: &[String],
) -> Option<Result<HashMap<String, f64>, FetchError>> {
    if codes.is_empty() {
        return None;
    }
    let result = source.fetch_batch(codes).await;
    if let Err(e) = &result {
        warn!(source = source.name(), error = %e, "Rate source failed");
    }
    Some(result)
}

#[async_trait]
impl RateProvider for RateAggregator {
    async fn fetch(&self, currencies: &[Currency]) -> Result<RateTable, FetchError> {
        let fiat_codes = codes_of(currencies, CurrencyClass::Fiat);
        let crypto_codes = codes_of(currencies, CurrencyClass::Crypto);
        debug!(?fiat_codes, ?crypto_codes, "Fetching rates");

        // Both requests run concurrently and both finish before merging.
        let (fiat, crypto) = join(
            fetch_partition(self.fiat.as_ref(), &fiat_codes),
            fetch_partition(self.crypto.as_ref(), &crypto_codes),
        )
        .await;

        let mut table = RateTable::new();
        let mut first_error = None;
        for outcome in [fiat, crypto].into_iter().flatten() {
            match outcome {
                Ok(rates) => {
                    for (code, rate) in rates {
                        table.insert(&code, rate);
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(err) = first_error {
            if table.is_empty() {
                return Err(err);
            }
            debug!(count = table.len(), "Returning partial rate table");
        }

        let base_requested = fiat_codes.contains(&self.base_currency);
        if self.include_base_rate && base_requested {
            table.insert(&self.base_currency, 1.0);
        }
        Ok(table)
    }
}
