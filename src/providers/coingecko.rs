//! Crypto prices from a CoinGecko style endpoint.
//!
//! `GET {base_url}/simple/price?ids=bitcoin,ethereum&vs_currencies=usd`
//! answers `{"bitcoin": {"usd": 50000.0}}`, i.e. units of the base per coin.

use super::util::{build_client, get_json};
use crate::core::currency::{CurrencyClass, normalize_code};
use crate::core::error::FetchError;
use crate::core::provider::RateSource;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const SOURCE_NAME: &str = "coingecko";

const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("BNB", "binancecoin"),
    ("ADA", "cardano"),
    ("XRP", "ripple"),
    ("DOGE", "dogecoin"),
    ("DOT", "polkadot"),
    ("SOL", "solana"),
    ("MATIC", "matic-network"),
    ("LINK", "chainlink"),
    ("LTC", "litecoin"),
    ("AVAX", "avalanche-2"),
    ("UNI", "uniswap"),
    ("ATOM", "cosmos"),
    ("ICP", "internet-computer"),
    ("BCH", "bitcoin-cash"),
    ("XLM", "stellar"),
    ("VET", "vechain"),
    ("FIL", "filecoin"),
    ("TRX", "tron"),
    ("ETC", "ethereum-classic"),
    ("XMR", "monero"),
    ("ALGO", "algorand"),
    ("HBAR", "hedera-hashgraph"),
    ("NEAR", "near"),
];

/// Upstream id for a ticker, if the ticker is mapped.
pub fn coin_id(code: &str) -> Option<&'static str> {
    COIN_IDS
        .iter()
        .find(|(ticker, _)| *ticker == code)
        .map(|(_, id)| *id)
}

fn ticker_for(id: &str) -> Option<&'static str> {
    COIN_IDS
        .iter()
        .find(|(_, coin)| *coin == id)
        .map(|(ticker, _)| *ticker)
}

type CryptoPriceResponse = HashMap<String, HashMap<String, f64>>;

pub struct CoinGeckoSource {
    base_url: String,
    vs_currency: String,
    client: reqwest::Client,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str, base_currency: &str, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: base_currency.trim().to_lowercase(),
            client: build_client(SOURCE_NAME, timeout)?,
        })
    }
}

#[async_trait]
impl RateSource for CoinGeckoSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn class(&self) -> CurrencyClass {
        CurrencyClass::Crypto
    }

    #[instrument(name = "CryptoRatesFetch", skip(self), fields(vs = %self.vs_currency))]
    async fn fetch_batch(&self, codes: &[String]) -> Result<HashMap<String, f64>, FetchError> {
        let ids: Vec<&str> = codes.iter().filter_map(|code| coin_id(code)).collect();
        if ids.is_empty() {
            debug!("No mapped coin ids in request, skipping upstream call");
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url,
            ids.join(","),
            self.vs_currency
        );
        let response: CryptoPriceResponse = get_json(&self.client, SOURCE_NAME, &url).await?;

        let rates: HashMap<String, f64> = response
            .into_iter()
            .filter_map(|(id, prices)| {
                let ticker = ticker_for(&id)?;
                let price = prices.get(&self.vs_currency)?;
                Some((normalize_code(ticker), *price))
            })
            .collect();
        debug!(count = rates.len(), "Received crypto prices");
        Ok(rates)
    }
}
