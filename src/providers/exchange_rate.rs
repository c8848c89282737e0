//! Fiat rates from an exchangerate-api style endpoint.
//!
//! `GET {base_url}/latest/{BASE}` answers with every rate quoted as units of
//! the target currency per one unit of the base.

use super::util::{build_client, get_json};
use crate::core::currency::{CurrencyClass, normalize_code};
use crate::core::error::FetchError;
use crate::core::provider::RateSource;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const SOURCE_NAME: &str = "exchangerate-api";

pub struct ExchangeRateSource {
    base_url: String,
    base_currency: String,
    client: reqwest::Client,
}

impl ExchangeRateSource {
    pub fn new(base_url: &str, base_currency: &str, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            base_currency: normalize_code(base_currency),
            client: build_client(SOURCE_NAME, timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FiatExchangeResponse {
    base: String,
    #[serde(default)]
    date: Option<String>,
    rates: HashMap<String, f64>,
}

#[async_trait]
impl RateSource for ExchangeRateSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn class(&self) -> CurrencyClass {
        CurrencyClass::Fiat
    }

    #[instrument(name = "FiatRatesFetch", skip(self), fields(base = %self.base_currency))]
    async fn fetch_batch(&self, codes: &[String]) -> Result<HashMap<String, f64>, FetchError> {
        let url = format!("{}/latest/{}", self.base_url, self.base_currency);
        let response: FiatExchangeResponse = get_json(&self.client, SOURCE_NAME, &url).await?;

        if normalize_code(&response.base) != self.base_currency {
            return Err(FetchError::Decode {
                source_name: SOURCE_NAME.to_string(),
                message: format!(
                    "expected rates for base {}, got {}",
                    self.base_currency, response.base
                ),
            });
        }
        debug!(date = ?response.date, count = response.rates.len(), "Received fiat rates");

        let upstream: HashMap<String, f64> = response
            .rates
            .into_iter()
            .map(|(code, rate)| (normalize_code(&code), rate))
            .collect();

        Ok(codes
            .iter()
            .filter_map(|code| upstream.get(code).map(|rate| (code.clone(), *rate)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/latest/USD"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;

        mock_server
    }

    const MOCK_JSON: &str = r#"{
        "base": "USD",
        "date": "2025-06-30",
        "rates": {"USD": 1.0, "EUR": 0.85, "CNY": 7.1, "RUB": 90.5, "GBP": 0.75}
    }"#;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_filters_to_requested_codes() {
        let mock_server = create_mock_server(200, MOCK_JSON).await;
        let source =
            ExchangeRateSource::new(&mock_server.uri(), "USD", Duration::from_secs(5)).unwrap();

        let rates = source
            .fetch_batch(&codes(&["USD", "EUR", "RUB"]))
            .await
            .unwrap();

        assert_eq!(rates.len(), 3);
        assert_eq!(rates["USD"], 1.0);
        assert_eq!(rates["EUR"], 0.85);
        assert_eq!(rates["RUB"], 90.5);
        assert!(!rates.contains_key("GBP"));
    }

    #[tokio::test]
    async fn test_unknown_codes_are_dropped() {
        let mock_server = create_mock_server(200, MOCK_JSON).await;
        let source =
            ExchangeRateSource::new(&mock_server.uri(), "USD", Duration::from_secs(5)).unwrap();

        let rates = source.fetch_batch(&codes(&["EUR", "XYZ"])).await.unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates["EUR"], 0.85);
    }

    #[tokio::test]
    async fn test_server_error_is_bad_response() {
        let mock_server = create_mock_server(500, "").await;
        let source =
            ExchangeRateSource::new(&mock_server.uri(), "USD", Duration::from_secs(5)).unwrap();

        let result = source.fetch_batch(&codes(&["EUR"])).await;
        assert_eq!(
            result.unwrap_err(),
            FetchError::BadResponse {
                source_name: SOURCE_NAME.to_string(),
                status: 500
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_response_is_decode_error() {
        let mock_server = create_mock_server(200, r#"{"base": "USD", "rate": {}}"#).await;
        let source =
            ExchangeRateSource::new(&mock_server.uri(), "USD", Duration::from_secs(5)).unwrap();

        let result = source.fetch_batch(&codes(&["EUR"])).await;
        assert!(matches!(result, Err(FetchError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest/USD"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(MOCK_JSON)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;
        let source =
            ExchangeRateSource::new(&mock_server.uri(), "USD", Duration::from_millis(50)).unwrap();

        let result = source.fetch_batch(&codes(&["EUR"])).await;
        assert_eq!(
            result.unwrap_err(),
            FetchError::Timeout {
                source_name: SOURCE_NAME.to_string()
            }
        );
    }
}
