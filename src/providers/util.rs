use crate::core::error::FetchError;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

/// Builds the shared HTTP client. The timeout bounds every request; there is
/// no retry at this level.
pub fn build_client(source_name: &str, timeout: Duration) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent("xcur/1.0")
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::Network {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })
}

/// Issues a GET and decodes a JSON body, mapping every failure onto
/// [`FetchError`].
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    source_name: &str,
    url: &str,
) -> Result<T, FetchError> {
    debug!("Requesting {} rates from {}", source_name, url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(source_name, &e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::BadResponse {
            source_name: source_name.to_string(),
            status: status.as_u16(),
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(source_name, &e))?;

    serde_json::from_str(&text).map_err(|e| {
        error!(
            error = ?e,
            response = %text,
            "Failed to parse {} response", source_name
        );
        FetchError::Decode {
            source_name: source_name.to_string(),
            message: e.to_string(),
        }
    })
}
