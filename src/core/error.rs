//! Error taxonomy for rate fetching, selection and persistence.

use thiserror::Error;

/// Failure of an upstream rate request. Recoverable through the rate cache.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error from {source_name}: {message}")]
    Network {
        source_name: String,
        message: String,
    },

    #[error("Request to {source_name} timed out")]
    Timeout { source_name: String },

    #[error("Bad response from {source_name}: HTTP {status}")]
    BadResponse { source_name: String, status: u16 },

    #[error("Failed to decode response from {source_name}: {message}")]
    Decode {
        source_name: String,
        message: String,
    },
}

impl FetchError {
    /// Maps a transport level reqwest error onto the taxonomy.
    pub fn from_reqwest(source_name: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                source_name: source_name.to_string(),
            }
        } else if err.is_decode() {
            FetchError::Decode {
                source_name: source_name.to_string(),
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            FetchError::BadResponse {
                source_name: source_name.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Network {
                source_name: source_name.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Maximum number of currencies reached ({max})")]
    LimitExceeded { max: usize },
}

/// Store read/write failure. Always logged, never surfaced to the user.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Failed to encode value for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<fjall::Error> for PersistenceError {
    fn from(err: fjall::Error) -> Self {
        PersistenceError::Backend(err.to_string())
    }
}
