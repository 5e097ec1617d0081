//! Error types for the Upstox adapter.

use optrade_core::error::BrokerError;
use thiserror::Error;

/// Errors that can occur when talking to Upstox.
#[derive(Debug, Error)]
pub enum UpstoxError {
    /// No access token configured.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// API request failed.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from API.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limit exceeded")]
    RateLimit,

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// The API answered with a non-success status field.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Symbol or contract missing from the instrument master.
    #[error("instrument not found: {0}")]
    InstrumentNotFound(String),

    /// Instrument master could not be read.
    #[error("instrument master error: {0}")]
    InstrumentMaster(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl UpstoxError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for UpstoxError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<csv::Error> for UpstoxError {
    fn from(err: csv::Error) -> Self {
        Self::InstrumentMaster(err.to_string())
    }
}

impl From<UpstoxError> for BrokerError {
    fn from(err: UpstoxError) -> Self {
        match err {
            UpstoxError::Api {
                status_code,
                message,
            } => Self::Api {
                status_code,
                message,
            },
            UpstoxError::RateLimit => Self::RateLimited,
            UpstoxError::Network(msg) | UpstoxError::Timeout(msg) => Self::Network(msg),
            UpstoxError::OrderRejected(msg) => Self::Rejected(msg),
            UpstoxError::InstrumentNotFound(msg) => Self::NotFound(msg),
            UpstoxError::Authentication(msg) => Self::NotConnected(msg),
            UpstoxError::InstrumentMaster(msg) | UpstoxError::Serialization(msg) => {
                Self::InvalidResponse(msg)
            }
        }
    }
}

/// Result type alias for Upstox operations.
pub type Result<T> = std::result::Result<T, UpstoxError>;
