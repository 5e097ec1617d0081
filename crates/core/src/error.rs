//! Error types shared by the engine and broker adapters.
//!
//! [`BrokerError`] is what an adapter reports; [`EngineError`] is what a
//! cycle reports for one subscription and decides how the scheduler reacts.

use thiserror::Error;

/// Errors an adapter can return from any broker call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker does not know the symbol or contract.
    #[error("not found: {0}")]
    NotFound(String),

    /// API request failed.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error message from the broker.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// The call did not finish within the adapter timeout.
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Order rejected by the broker.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Response could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// No session for this broker.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// The engine stopped while the call was in flight.
    #[error("call cancelled")]
    Cancelled,
}

impl BrokerError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Returns true if repeating the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited => true,
            Self::Api { status_code, .. } => *status_code >= 500 || *status_code == 429,
            _ => false,
        }
    }
}

/// Result type alias for adapter calls.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Per-subscription cycle failures, caught at the scheduler boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No candles, or too few to compute indicators. Retried next interval.
    #[error("{symbol}: data unavailable: {reason}")]
    DataUnavailable {
        /// Subscription symbol.
        symbol: String,
        /// Why the cycle was skipped.
        reason: String,
    },

    /// The broker could not resolve the symbol. The subscription is deactivated.
    #[error("{symbol}: instrument resolution failed: {source}")]
    InstrumentResolutionFailed {
        /// Subscription symbol.
        symbol: String,
        /// Underlying adapter error.
        source: BrokerError,
    },

    /// An adapter call failed. The cycle is skipped, the subscription stays active.
    #[error("{symbol}: {operation} failed: {source}")]
    Adapter {
        /// Subscription symbol.
        symbol: String,
        /// Adapter operation that failed.
        operation: &'static str,
        /// Underlying adapter error.
        source: BrokerError,
    },

    /// The decision engine could not classify the row. Treated as Hold.
    #[error("{symbol}: ambiguous decision: {reason}")]
    DecisionAmbiguous {
        /// Subscription symbol.
        symbol: String,
        /// What made the row unclassifiable.
        reason: String,
    },

    /// No open option leg to close.
    #[error("no open positions for {0}")]
    NoOpenPositions(String),

    /// The engine is shutting down.
    #[error("cancelled")]
    Cancelled,

    /// Configuration rejected at start.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Creates a data-unavailable error.
    pub fn data_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Creates an adapter error for a named operation. A cancelled call
    /// maps to [`EngineError::Cancelled`].
    pub fn adapter(symbol: impl Into<String>, operation: &'static str, source: BrokerError) -> Self {
        if source == BrokerError::Cancelled {
            return Self::Cancelled;
        }
        Self::Adapter {
            symbol: symbol.into(),
            operation,
            source,
        }
    }

    /// Returns true if the subscription must stop being scheduled.
    #[must_use]
    pub const fn deactivates(&self) -> bool {
        matches!(self, Self::InstrumentResolutionFailed { .. })
    }

    /// Returns true if this outcome counts towards the consecutive-failure limit.
    #[must_use]
    pub const fn counts_as_failure(&self) -> bool {
        matches!(self, Self::Adapter { .. })
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
