use optrade_core::config::RetryConfig;
use optrade_core::error::{BrokerError, BrokerResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounded retry with exponential backoff around a single broker call.
///
/// Each attempt is capped by the adapter timeout. Only retryable errors are
/// retried, and cancellation aborts both an in-flight attempt and a pending
/// backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    timeout: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(config: RetryConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent.
    ///
    /// # Errors
    /// Returns the last error seen, [`BrokerError::Timeout`] if the last
    /// attempt timed out, or [`BrokerError::Cancelled`] on cancellation.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> BrokerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BrokerResult<T>>,
    {
        self.run_with(self.config.max_attempts, operation, cancel, call)
            .await
    }

    /// Single attempt with timeout and cancellation, for calls that must not
    /// be repeated such as order placement.
    ///
    /// # Errors
    /// Returns the call's error, [`BrokerError::Timeout`] or
    /// [`BrokerError::Cancelled`].
    pub async fn run_once<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        call: F,
    ) -> BrokerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BrokerResult<T>>,
    {
        self.run_with(1, operation, cancel, call).await
    }

    async fn run_with<T, F, Fut>(
        &self,
        max_attempts: u32,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> BrokerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BrokerResult<T>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => return Err(BrokerError::Cancelled),
                outcome = tokio::time::timeout(self.timeout, call()) => {
                    outcome.unwrap_or(Err(BrokerError::Timeout(self.timeout.as_secs())))
                }
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Broker call failed, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(BrokerError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
