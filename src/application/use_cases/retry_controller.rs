use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::application::RetryNotice;
use crate::domain::DomainError;

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Bounded retry loop with linear backoff.
///
/// Only failures for which [`DomainError::is_retryable`] holds are retried.
/// Retry `n` (1-indexed) waits `base_delay * n` first. Once the budget is
/// spent, the last error is returned as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryController {
    max_retries: u32,
    base_delay: Duration,
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(MAX_RETRIES, RETRY_DELAY)
    }
}

impl RetryController {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }

    /// Run `operation` until it succeeds, fails terminally, or the retry
    /// budget is exhausted. `operation` receives the 1-indexed attempt number;
    /// `on_retry` is told about each retry before the delay starts.
    pub async fn run<T, F, Fut, N>(&self, mut operation: F, mut on_retry: N) -> Result<T, DomainError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
        N: FnMut(&RetryNotice),
    {
        let mut retries = 0;
        loop {
            let error = match operation(retries + 1).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(error);
            }
            if retries >= self.max_retries {
                warn!("Giving up after {} retries: {}", retries, error);
                return Err(error);
            }

            retries += 1;
            let notice = RetryNotice {
                attempt: retries,
                max_retries: self.max_retries,
                delay: self.delay_for(retries),
                reason: error.to_string(),
            };
            warn!(
                "Retryable failure ({}), retry {}/{} in {:?}",
                error, notice.attempt, notice.max_retries, notice.delay
            );
            on_retry(&notice);
            tokio::time::sleep(notice.delay).await;
        }
    }
}
