use std::{future::Future, time::Duration};

use abi::{BookingConfig, ParkingError};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        (&BookingConfig::default()).into()
    }
}

impl From<&BookingConfig> for RetryPolicy {
    fn from(config: &BookingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
            timeout: config.request_timeout(),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying lost races with linear backoff. The whole run,
    /// lock waits included, is bounded by `timeout`.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        name: &'static str,
        mut op: F,
    ) -> Result<T, ParkingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ParkingError>>,
    {
        let attempts = async {
            let mut attempt = 0;
            loop {
                match op().await {
                    Err(e) if e.is_retryable() && attempt < self.max_retries => {
                        attempt += 1;
                        warn!(op = name, attempt, error = %e, "retrying");
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                    res => return res,
                }
            }
        };

        tokio::time::timeout(self.timeout, attempts)
            .await
            .map_err(|_| ParkingError::Timeout(name))?
    }
}
