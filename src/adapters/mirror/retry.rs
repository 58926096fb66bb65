//! Retry policy for mirror searches
//!
//! Generic failures back off exponentially; the API's hard rate limit signal
//! gets a fixed, longer sleep. Exhausting the attempts returns the last error.

use crate::config::RetryConfig;
use crate::core::clock::Clock;
use crate::domain::MirrorError;
use crate::log_retry_attempt;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub rate_limit_delay_ms: u64,
}

impl RetryPolicy {
    /// Sleep before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: usize, error: &MirrorError) -> Duration {
        if error.is_rate_limit() {
            return Duration::from_millis(self.rate_limit_delay_ms);
        }
        let factor = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay_ms = (self.initial_delay_ms as f64 * factor) as u64;
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Runs `operation` until it succeeds, fails permanently or runs out of retries
    pub async fn run<F, Fut, T>(&self, clock: &dyn Clock, mut operation: F) -> Result<T, MirrorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MirrorError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt > self.max_retries {
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt, &e);
                    log_retry_attempt!(attempt, self.max_retries, delay.as_millis() as u64, e);
                    clock.sleep(delay).await;
                }
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay_ms: config.initial_delay_ms,
            max_delay_ms: config.max_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
            rate_limit_delay_ms: config.rate_limit_delay_ms,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
