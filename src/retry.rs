//! Whole-pipeline retry with capped exponential backoff

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::error::Result;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Randomizes each delay by up to ±(factor * delay); 0 disables jitter
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_retry_count(3)
    }
}

impl RetryPolicy {
    /// Policy for the `HTTP_RETRY_COUNT` setting; zero still makes one attempt
    pub fn from_retry_count(count: u32) -> Self {
        Self {
            max_attempts: count.max(1),
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: 0.2,
        }
    }

    pub fn no_retry() -> Self {
        Self::from_retry_count(1)
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Delay before attempt number `attempt` (1-based; the first attempt has none)
    ///
    /// `initial * 2^(attempt - 2)`, capped at `max_delay`, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        let base = self
            .initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter_factor <= 0.0 || base.is_zero() {
            return base;
        }
        let spread = self.jitter_factor.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
        base.mul_f64(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt + 1);
                    log::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
