//! Per-target serialization and backoff around single service calls.
//!
//! All calls sharing a target id run one at a time under a lock created on
//! first use. Inside the lock, failures are retried by category:
//!
//! - rate limited: wait the suggested retry-after (or exponential backoff)
//!   plus jitter, with no attempt cap
//! - transient: exponential backoff capped at 10s, up to `max_attempts`
//! - other: exponential backoff capped at 5s, up to `max_attempts`

use crate::error::{Error, ErrorCategory, Result};
use crate::types::TargetId;
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Rate limiter tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Attempt cap for non-rate-limit errors
    pub max_attempts: u32,
    /// Base of the exponential backoff
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to rate-limit waits
    pub max_jitter: Duration,
    /// Backoff ceiling for transient service errors
    pub transient_cap: Duration,
    /// Backoff ceiling for other errors
    pub other_cap: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(500),
            transient_cap: Duration::from_secs(10),
            other_cap: Duration::from_secs(5),
        }
    }
}

impl RateLimitConfig {
    /// Config with no waiting at all
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            ..Self::default()
        }
    }

    /// `base * 2^attempt`, capped
    pub fn backoff(&self, attempt: u32, cap: Duration) -> Duration {
        let factor = 2f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let secs = (self.base_delay.as_secs_f64() * factor).min(cap.as_secs_f64());
        buildplan::types::seconds(secs)
    }

    /// Wait before retrying after `error` on failed attempt `attempt`
    /// (1-based); `None` means give up.
    pub fn delay_for(&self, error: &Error, attempt: u32) -> Option<Duration> {
        match error.category() {
            ErrorCategory::RateLimited => Some(
                error
                    .retry_after()
                    .unwrap_or_else(|| self.backoff(attempt, self.transient_cap)),
            ),
            _ if attempt >= self.max_attempts => None,
            ErrorCategory::Transient => Some(self.backoff(attempt, self.transient_cap)),
            ErrorCategory::Other => Some(self.backoff(attempt, self.other_cap)),
        }
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let secs = rand::thread_rng().gen_range(0.0..=self.max_jitter.as_secs_f64());
        buildplan::types::seconds(secs)
    }
}

/// Serializes and retries service calls per target
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    locks: Mutex<HashMap<TargetId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock_for(&self, target: TargetId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(target).or_default())
    }

    /// Run `operation` under the target's lock, retrying by error category
    pub async fn run<T, F, Fut>(&self, target: TargetId, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let lock = self.lock_for(target);
        let _guard = lock.lock().await;

        let mut attempt: u32 = 0;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            attempt += 1;

            let Some(mut wait) = self.config.delay_for(&error, attempt) else {
                let category = error.category();
                log::debug!(
                    "Giving up on target {target} after {attempt} attempt(s): {error} ({}). {}",
                    category.description(),
                    category.advice()
                );
                return Err(error);
            };
            if error.category().is_unbounded() {
                wait += self.config.jitter();
                log::warn!("Target {target} rate limited; waiting {wait:?}");
            } else {
                log::debug!(
                    "Target {target} call failed ({}), attempt {attempt}/{}; retrying in {wait:?}",
                    error,
                    self.config.max_attempts
                );
            }
            tokio::time::sleep(wait).await;
        }
    }
}
