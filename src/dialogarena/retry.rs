//! Bounded retry with randomized exponential backoff.
//!
//! Backends report transient failures (rate limits, timeouts, malformed payloads) as plain
//! errors. Retrying is owned here rather than by each backend, so every actor gets the same
//! bounded behaviour and an actor whose backend is exhausted degrades in exactly one place.
//!
//! The wait before retry `n` (1-based count of failed attempts so far) is drawn uniformly
//! from `[min_backoff, clamp(multiplier * 2^(n-1), min_backoff, max_backoff)]`.

use crate::dialogarena::backend::Backend;
use crate::dialogarena::config::ConfigError;
use crate::dialogarena::prompt::Prompt;
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// How many times to call a backend and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of backend calls, including the first. At least 1.
    pub max_attempts: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Base of the exponential curve; the first retry waits at most this long.
    pub multiplier_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            multiplier_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_backoff: Duration, max_backoff: Duration) -> Result<Self, ConfigError> {
        let policy = Self {
            max_attempts,
            min_backoff_ms: min_backoff.as_millis() as u64,
            max_backoff_ms: max_backoff.as_millis() as u64,
            multiplier_ms: min_backoff.as_millis().max(1) as u64,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// A policy that retries without sleeping. Handy for tests and local stubs.
    pub fn no_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier_ms: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.min_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "min_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.min_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// Upper bound of the wait after `failed_attempts` failures.
    pub fn backoff_ceiling(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(32);
        let grown = self.multiplier_ms.saturating_mul(1u64 << exponent);
        let ceiling = grown.clamp(self.min_backoff_ms, self.max_backoff_ms.max(self.min_backoff_ms));
        Duration::from_millis(ceiling)
    }

    /// Randomized wait after `failed_attempts` failures.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let ceiling = self.backoff_ceiling(failed_attempts).as_millis() as u64;
        if ceiling <= self.min_backoff_ms {
            return Duration::from_millis(ceiling);
        }
        let millis = rand::rng().random_range(self.min_backoff_ms..=ceiling);
        Duration::from_millis(millis)
    }
}

/// Every attempt failed. Carries the last backend error as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
    pub last_error: String,
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Backend failed after {} attempt(s): {}",
            self.attempts, self.last_error
        )
    }
}

impl Error for Exhausted {}

/// Query `backend` until it succeeds or `policy.max_attempts` calls have failed.
pub async fn query_with_retry(
    backend: &dyn Backend,
    prompt: &Prompt,
    policy: &RetryPolicy,
) -> Result<String, Exhausted> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        // A response without usage must not leave an earlier call's figure behind.
        backend.take_usage();
        match backend.query(prompt).await {
            Ok(text) => return Ok(text),
            Err(err) if attempt >= max_attempts => {
                return Err(Exhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }
            Err(err) => {
                let wait = policy.backoff(attempt);
                debug!(
                    "{} query for '{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                    backend.model_name(),
                    prompt.agent_name,
                    attempt,
                    max_attempts,
                    err,
                    wait
                );
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
