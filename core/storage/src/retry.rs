//! Backoff policy for transient provider failures.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use polystore_common::Result;

/// How often and how patiently a failed provider call is repeated.
///
/// Delays grow geometrically from `initial_delay_ms` by `multiplier` and
/// never exceed `max_delay_ms`. With `jitter` each delay is scaled by a
/// random factor in `[0.75, 1.25)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Pause before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let grown = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let mut millis = grown.min(self.max_delay_ms as f64);
        if self.jitter {
            millis *= 0.75 + rand::random::<f64>() * 0.5;
        }
        Duration::from_millis(millis as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Runs provider calls under a [`RetryConfig`].
///
/// Only errors for which [`polystore_common::Error::is_transient`] holds
/// are retried; everything else is returned on the first failure.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Call `attempt` until it succeeds, fails permanently or runs out of
    /// retries. `operation` and `path` only label log events.
    pub async fn execute<F, Fut, T>(&self, operation: &str, path: &str, attempt: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            let err = match attempt().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(operation, path, retries, "Storage call recovered");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_transient() || retries >= self.config.max_retries {
                if retries > 0 {
                    warn!(operation, path, retries, error = %err, "Giving up on storage call");
                }
                return Err(err);
            }

            let delay = self.config.backoff(retries);
            retries += 1;
            warn!(
                operation,
                path,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient storage failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
