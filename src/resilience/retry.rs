// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff for gateway calls.
//!
//! This only smooths over blips inside a single remote call. A call that
//! still fails is reported upward and the engine falls back to the pending
//! queue; nothing here retries forever.
//!
//! # Example
//!
//! ```
//! use userdata_sync::RetryConfig;
//!
//! let query = RetryConfig::query();
//! assert_eq!(query.max_attempts, 3);
//!
//! let once = RetryConfig::once();
//! assert_eq!(once.max_attempts, 1);
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Backoff settings for a single remote operation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Total attempts including the first one (at least 1)
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryConfig {
    /// Quick retry for interactive fetch/upsert calls.
    /// 3 attempts with fast backoff, then the caller degrades.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// No retry at all.
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }
}

/// Run `operation`, retrying failures for which `retryable` holds.
pub async fn retry<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(operation = operation_name, retries = attempts, "Remote operation succeeded after retry");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= max_attempts || !retryable(&err) {
                    return Err(err);
                }

                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max_attempts,
                    error = %err,
                    next_delay = ?delay,
                    "Remote operation failed, retrying"
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
