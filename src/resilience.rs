// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Opt-in retry policy for target store calls.
//!
//! The mirror core treats every write failure as fatal. Operators who prefer
//! availability can wrap the target in a [`RetryingTarget`], which re-attempts
//! a failed `put` or `commit` with exponential backoff before giving up.
//!
//! Re-applying a transaction is safe for a mirror: the operations are
//! absolute puts and deletes, so a commit that actually landed before its
//! acknowledgement was lost leaves the same state when applied again.
//!
//! # Example
//!
//! ```rust,no_run
//! use keyspace_mirror::resilience::{RetryConfig, RetryingTarget};
//! use keyspace_mirror::target::NoOpTarget;
//! use std::sync::Arc;
//!
//! // Up to 3 attempts per call: 100ms, then 200ms between them
//! let target = RetryingTarget::new(Arc::new(NoOpTarget), RetryConfig::bounded(3));
//! ```

use crate::metrics;
use crate::target::{BoxFuture, Op, StoreResult, TargetStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Retry behavior for target calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per call, including the first one.
    /// `1` disables retry.
    pub max_attempts: usize,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (ceiling for exponential backoff).
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 = double delay each retry).
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryConfig {
    /// Single attempt: failures are returned immediately.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }

    /// `max_attempts` attempts with the default backoff schedule.
    pub fn bounded(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::none()
        }
    }

    /// Fast schedule for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }

    /// Whether more than one attempt is allowed.
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }

    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        std::cmp::min(Duration::from_secs_f64(delay_secs), self.max_delay)
    }
}

/// [`TargetStore`] wrapper that retries failed calls.
///
/// With [`RetryConfig::none()`] it is a plain pass-through.
pub struct RetryingTarget<T: TargetStore> {
    inner: Arc<T>,
    config: RetryConfig,
}

impl<T: TargetStore> RetryingTarget<T> {
    pub fn new(inner: Arc<T>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// The wrapped target.
    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    async fn with_retry<F, Fut>(&self, operation: &'static str, mut call: F) -> StoreResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<()>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.max_attempts => {
                    let delay = self.config.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Target call failed, retrying"
                    );
                    metrics::record_target_retry(operation);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<T: TargetStore> TargetStore for RetryingTarget<T> {
    fn put(&self, key: String, value: Vec<u8>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.with_retry("put", || self.inner.put(key.clone(), value.clone()))
                .await
        })
    }

    fn commit(&self, ops: Vec<Op>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.with_retry("commit", || self.inner.commit(ops.clone()))
                .await
        })
    }
}
