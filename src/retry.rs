// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff for contended locks.
//!
//! Lock acquisition failing with [`LockError::Held`] is a retryable
//! condition: the operation should be attempted again after a short
//! delay. Dispatchers use [`acquire_with_retry`] to do this in place of
//! requeueing.
//!
//! # Example
//!
//! ```
//! use index_engine::RetryConfig;
//! use std::time::Duration;
//!
//! // Dispatcher default: a handful of attempts, then give up
//! let dispatcher = RetryConfig::dispatcher();
//! assert_eq!(dispatcher.max_retries, Some(5));
//!
//! // Interactive: fail fast so the caller can report contention
//! let interactive = RetryConfig::interactive();
//! assert_eq!(interactive.max_retries, Some(1));
//! ```

use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::locking::{LockError, LockGuard, LockManager};

/// Configuration for lock-acquisition retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// `None` retries forever.
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::dispatcher()
    }
}

impl RetryConfig {
    /// Queue-dispatcher preset: 5 attempts with exponential backoff.
    /// If the lock is still held after that, the work item goes back on
    /// the queue.
    #[must_use]
    pub fn dispatcher() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            max_retries: Some(5),
        }
    }

    /// Interactive preset: one retry, then surface the contention.
    #[must_use]
    pub fn interactive() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
            factor: 1.0,
            max_retries: Some(1),
        }
    }
}

/// Acquire a named lock, retrying held-elsewhere failures with backoff.
///
/// Non-retryable errors ([`LockError::Backend`]) propagate immediately.
pub async fn acquire_with_retry(
    locks: &dyn LockManager,
    name: &str,
    config: &RetryConfig,
) -> Result<LockGuard, LockError> {
    let mut delay = config.initial_delay;
    let mut attempt = 0usize;

    loop {
        match locks.acquire(name).await {
            Ok(guard) => return Ok(guard),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                attempt += 1;
                if let Some(max) = config.max_retries {
                    if attempt > max {
                        return Err(err);
                    }
                }
                warn!(lock = %name, attempt, delay_ms = delay.as_millis() as u64,
                    "Lock held elsewhere, backing off");
                sleep(delay).await;
                delay = delay.mul_f64(config.factor).min(config.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::InProcessLockManager;

    #[tokio::test]
    async fn test_acquires_immediately_when_free() {
        let manager = InProcessLockManager::new();
        let config = RetryConfig::interactive();
        let guard = acquire_with_retry(&manager, "a", &config).await;
        assert!(guard.is_ok());
    }

    #[tokio::test]
    async fn test_exhausts_attempts_when_held() {
        let manager = InProcessLockManager::new();
        let _held = manager.acquire("a").await.unwrap();

        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            factor: 2.0,
            max_retries: Some(2),
        };
        let err = acquire_with_retry(&manager, "a", &config).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_succeeds_after_holder_releases() {
        let manager = std::sync::Arc::new(InProcessLockManager::new());
        let held = manager.acquire("a").await.unwrap();

        let manager2 = std::sync::Arc::clone(&manager);
        let task = tokio::spawn(async move {
            let config = RetryConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
                factor: 1.0,
                max_retries: Some(20),
            };
            acquire_with_retry(manager2.as_ref(), "a", &config).await
        });

        tokio::time::sleep(Duration::from_millis(15)).await;
        drop(held);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
