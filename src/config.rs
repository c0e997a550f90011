//! Configuration for the index engine.
//!
//! # Example
//!
//! ```
//! use index_engine::IndexEngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = IndexEngineConfig::default();
//! assert_eq!(config.max_value_length, 128);
//! assert_eq!(config.path_separator, " / ");
//!
//! // Full config
//! let config = IndexEngineConfig {
//!     path_separator: " > ".into(),
//!     max_value_length: 64,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Configuration for the index engine.
///
/// All fields have sensible defaults. Most hosts only ever touch
/// `path_separator` (shown in full-path rendering) and the lock retry
/// settings when the engine runs behind a busy task queue.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexEngineConfig {
    /// Separator used when rendering an instance node's full path
    /// (default: `" / "`).
    #[serde(default = "default_path_separator")]
    pub path_separator: String,

    /// Maximum length of an evaluated node value. Longer results produce
    /// a warning and skip the branch (default: 128).
    #[serde(default = "default_max_value_length")]
    pub max_value_length: usize,

    /// Lock retry: initial backoff delay in milliseconds
    #[serde(default = "default_lock_retry_initial_ms")]
    pub lock_retry_initial_ms: u64,

    /// Lock retry: backoff cap in milliseconds
    #[serde(default = "default_lock_retry_max_ms")]
    pub lock_retry_max_ms: u64,

    /// Lock retry: backoff multiplier per attempt
    #[serde(default = "default_lock_retry_factor")]
    pub lock_retry_factor: f64,

    /// Lock retry: attempts before giving up (used by dispatchers)
    #[serde(default = "default_lock_retry_attempts")]
    pub lock_retry_attempts: usize,

    /// Path cache: maximum number of cached node paths
    #[serde(default = "default_path_cache_max_entries")]
    pub path_cache_max_entries: usize,
}

fn default_path_separator() -> String {
    " / ".to_string()
}
fn default_max_value_length() -> usize {
    128
}
fn default_lock_retry_initial_ms() -> u64 {
    100
}
fn default_lock_retry_max_ms() -> u64 {
    2_000
}
fn default_lock_retry_factor() -> f64 {
    2.0
}
fn default_lock_retry_attempts() -> usize {
    5
}
fn default_path_cache_max_entries() -> usize {
    10_000
}

impl Default for IndexEngineConfig {
    fn default() -> Self {
        Self {
            path_separator: default_path_separator(),
            max_value_length: default_max_value_length(),
            lock_retry_initial_ms: default_lock_retry_initial_ms(),
            lock_retry_max_ms: default_lock_retry_max_ms(),
            lock_retry_factor: default_lock_retry_factor(),
            lock_retry_attempts: default_lock_retry_attempts(),
            path_cache_max_entries: default_path_cache_max_entries(),
        }
    }
}

impl IndexEngineConfig {
    /// Build the [`RetryConfig`] used when retrying lock acquisition.
    #[must_use]
    pub fn lock_retry(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.lock_retry_initial_ms),
            max_delay: Duration::from_millis(self.lock_retry_max_ms),
            factor: self.lock_retry_factor,
            max_retries: Some(self.lock_retry_attempts),
        }
    }
}
