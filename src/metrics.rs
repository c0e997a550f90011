// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for index-engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `index_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: document_add, document_remove, rebuild, reset, delete_empty_nodes
//! - `status`: success, noop, error

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Record an engine operation outcome
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "index_engine_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "index_engine_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record instance nodes created during a walk
pub fn record_nodes_created(count: usize) {
    counter!("index_engine_nodes_created_total").increment(count as u64);
}

/// Record instance nodes pruned
pub fn record_nodes_pruned(count: usize) {
    counter!("index_engine_nodes_pruned_total").increment(count as u64);
}

/// Record an evaluation warning
pub fn record_warning() {
    counter!("index_engine_warnings_total").increment(1);
}

/// Record a lock contention event (held elsewhere)
pub fn record_lock_contention(scope: &str) {
    counter!(
        "index_engine_lock_contention_total",
        "scope" => scope.to_string()
    )
    .increment(1);
}

/// RAII latency timer: records on drop.
///
/// # Example
///
/// ```
/// use index_engine::LatencyTimer;
///
/// {
///     let _timer = LatencyTimer::new("document_add");
///     // ... work ...
/// } // recorded here
/// ```
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Elapsed time so far (for logging alongside the recorded metric)
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
