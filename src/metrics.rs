// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics through the `metrics` facade for:
//! - Snapshot replay progress
//! - Watch consumption
//! - Transaction commits, sizes and latency
//! - Revision splits caused by the transaction size limit
//! - Compactions and terminal errors
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `mirror_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! No recorder is installed by this crate; without one every call is a no-op.
//!
//! # Usage
//!
//! ```rust,no_run
//! use keyspace_mirror::metrics;
//! use std::time::Duration;
//!
//! metrics::record_watch_batch(42);
//! metrics::record_txn_commit(128, Duration::from_millis(12));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Snapshot Metrics
// =============================================================================

/// Record one snapshot key written to the target.
pub fn record_snapshot_put(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("mirror_snapshot_puts_total", "status" => status).increment(1);
}

/// Record a snapshot chunk received from the source.
pub fn record_snapshot_chunk(pairs: usize) {
    counter!("mirror_snapshot_chunks_total").increment(1);
    histogram!("mirror_snapshot_chunk_size").record(pairs as f64);
}

/// Record snapshot phase completion.
pub fn record_snapshot_complete(keys: u64, duration: Duration) {
    counter!("mirror_snapshot_keys_total").increment(keys);
    histogram!("mirror_snapshot_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Watch Metrics
// =============================================================================

/// Record a watch batch and the number of events it carried.
pub fn record_watch_batch(events: usize) {
    counter!("mirror_watch_batches_total").increment(1);
    if events > 0 {
        counter!("mirror_watch_events_total").increment(events as u64);
    }
}

/// Record a classified event by kind.
pub fn record_event(kind: &str) {
    counter!("mirror_events_total", "kind" => kind.to_string()).increment(1);
}

/// Record a compaction signal from the source.
pub fn record_compaction(compact_revision: i64) {
    counter!("mirror_compactions_total").increment(1);
    gauge!("mirror_compact_revision").set(compact_revision as f64);
}

// =============================================================================
// Transaction Metrics
// =============================================================================

/// Record a committed transaction.
pub fn record_txn_commit(ops: usize, duration: Duration) {
    counter!("mirror_txn_commits_total").increment(1);
    counter!("mirror_txn_ops_total").increment(ops as u64);
    histogram!("mirror_txn_size").record(ops as f64);
    histogram!("mirror_txn_commit_duration_seconds").record(duration.as_secs_f64());
}

/// Record a rejected transaction.
pub fn record_txn_failure(ops: usize) {
    counter!("mirror_txn_failures_total").increment(1);
    histogram!("mirror_txn_failed_size").record(ops as f64);
}

/// Record a revision split across transactions by the size limit.
pub fn record_revision_split() {
    counter!("mirror_revision_splits_total").increment(1);
}

/// Set the revision of the last committed transaction.
pub fn set_last_committed_revision(revision: i64) {
    gauge!("mirror_last_committed_revision").set(revision as f64);
}

// =============================================================================
// Progress, Errors, Engine
// =============================================================================

/// Set the progress total gauge.
pub fn set_progress_total(total: u64) {
    gauge!("mirror_progress_total").set(total as f64);
}

/// Record a target call retry.
pub fn record_target_retry(operation: &str) {
    counter!("mirror_target_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record errors by type.
pub fn record_error(error_type: &str) {
    counter!("mirror_errors_total", "error_type" => error_type.to_string()).increment(1);
}

/// Gauge for the run phase.
pub fn set_mirror_phase(phase: &str) {
    // Numeric encoding for alerting
    let value = match phase {
        "Created" => 0.0,
        "Snapshot" => 1.0,
        "Incremental" => 2.0,
        "Done" => 3.0,
        "Aborted" => 4.0,
        _ => -1.0,
    };
    gauge!("mirror_phase").set(value);
}
