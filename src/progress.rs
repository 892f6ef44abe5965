// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Progress accounting and periodic reporting.
//!
//! [`ProgressCounter`] is the only state shared between the replication flow
//! and another task. The replication flow increments it; a
//! [`ProgressReporter`] task reads it on a fixed cadence and hands the value
//! to a [`ProgressSink`]. The reporter is not synchronized with replication
//! and may observe a slightly stale total.

use crate::metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default reporting period.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Shared count of operations handed to the target.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter {
    total: Arc<AtomicU64>,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` operations.
    pub fn add(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    /// Add one operation.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Current total.
    pub fn get(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Destination for periodic progress reports.
pub trait ProgressSink: Send + Sync + 'static {
    fn report(&self, total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64) + Send + Sync + 'static,
{
    fn report(&self, total: u64) {
        self(total)
    }
}

/// Prints the bare total on standard output, one line per report.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutProgress;

impl ProgressSink for StdoutProgress {
    fn report(&self, total: u64) {
        println!("{}", total);
    }
}

/// Timer-driven progress reporting task.
pub struct ProgressReporter;

impl ProgressReporter {
    /// Spawn the reporting loop.
    ///
    /// The first report happens one full `period` after spawning. The task
    /// exits once `stop_rx` turns `true` or its sender is dropped.
    pub fn spawn(
        counter: ProgressCounter,
        sink: Arc<dyn ProgressSink>,
        period: Duration,
        mut stop_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut timer = tokio::time::interval_at(start, period);

            loop {
                tokio::select! {
                    biased;

                    changed = stop_rx.changed() => {
                        // Err means the sender is gone, which also ends the run
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = timer.tick() => {
                        let total = counter.get();
                        metrics::set_progress_total(total);
                        sink.report(total);
                    }
                }
            }

            debug!(total = counter.get(), "Progress reporter stopped");
        })
    }
}
