// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mirror engine coordinator.
//!
//! The orchestrator that ties together:
//! - Snapshot replay (snapshot path) via [`snapshot_path`]
//! - Change stream consumption (watch path) via [`watch_path`]
//! - Transaction grouping via [`crate::batch::TransactionBatcher`]
//! - Periodic progress reporting via [`crate::progress::ProgressReporter`]
//!
//! # Architecture
//!
//! A run is one sequential flow:
//! 1. Validates the configuration
//! 2. Spawns the progress reporter
//! 3. Replays a snapshot when starting from the beginning of history
//! 4. Watches the change stream until it closes or a fatal error occurs
//!
//! The reporter task is the only other task; it only reads the counter.

mod snapshot_path;
mod types;
mod watch_path;

pub use types::{MirrorPhase, MirrorReport};

use crate::batch::TransactionBatcher;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::key_mapper::KeyMapper;
use crate::metrics;
use crate::progress::{ProgressCounter, ProgressReporter, ProgressSink, StdoutProgress};
use crate::resilience::RetryingTarget;
use crate::source::ChangeSource;
use crate::target::TargetStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Resolve once shutdown has been requested.
///
/// Never resolves if every sender is gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Cloneable handle that cancels a running mirror.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request cancellation. The run returns [`MirrorError::Shutdown`] at
    /// its next suspension point.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// The mirror engine.
///
/// Replicates everything under one prefix of a [`ChangeSource`] into a
/// [`TargetStore`], preserving revision order.
///
/// Target calls go through a [`RetryingTarget`] built from the config's
/// retry settings. With the default (one attempt) every write failure is
/// terminal.
pub struct MirrorEngine<C: ChangeSource, T: TargetStore> {
    /// Validated at the start of `run()`
    config: MirrorConfig,

    source: Arc<C>,

    target: Arc<RetryingTarget<T>>,

    /// Receives the progress total every `progress_interval`
    sink: Arc<dyn ProgressSink>,

    counter: ProgressCounter,

    /// Phase (broadcast to watchers)
    phase_tx: watch::Sender<MirrorPhase>,
    phase_rx: watch::Receiver<MirrorPhase>,

    /// Shutdown signal
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<C: ChangeSource, T: TargetStore> MirrorEngine<C, T> {
    /// Create an engine. Nothing is contacted until [`run()`](Self::run).
    pub fn new(config: MirrorConfig, source: Arc<C>, target: Arc<T>) -> Self {
        let (phase_tx, phase_rx) = watch::channel(MirrorPhase::Created);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let target = Arc::new(RetryingTarget::new(target, config.retry.retry_config()));

        Self {
            config,
            source,
            target,
            sink: Arc::new(StdoutProgress),
            counter: ProgressCounter::new(),
            phase_tx,
            phase_rx,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Replace the default stdout progress sink.
    pub fn with_progress_sink(mut self, sink: impl ProgressSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Handle for cancelling the run from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> MirrorPhase {
        *self.phase_rx.borrow()
    }

    /// Get a receiver to watch phase changes.
    pub fn phase_receiver(&self) -> watch::Receiver<MirrorPhase> {
        self.phase_rx.clone()
    }

    /// Shared progress counter (operations handed to the target so far).
    pub fn progress(&self) -> ProgressCounter {
        self.counter.clone()
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Run the mirror to completion.
    ///
    /// Returns when the source closes the change stream (`Done`), or with
    /// the first fatal error (`Aborted`). The error is logged once here and
    /// returned unchanged.
    pub async fn run(&mut self) -> Result<MirrorReport> {
        let phase = self.phase();
        if phase != MirrorPhase::Created {
            return Err(MirrorError::InvalidState {
                expected: MirrorPhase::Created.to_string(),
                actual: phase.to_string(),
            });
        }

        let result = self.run_phases().await;

        match &result {
            Ok(report) => {
                self.set_phase(MirrorPhase::Done);
                info!(
                    snapshot_keys = report.snapshot_keys,
                    events = report.events_applied,
                    transactions = report.transactions,
                    total = report.total,
                    last_committed_revision = ?report.last_committed_revision,
                    "Mirror run complete"
                );
            }
            Err(e) => {
                self.set_phase(MirrorPhase::Aborted);
                metrics::record_error(e.kind());
                error!(error = %e, kind = e.kind(), total = self.counter.get(), "Mirror run aborted");
            }
        }

        result
    }

    async fn run_phases(&mut self) -> Result<MirrorReport> {
        self.config.validate()?;

        let mapper = KeyMapper::new(self.config.prefix_mapping());
        let period = self.config.progress_interval_duration();

        info!(
            prefix = %mapper.mapping().source_prefix,
            dest_prefix = %mapper.mapping().dest_prefix,
            destination = %self.config.destination.endpoint,
            start_revision = self.config.start_revision,
            max_txn_ops = self.config.max_txn_ops,
            "Starting mirror"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let reporter = ProgressReporter::spawn(self.counter.clone(), Arc::clone(&self.sink), period, stop_rx);

        let result = self.replicate(&mapper).await;

        let _ = stop_tx.send(true);
        if let Err(e) = reporter.await {
            warn!(error = %e, "Progress reporter task failed");
        }

        result
    }

    async fn replicate(&self, mapper: &KeyMapper) -> Result<MirrorReport> {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut report = MirrorReport::default();

        let after_revision = if self.config.needs_snapshot() {
            self.set_phase(MirrorPhase::Snapshot);
            let outcome = snapshot_path::run_snapshot(
                self.source.as_ref(),
                self.target.as_ref(),
                mapper,
                &self.counter,
                &self.config.prefix,
                &mut shutdown_rx,
            )
            .await?;
            report.snapshot_keys = outcome.keys;
            if outcome.revision <= 0 {
                warn!(
                    revision = outcome.revision,
                    "Snapshot revision is not positive, writes made before the watch opens may be missed"
                );
            }
            outcome.revision
        } else {
            let watch_from = self.config.watch_from_revision();
            info!(
                start_revision = self.config.start_revision,
                watch_from, "Skipping snapshot, resuming from revision"
            );
            watch_from
        };

        self.set_phase(MirrorPhase::Incremental);
        let mut batcher = TransactionBatcher::new(Arc::clone(&self.target), self.config.max_txn_ops);
        let outcome = watch_path::run_watch(
            self.source.as_ref(),
            &mut batcher,
            mapper,
            &self.counter,
            &self.config.prefix,
            after_revision,
            &mut shutdown_rx,
        )
        .await?;

        report.events_applied = outcome.events;
        report.transactions = outcome.transactions;
        report.last_committed_revision = outcome.last_committed_revision;
        report.total = self.counter.get();
        Ok(report)
    }

    fn set_phase(&self, phase: MirrorPhase) {
        self.phase_tx.send_replace(phase);
        metrics::set_mirror_phase(&phase.to_string());
        info!(phase = %phase, "Mirror phase changed");
    }
}
