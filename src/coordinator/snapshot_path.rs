// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot path: initial replay of every key under the prefix.
//!
//! Drains the snapshot stream chunk by chunk and writes each pair to the
//! target with a single-key put. Nothing is batched here; the watch path
//! continues after the snapshot revision, so ordering between snapshot keys
//! does not matter.
//!
//! Any put failure aborts the run immediately. A source error item on the
//! stream is terminal even when every earlier chunk was applied.

use super::shutdown_requested;
use crate::error::{MirrorError, Result};
use crate::key_mapper::KeyMapper;
use crate::metrics;
use crate::progress::ProgressCounter;
use crate::source::{ChangeSource, Revision};
use crate::target::TargetStore;
use futures::StreamExt;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, info_span, Instrument};

/// Result of a completed snapshot replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SnapshotOutcome {
    pub keys: u64,
    pub revision: Revision,
}

/// Replay the snapshot of `prefix` into the target.
pub(crate) async fn run_snapshot<C: ChangeSource, T: TargetStore>(
    source: &C,
    target: &T,
    mapper: &KeyMapper,
    counter: &ProgressCounter,
    prefix: &str,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<SnapshotOutcome> {
    let span = info_span!("snapshot_path", prefix = %prefix);

    async move {
        info!("Starting snapshot replay");
        let start = Instant::now();

        let snapshot = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown_rx) => return Err(MirrorError::Shutdown),
            result = source.snapshot(prefix) => result?,
        };
        let revision = snapshot.revision;
        let mut chunks = snapshot.chunks;
        let mut keys: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown_rx) => {
                    info!(keys, "Shutdown requested during snapshot replay");
                    return Err(MirrorError::Shutdown);
                }
                next = chunks.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Err(MirrorError::Source(e.to_string())),
                None => break,
            };

            metrics::record_snapshot_chunk(chunk.len());
            debug!(pairs = chunk.len(), "Snapshot chunk received");

            for pair in chunk.pairs {
                let key = mapper.map(&pair.key);
                let result = tokio::select! {
                    biased;
                    _ = shutdown_requested(shutdown_rx) => return Err(MirrorError::Shutdown),
                    result = target.put(key.clone(), pair.value) => result,
                };

                if let Err(e) = result {
                    metrics::record_snapshot_put(false);
                    return Err(MirrorError::Write {
                        key,
                        message: e.to_string(),
                    });
                }

                metrics::record_snapshot_put(true);
                counter.increment();
                keys += 1;
            }
        }

        metrics::record_snapshot_complete(keys, start.elapsed());
        info!(
            keys,
            revision,
            duration_ms = start.elapsed().as_millis() as u64,
            "Snapshot replay complete"
        );

        Ok(SnapshotOutcome { keys, revision })
    }
    .instrument(span)
    .await
}
