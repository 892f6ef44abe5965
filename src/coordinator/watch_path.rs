// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Watch path: incremental replication of the change stream.
//!
//! Each watch batch is handled in arrival order:
//! 1. A compaction signal ends the run with [`MirrorError::Compacted`]
//! 2. Every event is classified into a put or delete on the mapped key
//! 3. The operation goes to the [`TransactionBatcher`], which commits on
//!    revision boundaries and at the size limit
//! 4. The pending group is flushed once the batch is exhausted
//!
//! When the source closes the stream, the remaining group is committed with
//! `flush_final` and the run completes.

use super::shutdown_requested;
use crate::batch::TransactionBatcher;
use crate::error::{MirrorError, Result};
use crate::key_mapper::KeyMapper;
use crate::metrics;
use crate::progress::ProgressCounter;
use crate::source::{ChangeEvent, ChangeSource, EventKind, Revision};
use crate::target::{Op, TargetStore};
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of a watch phase that ended with the source closing the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct WatchOutcome {
    pub events: u64,
    pub transactions: u64,
    pub last_committed_revision: Option<Revision>,
}

/// Turn a change event into an operation on the destination key.
pub(crate) fn classify(event: ChangeEvent, mapper: &KeyMapper) -> Result<Op> {
    match event.kind {
        EventKind::Put => Ok(Op::put(mapper.map(&event.key), event.value)),
        EventKind::Delete => Ok(Op::delete(mapper.map(&event.key))),
        EventKind::Other(code) => Err(MirrorError::ProtocolViolation(format!(
            "unknown event kind {} for key {:?} at revision {}",
            code, event.key, event.revision
        ))),
    }
}

/// Consume the change stream after `after_revision` until it closes.
pub(crate) async fn run_watch<C: ChangeSource, T: TargetStore>(
    source: &C,
    batcher: &mut TransactionBatcher<T>,
    mapper: &KeyMapper,
    counter: &ProgressCounter,
    prefix: &str,
    after_revision: Revision,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<WatchOutcome> {
    let span = info_span!("watch_path", prefix = %prefix, after_revision);

    async move {
        info!("Starting change stream consumption");

        let mut stream = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown_rx) => return Err(MirrorError::Shutdown),
            result = source.watch(prefix, after_revision) => result?,
        };
        let mut events: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown_rx) => {
                    info!(events, pending = batcher.len(), "Shutdown requested, leaving pending group uncommitted");
                    return Err(MirrorError::Shutdown);
                }
                next = stream.next() => next,
            };

            let batch = match next {
                Some(Ok(batch)) => batch,
                Some(Err(e)) => return Err(MirrorError::Source(e.to_string())),
                None => break,
            };

            metrics::record_watch_batch(batch.events.len());

            if let Some(compact_revision) = batch.compaction() {
                metrics::record_compaction(compact_revision);
                warn!(
                    compact_revision,
                    pending = batcher.len(),
                    "Required revision has been compacted"
                );
                return Err(MirrorError::Compacted {
                    revision: compact_revision,
                });
            }

            debug!(events = batch.events.len(), "Watch batch received");

            for event in batch.events {
                let revision = event.revision;
                let kind = event.kind;
                let op = classify(event, mapper)?;

                counter.increment();
                events += 1;
                metrics::record_event(if kind == EventKind::Put { "put" } else { "delete" });

                tokio::select! {
                    biased;
                    _ = shutdown_requested(shutdown_rx) => return Err(MirrorError::Shutdown),
                    result = batcher.append(op, revision) => { result?; }
                }
            }

            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown_rx) => return Err(MirrorError::Shutdown),
                result = batcher.flush() => { result?; }
            }
        }

        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown_rx) => return Err(MirrorError::Shutdown),
            result = batcher.flush_final() => { result?; }
        }

        let stats = batcher.stats();
        info!(
            events,
            transactions = stats.transactions,
            last_committed_revision = ?stats.last_committed_revision,
            "Change stream closed"
        );

        Ok(WatchOutcome {
            events,
            transactions: stats.transactions,
            last_committed_revision: stats.last_committed_revision,
        })
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_mapper::PrefixMapping;
    use crate::source::{BoxFuture, Snapshot, SourceError, SourceResult, WatchBatch, WatchStream};
    use crate::target::StoreError;
    use futures::stream;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::{Arc, Mutex};

    /// Source whose watch replays a fixed list of items.
    struct FixedWatch {
        items: Mutex<Option<Vec<SourceResult<WatchBatch>>>>,
        after: AtomicI64,
        /// Keep the stream open after the scripted items.
        hang: bool,
    }

    impl FixedWatch {
        fn new(items: Vec<SourceResult<WatchBatch>>) -> Self {
            Self {
                items: Mutex::new(Some(items)),
                after: AtomicI64::new(-1),
                hang: false,
            }
        }
    }

    impl ChangeSource for FixedWatch {
        fn snapshot(&self, _prefix: &str) -> BoxFuture<'_, Snapshot> {
            Box::pin(async { Ok(Snapshot::from_chunks(0, vec![])) })
        }

        fn watch(&self, _prefix: &str, after_revision: Revision) -> BoxFuture<'_, WatchStream> {
            self.after.store(after_revision, Ordering::SeqCst);
            let items = self.items.lock().unwrap().take().unwrap_or_default();
            let hang = self.hang;
            Box::pin(async move {
                let scripted = stream::iter(items);
                if hang {
                    Ok(scripted.chain(stream::pending()).boxed())
                } else {
                    Ok(scripted.boxed())
                }
            })
        }
    }

    #[derive(Default)]
    struct CommitLog {
        commits: Mutex<Vec<Vec<Op>>>,
        reject: bool,
    }

    impl TargetStore for CommitLog {
        fn put(&self, _key: String, _value: Vec<u8>) -> crate::target::BoxFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }

        fn commit(&self, ops: Vec<Op>) -> crate::target::BoxFuture<'_, ()> {
            let result = if self.reject {
                Err(StoreError("cluster unavailable".into()))
            } else {
                self.commits.lock().unwrap().push(ops);
                Ok(())
            };
            Box::pin(async move { result })
        }
    }

    struct Harness {
        target: Arc<CommitLog>,
        batcher: TransactionBatcher<CommitLog>,
        mapper: KeyMapper,
        counter: ProgressCounter,
    }

    fn harness(max: usize, mapping: PrefixMapping, target: CommitLog) -> Harness {
        let target = Arc::new(target);
        Harness {
            batcher: TransactionBatcher::new(Arc::clone(&target), max),
            target,
            mapper: KeyMapper::new(mapping),
            counter: ProgressCounter::new(),
        }
    }

    #[test]
    fn test_classify() {
        let mapper = KeyMapper::new(PrefixMapping::new("/a/", "/b/"));

        let put = classify(ChangeEvent::put("/a/1", "v", 3), &mapper).unwrap();
        assert_eq!(put, Op::put("/b/1", "v"));

        let del = classify(ChangeEvent::delete("/a/1", 4), &mapper).unwrap();
        assert_eq!(del, Op::delete("/b/1"));

        let unknown = ChangeEvent {
            kind: EventKind::Other(9),
            ..ChangeEvent::put("/a/1", "v", 5)
        };
        let err = classify(unknown, &mapper).unwrap_err();
        assert!(matches!(err, MirrorError::ProtocolViolation(ref m) if m.contains("9")));
    }

    #[tokio::test]
    async fn test_batching_example() {
        let source = FixedWatch::new(vec![Ok(WatchBatch::new(vec![
            ChangeEvent::put("/a/1", "x", 5),
            ChangeEvent::put("/a/2", "y", 5),
            ChangeEvent::put("/a/3", "z", 6),
        ]))]);
        let mut h = harness(2, PrefixMapping::new("/a/", "/b/"), CommitLog::default());
        let (_tx, mut rx) = watch::channel(false);

        let outcome = run_watch(&source, &mut h.batcher, &h.mapper, &h.counter, "/a/", 41, &mut rx)
            .await
            .unwrap();

        assert_eq!(source.after.load(Ordering::SeqCst), 41);
        assert_eq!(
            *h.target.commits.lock().unwrap(),
            vec![
                vec![Op::put("/b/1", "x"), Op::put("/b/2", "y")],
                vec![Op::put("/b/3", "z")],
            ]
        );
        assert_eq!(h.counter.get(), 3);
        assert_eq!(outcome.events, 3);
        assert_eq!(outcome.transactions, 2);
        assert_eq!(outcome.last_committed_revision, Some(6));
    }

    #[tokio::test]
    async fn test_each_watch_batch_is_flushed() {
        let source = FixedWatch::new(vec![
            Ok(WatchBatch::new(vec![ChangeEvent::put("k1", "a", 2)])),
            Ok(WatchBatch::new(vec![ChangeEvent::delete("k1", 3)])),
        ]);
        let mut h = harness(128, PrefixMapping::identity(""), CommitLog::default());
        let (_tx, mut rx) = watch::channel(false);

        run_watch(&source, &mut h.batcher, &h.mapper, &h.counter, "", 1, &mut rx)
            .await
            .unwrap();

        assert_eq!(
            *h.target.commits.lock().unwrap(),
            vec![vec![Op::put("k1", "a")], vec![Op::delete("k1")]]
        );
    }

    #[tokio::test]
    async fn test_compaction_stops_without_commit() {
        let source = FixedWatch::new(vec![
            Ok(WatchBatch::compacted(30)),
            Ok(WatchBatch::new(vec![ChangeEvent::put("k", "v", 31)])),
        ]);
        let mut h = harness(4, PrefixMapping::identity(""), CommitLog::default());
        let (_tx, mut rx) = watch::channel(false);

        let err = run_watch(&source, &mut h.batcher, &h.mapper, &h.counter, "", 5, &mut rx)
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::Compacted { revision: 30 }));
        assert!(h.target.commits.lock().unwrap().is_empty());
        assert_eq!(h.counter.get(), 0);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_protocol_violation() {
        let bad = ChangeEvent {
            kind: EventKind::Other(42),
            ..ChangeEvent::put("k2", "v", 8)
        };
        let source = FixedWatch::new(vec![
            Ok(WatchBatch::new(vec![ChangeEvent::put("k1", "v", 7)])),
            Ok(WatchBatch::new(vec![bad, ChangeEvent::put("k3", "v", 8)])),
        ]);
        let mut h = harness(4, PrefixMapping::identity(""), CommitLog::default());
        let (_tx, mut rx) = watch::channel(false);

        let err = run_watch(&source, &mut h.batcher, &h.mapper, &h.counter, "", 1, &mut rx)
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::ProtocolViolation(_)));
        assert_eq!(*h.target.commits.lock().unwrap(), vec![vec![Op::put("k1", "v")]]);
        assert_eq!(h.counter.get(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_is_source_error() {
        let source = FixedWatch::new(vec![Err(SourceError("watch canceled".into()))]);
        let mut h = harness(4, PrefixMapping::identity(""), CommitLog::default());
        let (_tx, mut rx) = watch::channel(false);

        let err = run_watch(&source, &mut h.batcher, &h.mapper, &h.counter, "", 1, &mut rx)
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::Source(ref m) if m.contains("watch canceled")));
    }

    #[tokio::test]
    async fn test_commit_failure_propagates() {
        let source = FixedWatch::new(vec![Ok(WatchBatch::new(vec![ChangeEvent::put("k", "v", 3)]))]);
        let target = CommitLog {
            reject: true,
            ..Default::default()
        };
        let mut h = harness(4, PrefixMapping::identity(""), target);
        let (_tx, mut rx) = watch::channel(false);

        let err = run_watch(&source, &mut h.batcher, &h.mapper, &h.counter, "", 1, &mut rx)
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::Commit { ops: 1, .. }));
        // Counted at classification, before the failed commit
        assert_eq!(h.counter.get(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_while_idle() {
        let mut source = FixedWatch::new(vec![Ok(WatchBatch::new(vec![ChangeEvent::put("k", "v", 3)]))]);
        source.hang = true;
        let mut h = harness(4, PrefixMapping::identity(""), CommitLog::default());
        let (tx, mut rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::task::yield_now().await;
            tx.send(true).unwrap();
        });

        let err = run_watch(&source, &mut h.batcher, &h.mapper, &h.counter, "", 1, &mut rx)
            .await
            .unwrap_err();
        stopper.await.unwrap();

        assert!(matches!(err, MirrorError::Shutdown));
        assert_eq!(*h.target.commits.lock().unwrap(), vec![vec![Op::put("k", "v")]]);
    }
}
