// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory revisioned keyspace.
//!
//! [`MemoryKeyspace`] keeps a sorted map of keys, a global revision counter
//! and the history of every change. It implements both [`ChangeSource`] and
//! [`TargetStore`], so two instances can be mirrored into each other without
//! any external service.
//!
//! # Revisions and Compaction
//!
//! An empty keyspace is at revision [`INITIAL_REVISION`], so a snapshot
//! never reports revision `0` (which a watch reads as "from now").
//! Every write that changes at least one key creates exactly one new
//! revision; all events of a [`txn`](MemoryKeyspace::txn) share it.
//! [`compact(rev)`](MemoryKeyspace::compact) discards history at and below
//! `rev`. A watch that needs an event from the discarded range receives a
//! compaction batch instead.
//!
//! # Watching
//!
//! A watch first replays retained history after the requested revision as a
//! single batch, then follows live writes (one batch per revision) until
//! [`close()`](MemoryKeyspace::close) is called.

use crate::source::{
    BoxFuture as SourceFuture, ChangeEvent, ChangeSource, KeyValue, Revision, Snapshot,
    SnapshotChunk, SourceError, WatchBatch, WatchStream,
};
use crate::target::{BoxFuture as StoreFuture, Op, StoreError, TargetStore};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum pairs per snapshot chunk.
pub const SNAPSHOT_CHUNK_SIZE: usize = 1000;

/// Revision of an empty keyspace. The first write creates revision 2.
pub const INITIAL_REVISION: Revision = 1;

/// Live notices buffered per watcher before it lags.
const WATCH_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Notice {
    Changes(Arc<Vec<ChangeEvent>>),
    Closed,
}

#[derive(Debug)]
struct State {
    revision: Revision,
    compact_revision: Revision,
    data: BTreeMap<String, Vec<u8>>,
    history: Vec<ChangeEvent>,
    closed: bool,
}

/// Revisioned key-value store held in memory.
pub struct MemoryKeyspace {
    state: Mutex<State>,
    notices: broadcast::Sender<Notice>,
}

impl Default for MemoryKeyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKeyspace {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State {
                revision: INITIAL_REVISION,
                compact_revision: 0,
                data: BTreeMap::new(),
                history: Vec::new(),
                closed: false,
            }),
            notices,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert one key. Returns the new revision.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Revision {
        self.txn(vec![Op::put(key, value)])
    }

    /// Delete one key. Deleting a missing key does not create a revision.
    pub fn delete(&self, key: impl Into<String>) -> Revision {
        self.txn(vec![Op::delete(key)])
    }

    /// Apply `ops` atomically at one new revision.
    ///
    /// Returns the revision after the call. Deletes of missing keys produce
    /// no event; a call without any effect leaves the revision unchanged.
    pub fn txn(&self, ops: Vec<Op>) -> Revision {
        let mut state = self.state();
        let revision = state.revision + 1;
        let mut events = Vec::with_capacity(ops.len());

        for op in ops {
            match op {
                Op::Put { key, value } => {
                    state.data.insert(key.clone(), value.clone());
                    events.push(ChangeEvent::put(key, value, revision));
                }
                Op::Delete { key } => {
                    if state.data.remove(&key).is_some() {
                        events.push(ChangeEvent::delete(key, revision));
                    }
                }
            }
        }

        if events.is_empty() {
            return state.revision;
        }

        state.revision = revision;
        state.history.extend(events.iter().cloned());
        // Sent under the lock so watchers see revisions in order
        let _ = self.notices.send(Notice::Changes(Arc::new(events)));
        revision
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state().data.get(key).cloned()
    }

    /// Every pair whose key starts with `prefix`, in key order.
    pub fn range(&self, prefix: &str) -> Vec<KeyValue> {
        Self::range_locked(&self.state(), prefix)
    }

    fn range_locked(state: &State, prefix: &str) -> Vec<KeyValue> {
        state
            .data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect()
    }

    /// Current revision ([`INITIAL_REVISION`] before the first write).
    pub fn revision(&self) -> Revision {
        self.state().revision
    }

    pub fn compact_revision(&self) -> Revision {
        self.state().compact_revision
    }

    pub fn len(&self) -> usize {
        self.state().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().data.is_empty()
    }

    /// Discard history at and below `revision` (clamped to the current
    /// revision).
    pub fn compact(&self, revision: Revision) {
        let mut state = self.state();
        let revision = revision.min(state.revision);
        if revision <= state.compact_revision {
            return;
        }
        state.compact_revision = revision;
        state.history.retain(|e| e.revision > revision);
        debug!(revision, "Memory keyspace compacted");
    }

    /// End every watch stream. Later writes through the [`TargetStore`]
    /// interface are rejected.
    pub fn close(&self) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.closed = true;
        let _ = self.notices.send(Notice::Closed);
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn snapshot_now(&self, prefix: &str) -> Snapshot {
        let state = self.state();
        let revision = state.revision;
        let mut pairs = Self::range_locked(&state, prefix).into_iter().peekable();
        drop(state);

        let mut chunks = Vec::new();
        while pairs.peek().is_some() {
            chunks.push(SnapshotChunk::new(
                pairs.by_ref().take(SNAPSHOT_CHUNK_SIZE).collect(),
            ));
        }
        Snapshot::from_chunks(revision, chunks)
    }

    fn watch_now(&self, prefix: &str, after_revision: Revision) -> WatchStream {
        let state = self.state();

        if after_revision > 0 && after_revision < state.compact_revision {
            return stream::iter(vec![Ok(WatchBatch::compacted(state.compact_revision))]).boxed();
        }

        let replay: Vec<ChangeEvent> = if after_revision > 0 {
            state
                .history
                .iter()
                .filter(|e| e.revision > after_revision && e.key.starts_with(prefix))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let closed = state.closed;
        // Subscribe before releasing the lock so no write falls in between
        let receiver = self.notices.subscribe();
        drop(state);

        let replay = if replay.is_empty() {
            Vec::new()
        } else {
            vec![Ok(WatchBatch::new(replay))]
        };
        let history = stream::iter(replay);

        if closed {
            return history.boxed();
        }
        history.chain(live_stream(receiver, prefix.to_string())).boxed()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError("keyspace closed".to_string()));
        }
        Ok(())
    }
}

/// Follow live notices, keeping events under `prefix`.
fn live_stream(receiver: broadcast::Receiver<Notice>, prefix: String) -> WatchStream {
    stream::unfold((receiver, prefix), |(mut receiver, prefix)| async move {
        loop {
            match receiver.recv().await {
                Ok(Notice::Changes(events)) => {
                    let matching: Vec<ChangeEvent> = events
                        .iter()
                        .filter(|e| e.key.starts_with(&prefix))
                        .cloned()
                        .collect();
                    if matching.is_empty() {
                        continue;
                    }
                    return Some((Ok(WatchBatch::new(matching)), (receiver, prefix)));
                }
                Ok(Notice::Closed) | Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    let err = SourceError(format!("watch lagged behind by {} notices", missed));
                    return Some((Err(err), (receiver, prefix)));
                }
            }
        }
    })
    .boxed()
}

impl ChangeSource for MemoryKeyspace {
    fn snapshot(&self, prefix: &str) -> SourceFuture<'_, Snapshot> {
        let snapshot = self.snapshot_now(prefix);
        Box::pin(async move { Ok(snapshot) })
    }

    fn watch(&self, prefix: &str, after_revision: Revision) -> SourceFuture<'_, WatchStream> {
        let stream = self.watch_now(prefix, after_revision);
        Box::pin(async move { Ok(stream) })
    }
}

impl TargetStore for MemoryKeyspace {
    fn put(&self, key: String, value: Vec<u8>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.ensure_open()?;
            MemoryKeyspace::put(self, key, value);
            Ok(())
        })
    }

    fn commit(&self, ops: Vec<Op>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.ensure_open()?;
            self.txn(ops);
            Ok(())
        })
    }
}
