//! Scripted ChangeSource for testing.
//!
//! Replays a fixed snapshot and a fixed sequence of watch items, and records
//! which revision the watch was opened after.

use futures::stream::{self, StreamExt};
use keyspace_mirror::source::{
    BoxFuture, ChangeEvent, ChangeSource, KeyValue, Revision, Snapshot, SnapshotChunk, SourceError,
    SourceResult, WatchBatch, WatchStream,
};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Deterministic change source.
pub struct ScriptedSource {
    snapshot_revision: Revision,
    snapshot_items: Mutex<Vec<SourceResult<SnapshotChunk>>>,
    watch_items: Mutex<Vec<SourceResult<WatchBatch>>>,
    /// Keep the watch open after the scripted items instead of closing it
    hold_open: bool,
    snapshot_calls: AtomicUsize,
    watch_calls: AtomicUsize,
    watched_after: AtomicI64,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            snapshot_revision: 0,
            snapshot_items: Mutex::new(Vec::new()),
            watch_items: Mutex::new(Vec::new()),
            hold_open: false,
            snapshot_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
            watched_after: AtomicI64::new(-1),
        }
    }

    /// Snapshot at `revision` with the given chunks.
    pub fn with_snapshot(mut self, revision: Revision, chunks: Vec<SnapshotChunk>) -> Self {
        self.snapshot_revision = revision;
        self.snapshot_items = Mutex::new(chunks.into_iter().map(Ok).collect());
        self
    }

    /// Append a terminal error to the snapshot stream.
    pub fn with_snapshot_error(self, message: &str) -> Self {
        self.snapshot_items
            .lock()
            .unwrap()
            .push(Err(SourceError(message.to_string())));
        self
    }

    /// Append a watch batch.
    pub fn with_batch(self, events: Vec<ChangeEvent>) -> Self {
        self.watch_items.lock().unwrap().push(Ok(WatchBatch::new(events)));
        self
    }

    /// Append a compaction signal.
    pub fn with_compaction(self, revision: Revision) -> Self {
        self.watch_items
            .lock()
            .unwrap()
            .push(Ok(WatchBatch::compacted(revision)));
        self
    }

    /// Append a watch stream error.
    pub fn with_watch_error(self, message: &str) -> Self {
        self.watch_items
            .lock()
            .unwrap()
            .push(Err(SourceError(message.to_string())));
        self
    }

    /// Keep the watch stream open (idle) after the scripted items.
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Revision passed to the last watch() call, or -1 if never called.
    pub fn watched_after(&self) -> Revision {
        self.watched_after.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSource for ScriptedSource {
    fn snapshot(&self, _prefix: &str) -> BoxFuture<'_, Snapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let items = std::mem::take(&mut *self.snapshot_items.lock().unwrap());
        let revision = self.snapshot_revision;
        Box::pin(async move {
            Ok(Snapshot {
                revision,
                chunks: stream::iter(items).boxed(),
            })
        })
    }

    fn watch(&self, _prefix: &str, after_revision: Revision) -> BoxFuture<'_, WatchStream> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        self.watched_after.store(after_revision, Ordering::SeqCst);
        let items = std::mem::take(&mut *self.watch_items.lock().unwrap());
        let hold_open = self.hold_open;
        Box::pin(async move {
            let scripted = stream::iter(items);
            if hold_open {
                Ok(scripted.chain(stream::pending()).boxed())
            } else {
                Ok(scripted.boxed())
            }
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Snapshot chunk from `(key, value)` pairs.
#[allow(dead_code)]
pub fn chunk(pairs: &[(&str, &str)]) -> SnapshotChunk {
    SnapshotChunk::new(pairs.iter().map(|(k, v)| KeyValue::new(*k, *v)).collect())
}

/// PUT event.
#[allow(dead_code)]
pub fn put(key: &str, value: &str, revision: Revision) -> ChangeEvent {
    ChangeEvent::put(key, value, revision)
}

/// DELETE event.
#[allow(dead_code)]
pub fn del(key: &str, revision: Revision) -> ChangeEvent {
    ChangeEvent::delete(key, revision)
}
