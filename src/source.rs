// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change source interface.
//!
//! The change source is the collaborator that owns the source keyspace. It
//! offers two operations:
//!
//! - [`ChangeSource::snapshot`]: the current contents under a prefix, as a
//!   pull-based stream of [`SnapshotChunk`]s. An `Err` item is the single
//!   terminal error signal.
//! - [`ChangeSource::watch`]: an ordered stream of [`WatchBatch`]es carrying
//!   every change after a given revision. A batch may instead report that the
//!   requested history was compacted.
//!
//! # Ordering Contract
//!
//! Events arrive in non-decreasing revision order. Events sharing a revision
//! are the result of one atomic update at the source and are delivered in the
//! same watch batch.
//!
//! # Example
//!
//! ```rust,no_run
//! use keyspace_mirror::source::{BoxFuture, ChangeSource, Snapshot, WatchStream, Revision};
//!
//! struct MySource { /* ... */ }
//!
//! impl ChangeSource for MySource {
//!     fn snapshot(&self, _prefix: &str) -> BoxFuture<'_, Snapshot> {
//!         Box::pin(async move { Ok(Snapshot::from_chunks(1, Vec::new())) })
//!     }
//!
//!     fn watch(&self, _prefix: &str, _after: Revision) -> BoxFuture<'_, WatchStream> {
//!         Box::pin(async move {
//!             let stream: WatchStream = Box::pin(futures::stream::empty());
//!             Ok(stream)
//!         })
//!     }
//! }
//! ```

use futures::stream::{self, BoxStream};
use std::future::Future;
use std::pin::Pin;

/// Logical timestamp in the source keyspace's change history.
///
/// `0` means "from the beginning".
pub type Revision = i64;

/// Result type for change source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Type alias for boxed async futures returned by [`ChangeSource`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = SourceResult<T>> + Send + 'a>>;

/// Stream of snapshot chunks. An `Err` item ends the snapshot.
pub type SnapshotStream = BoxStream<'static, SourceResult<SnapshotChunk>>;

/// Stream of watch batches. Ends when the source closes the watch.
pub type WatchStream = BoxStream<'static, SourceResult<WatchBatch>>;

/// Simplified error for change source operations.
#[derive(Debug, Clone)]
pub struct SourceError(pub String);

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SourceError {}

/// Kind of a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
    /// A kind code this crate does not understand.
    ///
    /// Receiving one means the source broke its contract.
    Other(i32),
}

impl EventKind {
    /// Map a numeric wire code (`0` = PUT, `1` = DELETE) to a kind.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => EventKind::Put,
            1 => EventKind::Delete,
            other => EventKind::Other(other),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Put => write!(f, "PUT"),
            EventKind::Delete => write!(f, "DELETE"),
            EventKind::Other(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// A single change observed at the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Source key (always under the watched prefix).
    pub key: String,
    /// New value. Empty for deletes.
    pub value: Vec<u8>,
    /// Revision that produced this change.
    pub revision: Revision,
    /// Operation kind.
    pub kind: EventKind,
}

impl ChangeEvent {
    /// Build a PUT event.
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>, revision: Revision) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            revision,
            kind: EventKind::Put,
        }
    }

    /// Build a DELETE event.
    pub fn delete(key: impl Into<String>, revision: Revision) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            revision,
            kind: EventKind::Delete,
        }
    }

    /// Check if this is a PUT operation.
    pub fn is_put(&self) -> bool {
        self.kind == EventKind::Put
    }

    /// Check if this is a DELETE operation.
    pub fn is_delete(&self) -> bool {
        self.kind == EventKind::Delete
    }
}

/// A key-value pair from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A bounded set of key-value pairs from the initial snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotChunk {
    pub pairs: Vec<KeyValue>,
}

impl SnapshotChunk {
    pub fn new(pairs: Vec<KeyValue>) -> Self {
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Point-in-time contents of the mirrored prefix.
pub struct Snapshot {
    /// Revision the snapshot reflects. The watch phase continues after it.
    pub revision: Revision,
    /// Snapshot contents.
    pub chunks: SnapshotStream,
}

impl Snapshot {
    /// Build a snapshot from chunks that are already in memory.
    pub fn from_chunks(revision: Revision, chunks: Vec<SnapshotChunk>) -> Self {
        Self {
            revision,
            chunks: Box::pin(stream::iter(chunks.into_iter().map(Ok))),
        }
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

/// One response from the watch stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchBatch {
    /// Events in arrival order.
    pub events: Vec<ChangeEvent>,
    /// Set (non-zero) when the requested history has been compacted.
    pub compact_revision: Option<Revision>,
}

impl WatchBatch {
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self {
            events,
            compact_revision: None,
        }
    }

    /// A batch reporting that history up to `revision` was compacted.
    pub fn compacted(revision: Revision) -> Self {
        Self {
            events: Vec::new(),
            compact_revision: Some(revision),
        }
    }

    /// The compact revision, if this batch signals compaction.
    ///
    /// A compact revision of `0` means "not compacted".
    pub fn compaction(&self) -> Option<Revision> {
        self.compact_revision.filter(|rev| *rev != 0)
    }
}

/// Interface the mirror needs from the source keyspace.
///
/// Implementations own transport and authentication; the mirror only sees
/// the streams.
pub trait ChangeSource: Send + Sync + 'static {
    /// Take a snapshot of every key under `prefix`.
    ///
    /// The snapshot revision must be at least 1, even for an empty keyspace:
    /// the mirror watches after it, and `0` would mean "from now on".
    fn snapshot(&self, prefix: &str) -> BoxFuture<'_, Snapshot>;

    /// Watch every change under `prefix` with revision strictly greater than
    /// `after_revision`.
    ///
    /// `after_revision == 0` watches from the source's current revision on.
    /// If `after_revision` is older than the source's compaction point, the
    /// stream yields a batch whose [`WatchBatch::compaction`] is set.
    fn watch(&self, prefix: &str, after_revision: Revision) -> BoxFuture<'_, WatchStream>;
}
