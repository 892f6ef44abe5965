// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mirror run state types.
//!
//! # Phase Transitions
//!
//! ```text
//!            run()
//! Created ──────────┬──────────────→ Snapshot
//!                   │                   │
//!                   │ (start revision   │ (all chunks applied)
//!                   │  given)           ↓
//!                   └──────────────→ Incremental
//!                                       │
//!                     (source closed)   │   (fatal error or shutdown)
//!                   ┌───────────────────┴───────────────────┐
//!                   ↓                                       ↓
//!                 Done                                   Aborted
//! ```
//!
//! A failure during `Snapshot` also moves the run to `Aborted`.

use crate::source::Revision;

/// Phase of a mirror run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPhase {
    /// Engine created but not started.
    ///
    /// Call [`run()`](super::MirrorEngine::run) to begin mirroring.
    Created,

    /// Replaying the initial snapshot, one put per key.
    Snapshot,

    /// Consuming the change stream and committing transactions.
    Incremental,

    /// The source closed the change stream and every pending group was
    /// committed.
    Done,

    /// The run ended with an error or was cancelled.
    ///
    /// Transactions committed before the failure stay applied.
    Aborted,
}

impl MirrorPhase {
    /// Whether the run is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MirrorPhase::Done | MirrorPhase::Aborted)
    }
}

impl std::fmt::Display for MirrorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MirrorPhase::Created => write!(f, "Created"),
            MirrorPhase::Snapshot => write!(f, "Snapshot"),
            MirrorPhase::Incremental => write!(f, "Incremental"),
            MirrorPhase::Done => write!(f, "Done"),
            MirrorPhase::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Summary of a completed run.
///
/// `last_committed_revision` is the revision to restart from (plus one) if
/// the caller wants to resume without a full resync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Keys written during the snapshot phase.
    pub snapshot_keys: u64,
    /// Watch events classified and handed to the batcher.
    pub events_applied: u64,
    /// Transactions committed during the incremental phase.
    pub transactions: u64,
    /// Final value of the progress counter.
    pub total: u64,
    /// Revision of the last committed transaction, if any.
    pub last_committed_revision: Option<Revision>,
}
