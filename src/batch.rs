// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transaction batcher for watch events.
//!
//! Groups mapped operations into atomic, size-bounded transactions without
//! splitting a source revision unless the size limit forces it.
//!
//! # Design
//!
//! ```text
//! Op + revision ──▶ TransactionBatcher ──┬──▶ revision > group revision?
//!                                        │        commit group first
//!                   Vec<Op> (ordered)    │
//!                                        ├──▶ push op
//!                                        │
//!                                        └──▶ len == max_txn_ops?
//!                                                 commit now
//! ```
//!
//! Revisions arrive in non-decreasing order, so the group's revision is the
//! revision of its first member. A revision carrying more than
//! `max_txn_ops` events is split across consecutive transactions; the split
//! is logged and counted but never reordered.

use crate::error::{MirrorError, Result};
use crate::metrics;
use crate::source::Revision;
use crate::target::{Op, TargetStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of one committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitResult {
    /// Operations in the transaction.
    pub ops: usize,
    /// Source revision of the group.
    pub revision: Revision,
}

/// Running totals for a batcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub transactions: u64,
    pub ops_committed: u64,
    /// Revisions split across transactions by the size limit.
    pub revision_splits: u64,
    pub last_committed_revision: Option<Revision>,
}

/// Accumulates operations and commits them to the target store.
pub struct TransactionBatcher<T: TargetStore> {
    target: Arc<T>,
    max_txn_ops: usize,
    group: Vec<Op>,
    group_revision: Revision,
    /// Revision whose group was last committed because it hit the size limit.
    size_flushed: Option<Revision>,
    stats: BatchStats,
}

impl<T: TargetStore> TransactionBatcher<T> {
    /// Create a batcher. A limit of zero is treated as one.
    pub fn new(target: Arc<T>, max_txn_ops: usize) -> Self {
        let max_txn_ops = max_txn_ops.max(1);
        Self {
            target,
            max_txn_ops,
            group: Vec::with_capacity(max_txn_ops),
            group_revision: 0,
            size_flushed: None,
            stats: BatchStats::default(),
        }
    }

    /// Add an operation observed at `revision`.
    ///
    /// Returns the transaction committed by this call, if any.
    pub async fn append(&mut self, op: Op, revision: Revision) -> Result<Option<CommitResult>> {
        let mut committed = None;

        if !self.group.is_empty() && revision > self.group_revision {
            committed = Some(self.commit().await?);
        }

        if self.group.is_empty() {
            if self.size_flushed == Some(revision) {
                self.stats.revision_splits += 1;
                metrics::record_revision_split();
                warn!(
                    revision,
                    max_txn_ops = self.max_txn_ops,
                    "Revision exceeds max_txn_ops, splitting across transactions"
                );
            }
            self.group_revision = revision;
        }
        self.group.push(op);

        if self.group.len() >= self.max_txn_ops {
            let result = self.commit().await?;
            self.size_flushed = Some(result.revision);
            committed = Some(result);
        }

        Ok(committed)
    }

    /// Commit the pending group, if any.
    pub async fn flush(&mut self) -> Result<Option<CommitResult>> {
        if self.group.is_empty() {
            return Ok(None);
        }
        self.commit().await.map(Some)
    }

    /// Commit whatever remains once the change stream has ended.
    pub async fn flush_final(&mut self) -> Result<Option<CommitResult>> {
        let result = self.flush().await?;
        self.size_flushed = None;
        Ok(result)
    }

    /// Pending operations.
    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    pub fn max_txn_ops(&self) -> usize {
        self.max_txn_ops
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    async fn commit(&mut self) -> Result<CommitResult> {
        let ops = std::mem::replace(&mut self.group, Vec::with_capacity(self.max_txn_ops));
        let count = ops.len();
        let revision = self.group_revision;
        let start = Instant::now();

        if let Err(e) = self.target.commit(ops).await {
            metrics::record_txn_failure(count);
            return Err(MirrorError::Commit {
                ops: count,
                message: e.to_string(),
            });
        }

        let elapsed = start.elapsed();
        self.stats.transactions += 1;
        self.stats.ops_committed += count as u64;
        self.stats.last_committed_revision = Some(revision);
        metrics::record_txn_commit(count, elapsed);
        metrics::set_last_committed_revision(revision);

        debug!(
            ops = count,
            revision,
            duration_ms = elapsed.as_millis() as u64,
            "Transaction committed"
        );

        Ok(CommitResult { ops: count, revision })
    }
}
