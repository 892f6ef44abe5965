// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the mirror engine.
//!
//! Every error that reaches [`MirrorEngine::run`](crate::MirrorEngine::run)
//! terminates the run. Errors are categorized by where they were raised so
//! the caller can report them, but none of them are retried by the core.
//!
//! # Error Categories
//!
//! | Error Type | Raised by | Description |
//! |------------|-----------|-------------|
//! | `Config` | config validation | Conflicting or missing settings, detected before the run |
//! | `Compacted` | watch path | Source history needed by the run was compacted away |
//! | `Write` | snapshot path | Target rejected a single-key put |
//! | `Commit` | transaction batcher | Target rejected an atomic transaction |
//! | `ProtocolViolation` | watch path | Change source sent an event kind we do not understand |
//! | `Source` | snapshot / watch path | Change source failed or reported a terminal error |
//! | `InvalidState` | engine | `run()` called on an engine that already ran |
//! | `Shutdown` | any blocking wait | Cancellation was requested |
//!
//! # Retry Behavior
//!
//! [`MirrorError::is_retryable()`] is `false` for every variant. Compaction
//! cannot be recovered without a fresh full resync, and a failed write leaves
//! earlier commits applied, so the operator restarts the run (optionally from
//! a later revision) after investigating. Bounded re-attempts of target calls
//! are only available through the opt-in
//! [`RetryingTarget`](crate::resilience::RetryingTarget) layer.

use crate::source::Revision;
use thiserror::Error;

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors that terminate a mirror run.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Invalid or conflicting configuration.
    ///
    /// Detected before any call to the change source or target store.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source compacted history this run still needed.
    ///
    /// Not retryable - the intervening revisions are gone. Restart with a
    /// full resync (start revision 0).
    #[error("Source compacted: required revision has been compacted (compact revision {revision})")]
    Compacted { revision: Revision },

    /// Target store rejected a single-key put during the snapshot phase.
    #[error("Write error ({key}): {message}")]
    Write { key: String, message: String },

    /// Target store rejected an atomic transaction.
    ///
    /// Transactions committed before this one stay applied.
    #[error("Commit error ({ops} ops): {message}")]
    Commit { ops: usize, message: String },

    /// The change source violated its contract (e.g. unknown event kind).
    #[error("Protocol contract violated: {0}")]
    ProtocolViolation(String),

    /// The change source failed or reported a terminal error.
    #[error("Change source error: {0}")]
    Source(String),

    /// Engine state machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Cancellation was requested while the run was waiting.
    #[error("Shutdown in progress")]
    Shutdown,
}

impl MirrorError {
    /// Check if this error is retryable.
    ///
    /// Always `false`: the core never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Compacted { .. } => false,
            Self::Write { .. } => false,
            Self::Commit { .. } => false,
            Self::ProtocolViolation(_) => false,
            Self::Source(_) => false,
            Self::InvalidState { .. } => false,
            Self::Shutdown => false,
        }
    }

    /// Short machine-friendly label, used as the `error_type` metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Compacted { .. } => "compacted",
            Self::Write { .. } => "write",
            Self::Commit { .. } => "commit",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::Source(_) => "source",
            Self::InvalidState { .. } => "invalid_state",
            Self::Shutdown => "shutdown",
        }
    }
}

impl From<crate::source::SourceError> for MirrorError {
    fn from(e: crate::source::SourceError) -> Self {
        Self::Source(e.to_string())
    }
}
