// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Keyspace Mirror
//!
//! A live, order-preserving mirror of one revisioned key-value keyspace into
//! another.
//!
//! ## Architecture
//!
//! The mirror engine sits between a change source and a target store, both
//! supplied by the caller:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              keyspace-mirror                              │
//! │                                                                           │
//! │  ┌──────────────┐    ┌──────────────┐    ┌─────────────────────────────┐  │
//! │  │ ChangeSource │───►│  KeyMapper   │───►│ TargetStore                 │  │
//! │  │ snapshot()   │    │ (prefix      │    │ put() per snapshot key      │  │
//! │  │ watch()      │    │  rewrite)    │    │ commit() per transaction    │  │
//! │  └──────────────┘    └──────────────┘    └─────────────────────────────┘  │
//! │         │                   │                          ▲                  │
//! │         ▼                   ▼                          │                  │
//! │  ┌──────────────┐    ┌──────────────────────────┐      │                  │
//! │  │ Progress     │◄───│ TransactionBatcher       │──────┘                  │
//! │  │ (reporter)   │    │ (revision boundary +     │                         │
//! │  └──────────────┘    │  max_txn_ops)            │                         │
//! │                      └──────────────────────────┘                         │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Phases
//!
//! 1. **Snapshot**: when starting from revision 0, every key under the prefix
//!    is copied with a single-key put.
//! 2. **Incremental**: every change after the snapshot (or after the given
//!    start revision) is committed in atomic transactions that never mix
//!    revisions and never exceed `max_txn_ops` operations.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyspace_mirror::{MemoryKeyspace, MirrorConfig, MirrorEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = Arc::new(MemoryKeyspace::new());
//!     let target = Arc::new(MemoryKeyspace::new());
//!
//!     let config = MirrorConfig {
//!         prefix: "/app/".into(),
//!         dest_prefix: Some("/app-mirror/".into()),
//!         ..MirrorConfig::for_testing("memory")
//!     };
//!
//!     let mut engine = MirrorEngine::new(config, source, target);
//!     let shutdown = engine.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.shutdown();
//!     });
//!
//!     match engine.run().await {
//!         Ok(report) => println!("mirrored {} operations", report.total),
//!         Err(e) => eprintln!("mirror stopped: {e}"),
//!     }
//! }
//! ```

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod key_mapper;
pub mod memory;
pub mod metrics;
pub mod progress;
pub mod resilience;
pub mod source;
pub mod target;

// Re-exports for convenience
pub use batch::{BatchStats, CommitResult, TransactionBatcher};
pub use config::{AuthConfig, DestinationConfig, MirrorConfig, RetrySettings, TlsConfig};
pub use coordinator::{MirrorEngine, MirrorPhase, MirrorReport, ShutdownHandle};
pub use error::{MirrorError, Result};
pub use key_mapper::{KeyMapper, PrefixMapping};
pub use memory::MemoryKeyspace;
pub use progress::{ProgressCounter, ProgressReporter, ProgressSink, StdoutProgress};
pub use resilience::{RetryConfig, RetryingTarget};
pub use source::{
    ChangeEvent, ChangeSource, EventKind, KeyValue, Revision, Snapshot, SnapshotChunk, WatchBatch,
};
pub use target::{NoOpTarget, Op, StoreError, TargetStore};
