// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Target store interface.
//!
//! Defines what the mirror needs from the destination keyspace: a single-key
//! upsert (used while replaying the snapshot) and an atomic, ordered
//! multi-operation commit (used for watched changes).
//!
//! # Example
//!
//! ```rust,no_run
//! use keyspace_mirror::target::{BoxFuture, Op, TargetStore};
//!
//! struct MyBackend { /* ... */ }
//!
//! impl TargetStore for MyBackend {
//!     fn put(&self, _key: String, _value: Vec<u8>) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn commit(&self, _ops: Vec<Op>) -> BoxFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

/// Result type for target store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Simplified error for target store operations.
#[derive(Debug, Clone)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// A pending write against a destination key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl Op {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Op::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Op::Delete { key: key.into() }
    }

    /// Destination key this operation targets.
    pub fn key(&self) -> &str {
        match self {
            Op::Put { key, .. } => key,
            Op::Delete { key } => key,
        }
    }

    pub fn is_put(&self) -> bool {
        matches!(self, Op::Put { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Op::Delete { .. })
    }
}

/// Trait defining what we need from the destination keyspace.
///
/// The caller provides an implementation that owns transport, TLS and
/// authentication. This keeps the mirror testable without a live cluster.
pub trait TargetStore: Send + Sync + 'static {
    /// Upsert a single key.
    fn put(&self, key: String, value: Vec<u8>) -> BoxFuture<'_, ()>;

    /// Apply `ops` atomically, in order.
    ///
    /// Either every operation is applied or none is.
    fn commit(&self, ops: Vec<Op>) -> BoxFuture<'_, ()>;
}

/// A no-op implementation for dry runs.
///
/// Logs operations but doesn't actually store anything.
#[derive(Clone)]
pub struct NoOpTarget;

impl TargetStore for NoOpTarget {
    fn put(&self, key: String, value: Vec<u8>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            tracing::debug!(key = %key, len = value.len(), "NoOp: would put key");
            Ok(())
        })
    }

    fn commit(&self, ops: Vec<Op>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            tracing::debug!(ops = ops.len(), "NoOp: would commit transaction");
            Ok(())
        })
    }
}
