//! Mock TargetStore for testing.
//!
//! Records every put() and commit() for assertions.
//! Configurable failures to exercise the fail-fast and retry paths.

use keyspace_mirror::target::{BoxFuture, Op, StoreError, TargetStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Mock implementation of TargetStore that records all calls.
///
/// # Example
/// ```rust,ignore
/// let target = RecordingTarget::new();
/// target.fail_commits_after(2);
///
/// // Use in tests...
///
/// let commits = target.commits().await;
/// assert_eq!(commits.len(), 2);
/// ```
pub struct RecordingTarget {
    /// Recorded put() calls (key, value)
    puts: RwLock<Vec<(String, Vec<u8>)>>,
    /// Recorded commit() calls
    commits: RwLock<Vec<Vec<Op>>>,
    /// Fail every put after N successful ones
    fail_puts_after: AtomicUsize,
    /// Fail every commit after N successful ones
    fail_commits_after: AtomicUsize,
    /// Fail the next N commit attempts, then recover
    transient_commit_failures: AtomicUsize,
    /// Never resolve put() / commit() calls
    hang_puts: AtomicBool,
    hang_commits: AtomicBool,
    put_count: AtomicUsize,
    commit_count: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingTarget {
    /// Create a mock that accepts everything.
    pub fn new() -> Self {
        Self {
            puts: RwLock::new(Vec::new()),
            commits: RwLock::new(Vec::new()),
            fail_puts_after: AtomicUsize::new(usize::MAX),
            fail_commits_after: AtomicUsize::new(usize::MAX),
            transient_commit_failures: AtomicUsize::new(0),
            hang_puts: AtomicBool::new(false),
            hang_commits: AtomicBool::new(false),
            put_count: AtomicUsize::new(0),
            commit_count: AtomicUsize::new(0),
        }
    }

    /// Configure put() to fail after N successful calls.
    pub fn fail_puts_after(&self, n: usize) {
        self.fail_puts_after.store(n, Ordering::SeqCst);
    }

    /// Configure commit() to fail after N successful calls.
    pub fn fail_commits_after(&self, n: usize) {
        self.fail_commits_after.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` commit attempts, then accept again.
    pub fn fail_next_commits(&self, n: usize) {
        self.transient_commit_failures.store(n, Ordering::SeqCst);
    }

    /// Make every later put() wait forever, like an unresponsive cluster.
    pub fn hang_puts(&self) {
        self.hang_puts.store(true, Ordering::SeqCst);
    }

    /// Make every later commit() wait forever.
    pub fn hang_commits(&self) {
        self.hang_commits.store(true, Ordering::SeqCst);
    }

    /// Total put attempts, including failed and hung ones.
    pub fn put_attempts(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Get all recorded put() calls.
    pub async fn puts(&self) -> Vec<(String, Vec<u8>)> {
        self.puts.read().await.clone()
    }

    /// Get all recorded commit() calls.
    pub async fn commits(&self) -> Vec<Vec<Op>> {
        self.commits.read().await.clone()
    }

    /// Sizes of the recorded transactions, in order.
    pub async fn commit_sizes(&self) -> Vec<usize> {
        self.commits.read().await.iter().map(Vec::len).collect()
    }

    /// Keys of every committed operation, in order.
    pub async fn committed_keys(&self) -> Vec<String> {
        self.commits
            .read()
            .await
            .iter()
            .flatten()
            .map(|op| op.key().to_string())
            .collect()
    }

    /// Total commit attempts, including failed ones.
    pub fn commit_attempts(&self) -> usize {
        self.commit_count.load(Ordering::SeqCst)
    }
}

impl Default for RecordingTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetStore for RecordingTarget {
    fn put(&self, key: String, value: Vec<u8>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let count = self.put_count.fetch_add(1, Ordering::SeqCst);
            if self.hang_puts.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            if count >= self.fail_puts_after.load(Ordering::SeqCst) {
                return Err(StoreError(format!("Simulated put failure on {}", key)));
            }

            self.puts.write().await.push((key, value));
            Ok(())
        })
    }

    fn commit(&self, ops: Vec<Op>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.commit_count.fetch_add(1, Ordering::SeqCst);
            if self.hang_commits.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }

            let transient = self.transient_commit_failures.load(Ordering::SeqCst);
            if transient > 0 {
                self.transient_commit_failures.store(transient - 1, Ordering::SeqCst);
                return Err(StoreError("Simulated transient commit failure".to_string()));
            }

            let mut commits = self.commits.write().await;
            if commits.len() >= self.fail_commits_after.load(Ordering::SeqCst) {
                return Err(StoreError("Simulated commit failure".to_string()));
            }
            commits.push(ops);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let target = RecordingTarget::new();

        target.put("k".into(), b"v".to_vec()).await.unwrap();
        target.commit(vec![Op::delete("k")]).await.unwrap();

        assert_eq!(target.puts().await, vec![("k".to_string(), b"v".to_vec())]);
        assert_eq!(target.commits().await, vec![vec![Op::delete("k")]]);
    }

    #[tokio::test]
    async fn test_mock_fail_after() {
        let target = RecordingTarget::new();
        target.fail_puts_after(1);

        assert!(target.put("a".into(), vec![]).await.is_ok());
        assert!(target.put("b".into(), vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_transient_commit_failures() {
        let target = RecordingTarget::new();
        target.fail_next_commits(1);

        assert!(target.commit(vec![]).await.is_err());
        assert!(target.commit(vec![]).await.is_ok());
        assert_eq!(target.commit_attempts(), 2);
    }

    #[tokio::test]
    async fn test_mock_hang_commits() {
        let target = RecordingTarget::new();
        target.hang_commits();

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            target.commit(vec![Op::delete("k")]),
        )
        .await;
        assert!(pending.is_err());
        assert_eq!(target.commit_attempts(), 1);
        assert!(target.commits().await.is_empty());
    }
}
