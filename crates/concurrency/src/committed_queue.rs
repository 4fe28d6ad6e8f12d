//! The committed queue and the retirement sweep it feeds.
//!
//! Implemented as a `parking_lot::RwLock`-guarded `VecDeque` rather than a
//! hand-rolled lock-free structure: the refcount scheme is already simple
//! and correct, and a `removeIf`-capable lock-free queue is not something
//! worth the unsafe code it would take. The `RwLock` gives the same
//! external contract — weakly-consistent traversal, selective removal
//! from the front — without it.

use crate::transaction::ReadWriteTxn;
use dirtx_core::Lsn;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Concurrent FIFO of committed read-write transactions, ordered by
/// commit LSN.
#[derive(Default)]
pub struct CommittedQueue {
    inner: RwLock<VecDeque<Arc<ReadWriteTxn>>>,
}

impl CommittedQueue {
    /// An empty queue.
    pub fn new() -> Self {
        CommittedQueue {
            inner: RwLock::new(VecDeque::new()),
        }
    }

    /// Append a freshly-committed transaction at the tail.
    ///
    /// Callers must guarantee commit-LSN monotonicity externally — in practice, by holding `writeTxnsLock` across the WAL
    /// append and this call.
    pub fn enqueue(&self, txn: Arc<ReadWriteTxn>) {
        debug_assert!(txn.commit_lsn().is_some(), "only committed txns may be enqueued");
        self.inner.write().push_back(txn);
    }

    /// Weakly-consistent snapshot of every element currently enqueued, in
    /// ascending commit-LSN order.
    pub fn snapshot_all(&self) -> Vec<Arc<ReadWriteTxn>> {
        self.inner.read().iter().cloned().collect()
    }

    /// Build the overlay snapshot a transaction beginning against
    /// high-water-mark `hwm_commit_lsn` should see.
    ///
    /// `hwm_commit_lsn` is `None` when no high-water-mark transaction
    /// exists yet (empty log); the snapshot is then empty. Otherwise:
    /// every entry with `commit_lsn <= hwm_commit_lsn` is included, in
    /// ascending order, stopping at the first entry that exceeds it;
    /// entries already reflected in `flushed_baseline` are then dropped
    /// from the front.
    pub fn snapshot_upto(
        &self,
        hwm_commit_lsn: Option<Lsn>,
        flushed_baseline: Lsn,
    ) -> Vec<Arc<ReadWriteTxn>> {
        let hwm = match hwm_commit_lsn {
            Some(hwm) => hwm,
            None => return Vec::new(),
        };

        let mut result = Vec::new();
        for txn in self.inner.read().iter() {
            let commit_lsn = txn.commit_lsn().expect("queue only holds committed txns");
            if commit_lsn > hwm {
                break;
            }
            result.push(Arc::clone(txn));
        }

        // Ascending order guarantees already-flushed entries form a
        // contiguous prefix; `retain` drops exactly that prefix.
        result.retain(|txn| txn.commit_lsn().unwrap() > flushed_baseline);
        result
    }

    /// Retirement sweep: remove entries from the head
    /// while `ref_count == 0 && commit_lsn <= flushed_baseline`, stopping
    /// at the first holdout. Never blocks on the hot path — a single
    /// write-lock acquisition, no I/O.
    pub fn retire(&self, flushed_baseline: Lsn) -> usize {
        let mut guard = self.inner.write();
        let mut removed = 0;
        while let Some(front) = guard.front() {
            let commit_lsn = front.commit_lsn().expect("queue only holds committed txns");
            if front.ref_count() == 0 && commit_lsn <= flushed_baseline {
                guard.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    /// Number of transactions currently enqueued.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
