//! Transaction data model.
//!
//! Two variants: [`ReadOnlyTxn`], immutable after construction, and
//! [`ReadWriteTxn`], which carries the mutable state a single owning
//! execution context accumulates before commit/abort. Both are always
//! handed out behind `Arc` — committed `ReadWriteTxn`s are held
//! concurrently by [`crate::committed_queue::CommittedQueue`] and by every
//! reader whose snapshot includes them.

use dirtx_core::Lsn;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// An opaque log edit accumulated by the operation layer.
///
/// The operation layer (schema, attribute encoding, ...) is out of
/// scope here; the core only needs to hold edits in order and hand
/// them to the WAL and the verification hook, so they stay raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edit(pub Vec<u8>);

impl Edit {
    /// Wrap a raw edit payload.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Edit(bytes.into())
    }
}

/// Lifecycle state of a [`ReadWriteTxn`].
///
/// `Active -> Committed` and `Active -> Aborted` are the only legal
/// transitions; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Executing; can accumulate edits.
    Active,
    /// Committed: COMMIT record is durable and both published slots
    /// have been updated.
    Committed,
    /// Aborted: either by explicit `abort()` or a failed verification.
    Aborted,
}

impl TxnState {
    fn to_u8(self) -> u8 {
        match self {
            TxnState::Active => 0,
            TxnState::Committed => 1,
            TxnState::Aborted => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => TxnState::Active,
            1 => TxnState::Committed,
            2 => TxnState::Aborted,
            other => unreachable!("invalid TxnState tag {other}"),
        }
    }
}

/// A committed or in-flight read-write transaction.
///
/// `start_lsn` and `snapshot` are fixed at construction. `commit_lsn` is
/// assigned exactly once, at commit; `state` and
/// `ref_count` are mutated concurrently by the owning context, the
/// manager, and the retirement sweep.
pub struct ReadWriteTxn {
    start_lsn: Lsn,
    commit_lsn: OnceCell<Lsn>,
    state: AtomicU8,
    snapshot: Vec<Arc<ReadWriteTxn>>,
    pinned_hwm: Option<Arc<ReadWriteTxn>>,
    edits: Mutex<Vec<Edit>>,
    ref_count: AtomicU32,
}

impl ReadWriteTxn {
    /// Construct a freshly-begun, active read-write transaction with no
    /// pinned predecessor (used directly by tests; `begin` always goes
    /// through [`ReadWriteTxn::with_pin`]).
    pub(crate) fn new(start_lsn: Lsn, snapshot: Vec<Arc<ReadWriteTxn>>) -> Arc<Self> {
        Self::with_pin(start_lsn, snapshot, None)
    }

    /// Construct a freshly-begun, active read-write transaction.
    ///
    /// `pinned_hwm` is the predecessor whose `ref_count` was incremented
    /// by the stable-read loop at `begin` — `Some` only when that
    /// predecessor survived into `snapshot` as its last element; `None`
    /// if there was no high-water-mark transaction yet, or its effects
    /// were already folded into the flushed baseline (in which case the
    /// pin was released immediately, since nothing needs protecting).
    pub(crate) fn with_pin(
        start_lsn: Lsn,
        snapshot: Vec<Arc<ReadWriteTxn>>,
        pinned_hwm: Option<Arc<ReadWriteTxn>>,
    ) -> Arc<Self> {
        Arc::new(ReadWriteTxn {
            start_lsn,
            commit_lsn: OnceCell::new(),
            state: AtomicU8::new(TxnState::Active.to_u8()),
            snapshot,
            pinned_hwm,
            edits: Mutex::new(Vec::new()),
            ref_count: AtomicU32::new(0),
        })
    }

    /// The transaction's start LSN — also its identity.
    pub fn start_lsn(&self) -> Lsn {
        self.start_lsn
    }

    /// The transaction's commit LSN, once committed.
    pub fn commit_lsn(&self) -> Option<Lsn> {
        self.commit_lsn.get().copied()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxnState {
        TxnState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The snapshot this transaction was begun with. Ascending
    /// by commit LSN, immutable since construction.
    pub fn snapshot(&self) -> &[Arc<ReadWriteTxn>] {
        &self.snapshot
    }

    /// Append an edit to this transaction's pending edit list.
    ///
    /// Only meaningful while `state() == Active`; the operation layer is
    /// responsible for not writing to a transaction past commit/abort.
    pub fn push_edit(&self, edit: Edit) {
        self.edits.lock().push(edit);
    }

    /// Snapshot of the edits accumulated so far, in accumulation order.
    pub fn edits(&self) -> Vec<Edit> {
        self.edits.lock().clone()
    }

    /// `true` if no edits have been accumulated.
    pub fn is_read_only(&self) -> bool {
        self.edits.lock().is_empty()
    }

    /// Discard accumulated edits. Called on abort — the operation layer
    /// must not observe them again.
    pub(crate) fn clear_edits(&self) {
        self.edits.lock().clear();
    }

    /// The predecessor pinned at `begin`, if any.
    pub(crate) fn pinned_hwm(&self) -> Option<&Arc<ReadWriteTxn>> {
        self.pinned_hwm.as_ref()
    }

    /// Current value of the app-level reference count.
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Increment the reference count. Called whenever a reader or
    /// writer pins this transaction via the stable-read loop, or
    /// discovers it while building a snapshot's last element.
    pub(crate) fn incr_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the reference count.
    ///
    /// # Panics
    /// Panics if the count was already zero — that would mean a
    /// double-release, a fatal invariant breach.
    pub(crate) fn decr_ref(&self) {
        let prev = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "ref_count underflow on transaction {}", self.start_lsn);
    }

    pub(crate) fn mark_committed(&self, commit_lsn: Lsn) {
        self.commit_lsn
            .set(commit_lsn)
            .expect("commit_lsn assigned more than once");
        self.state.store(TxnState::Committed.to_u8(), Ordering::Release);
    }

    pub(crate) fn mark_aborted(&self) {
        self.state.store(TxnState::Aborted.to_u8(), Ordering::Release);
    }
}

/// A read-only transaction: just a start LSN and the snapshot it must
/// overlay on base storage. Immutable after construction.
pub struct ReadOnlyTxn {
    start_lsn: Lsn,
    snapshot: Vec<Arc<ReadWriteTxn>>,
    pinned_hwm: Option<Arc<ReadWriteTxn>>,
}

impl ReadOnlyTxn {
    /// Construct a read-only transaction with no pinned predecessor
    /// (used directly by tests; `begin` always goes through
    /// [`ReadOnlyTxn::with_pin`]).
    pub(crate) fn new(start_lsn: Lsn, snapshot: Vec<Arc<ReadWriteTxn>>) -> Arc<Self> {
        Self::with_pin(start_lsn, snapshot, None)
    }

    /// Construct a read-only transaction. See
    /// [`ReadWriteTxn::with_pin`] for what `pinned_hwm` means.
    pub(crate) fn with_pin(
        start_lsn: Lsn,
        snapshot: Vec<Arc<ReadWriteTxn>>,
        pinned_hwm: Option<Arc<ReadWriteTxn>>,
    ) -> Arc<Self> {
        Arc::new(ReadOnlyTxn {
            start_lsn,
            snapshot,
            pinned_hwm,
        })
    }

    /// The transaction's start LSN.
    pub fn start_lsn(&self) -> Lsn {
        self.start_lsn
    }

    /// The snapshot this transaction must overlay on base storage.
    pub fn snapshot(&self) -> &[Arc<ReadWriteTxn>] {
        &self.snapshot
    }

    pub(crate) fn pinned_hwm(&self) -> Option<&Arc<ReadWriteTxn>> {
        self.pinned_hwm.as_ref()
    }
}

/// The transaction bound to an execution context: either variant.
#[derive(Clone)]
pub enum Transaction {
    /// A read-only transaction.
    ReadOnly(Arc<ReadOnlyTxn>),
    /// A read-write transaction.
    ReadWrite(Arc<ReadWriteTxn>),
}

impl Transaction {
    /// `true` if this is the read-only variant.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Transaction::ReadOnly(_))
    }

    /// The transaction's start LSN, regardless of variant.
    pub fn start_lsn(&self) -> Lsn {
        match self {
            Transaction::ReadOnly(t) => t.start_lsn(),
            Transaction::ReadWrite(t) => t.start_lsn(),
        }
    }

    /// The transaction's snapshot, regardless of variant.
    pub fn snapshot(&self) -> &[Arc<ReadWriteTxn>] {
        match self {
            Transaction::ReadOnly(t) => t.snapshot(),
            Transaction::ReadWrite(t) => t.snapshot(),
        }
    }

    /// Borrow the read-write handle, if this is one.
    pub fn as_read_write(&self) -> Option<&Arc<ReadWriteTxn>> {
        match self {
            Transaction::ReadWrite(t) => Some(t),
            Transaction::ReadOnly(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtx_core::UNKNOWN_LSN;

    #[test]
    fn new_read_write_txn_starts_active_with_no_commit_lsn() {
        let txn = ReadWriteTxn::new(Lsn::new(1), Vec::new());
        assert_eq!(txn.state(), TxnState::Active);
        assert_eq!(txn.commit_lsn(), None);
        assert_eq!(txn.ref_count(), 0);
        assert!(txn.is_read_only());
    }

    #[test]
    fn push_edit_marks_transaction_as_having_mutations() {
        let txn = ReadWriteTxn::new(Lsn::new(1), Vec::new());
        txn.push_edit(Edit::new(b"put key=value".to_vec()));
        assert!(!txn.is_read_only());
        assert_eq!(txn.edits().len(), 1);
    }

    #[test]
    fn mark_committed_sets_commit_lsn_once() {
        let txn = ReadWriteTxn::new(Lsn::new(1), Vec::new());
        txn.mark_committed(Lsn::new(5));
        assert_eq!(txn.state(), TxnState::Committed);
        assert_eq!(txn.commit_lsn(), Some(Lsn::new(5)));
    }

    #[test]
    #[should_panic(expected = "assigned more than once")]
    fn mark_committed_twice_panics() {
        let txn = ReadWriteTxn::new(Lsn::new(1), Vec::new());
        txn.mark_committed(Lsn::new(5));
        txn.mark_committed(Lsn::new(6));
    }

    #[test]
    #[should_panic(expected = "ref_count underflow")]
    fn decr_ref_below_zero_panics() {
        let txn = ReadWriteTxn::new(Lsn::new(1), Vec::new());
        txn.decr_ref();
    }

    #[test]
    fn read_only_txn_on_empty_log_has_unknown_start_lsn() {
        let txn = ReadOnlyTxn::new(UNKNOWN_LSN, Vec::new());
        assert_eq!(txn.start_lsn(), UNKNOWN_LSN);
        assert!(txn.snapshot().is_empty());
    }

    #[test]
    fn clear_edits_empties_the_edit_list() {
        let txn = ReadWriteTxn::new(Lsn::new(1), Vec::new());
        txn.push_edit(Edit::new(b"put key=value".to_vec()));
        txn.clear_edits();
        assert!(txn.is_read_only());
    }

    #[test]
    fn with_pin_retains_the_pinned_predecessor() {
        let predecessor = ReadWriteTxn::new(Lsn::new(1), Vec::new());
        predecessor.mark_committed(Lsn::new(2));
        predecessor.incr_ref();

        let txn = ReadWriteTxn::with_pin(
            Lsn::new(10),
            vec![Arc::clone(&predecessor)],
            Some(Arc::clone(&predecessor)),
        );
        assert!(txn.pinned_hwm().is_some());
        assert!(Arc::ptr_eq(txn.pinned_hwm().unwrap(), &predecessor));
    }
}
