//! `TxnManager` — the MVCC transaction manager core.
//!
//! Owns the WAL handle, the two published high-water-mark slots, the two
//! locks (`verify_lock` outer, `write_txns_lock` inner — never the other
//! order), the committed queue, and the verification hook. Binds at most
//! one [`Transaction`] per execution context via `thread_local!`.

use crate::committed_queue::CommittedQueue;
use crate::transaction::{ReadOnlyTxn, ReadWriteTxn, Transaction};
use crate::verify::{ConflictVerifier, NoConflictVerifier};
use arc_swap::ArcSwapOption;
use dirtx_core::{IdComparator, IdSerializer, Lsn, TxnError, TxnResult, UNKNOWN_LSN};
use dirtx_durability::{LogHandle, StateChangeRecord};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

thread_local! {
    static CURRENT: RefCell<Option<Transaction>> = const { RefCell::new(None) };
}

/// The transaction manager core.
///
/// One instance owns one WAL and one committed-transaction history. All
/// public methods operate on whatever transaction is bound to the
/// calling thread via [`TxnManager::begin`].
pub struct TxnManager {
    log: Box<dyn LogHandle>,
    write_txns_lock: Mutex<()>,
    verify_lock: Mutex<()>,
    latest_committed: ArcSwapOption<ReadWriteTxn>,
    latest_verified: ArcSwapOption<ReadWriteTxn>,
    flushed_baseline_lsn: AtomicI64,
    committed_queue: CommittedQueue,
    verifier: Box<dyn ConflictVerifier>,
    id_comparator: Arc<dyn IdComparator>,
    id_serializer: Arc<dyn IdSerializer>,
}

impl TxnManager {
    /// Build a manager with the default verifier ([`NoConflictVerifier`]).
    pub fn new(
        log: Box<dyn LogHandle>,
        id_comparator: Arc<dyn IdComparator>,
        id_serializer: Arc<dyn IdSerializer>,
    ) -> Self {
        Self::with_verifier(log, id_comparator, id_serializer, Box::new(NoConflictVerifier))
    }

    /// Build a manager with a caller-supplied [`ConflictVerifier`].
    pub fn with_verifier(
        log: Box<dyn LogHandle>,
        id_comparator: Arc<dyn IdComparator>,
        id_serializer: Arc<dyn IdSerializer>,
        verifier: Box<dyn ConflictVerifier>,
    ) -> Self {
        TxnManager {
            log,
            write_txns_lock: Mutex::new(()),
            verify_lock: Mutex::new(()),
            latest_committed: ArcSwapOption::empty(),
            latest_verified: ArcSwapOption::empty(),
            flushed_baseline_lsn: AtomicI64::new(UNKNOWN_LSN.raw()),
            committed_queue: CommittedQueue::new(),
            verifier,
            id_comparator,
            id_serializer,
        }
    }

    /// The entity-id comparator this manager was configured with.
    pub fn id_comparator(&self) -> Arc<dyn IdComparator> {
        Arc::clone(&self.id_comparator)
    }

    /// The entity-id serializer this manager was configured with.
    pub fn id_serializer(&self) -> Arc<dyn IdSerializer> {
        Arc::clone(&self.id_serializer)
    }

    /// The transaction bound to the calling thread, if any.
    pub fn current(&self) -> Option<Transaction> {
        CURRENT.with(|cell| cell.borrow().clone())
    }

    /// Begin a transaction and bind it to the calling thread.
    ///
    /// Fails with [`TxnError::AlreadyActive`] if one is already bound.
    pub fn begin(&self, read_only: bool) -> TxnResult<()> {
        CURRENT.with(|cell| -> TxnResult<()> {
            if cell.borrow().is_some() {
                return Err(TxnError::AlreadyActive);
            }
            Ok(())
        })?;

        let txn = if read_only {
            Transaction::ReadOnly(self.begin_read_only()?)
        } else {
            Transaction::ReadWrite(self.begin_read_write()?)
        };

        CURRENT.with(|cell| *cell.borrow_mut() = Some(txn));
        Ok(())
    }

    /// Stable-read loop on the latest committed transaction, then build
    /// the overlay snapshot.
    fn begin_read_only(&self) -> TxnResult<Arc<ReadOnlyTxn>> {
        let hwm = acquire_ref(&self.latest_committed);
        let start_lsn = hwm_commit_lsn(&hwm);
        let snapshot = self.build_snapshot(hwm.as_ref());
        let pinned = reconcile_pin(hwm, &snapshot);
        Ok(ReadOnlyTxn::with_pin(start_lsn, snapshot, pinned))
    }

    /// Append BEGIN under `write_txns_lock`, then — still under the same
    /// lock — run the stable-read loop on the latest verified transaction
    /// and build the snapshot.
    fn begin_read_write(&self) -> TxnResult<Arc<ReadWriteTxn>> {
        let begin_record = StateChangeRecord::begin().encode();

        let guard = self.write_txns_lock.lock();
        let start_lsn = self.log.append(&begin_record, false)?;

        let hwm = acquire_ref(&self.latest_verified);
        let snapshot = self.build_snapshot(hwm.as_ref());
        let pinned = reconcile_pin(hwm, &snapshot);
        drop(guard);

        Ok(ReadWriteTxn::with_pin(start_lsn, snapshot, pinned))
    }

    /// Entries with `commit_lsn <= hwm`, in ascending order, with the
    /// already-flushed prefix dropped.
    fn build_snapshot(&self, hwm: Option<&Arc<ReadWriteTxn>>) -> Vec<Arc<ReadWriteTxn>> {
        let hwm_commit_lsn = hwm.map(|txn| txn.commit_lsn().expect("hwm is always committed"));
        let baseline = self.flushed_baseline();
        self.committed_queue.snapshot_upto(hwm_commit_lsn, baseline)
    }

    /// Finalize the transaction bound to the calling thread.
    ///
    /// Fails with [`TxnError::NoActiveTxn`] if none is bound. For a
    /// read-write transaction this may also fail with
    /// [`TxnError::ConflictDetected`] — the transaction
    /// is aborted as part of that failure, not left dangling.
    pub fn commit(&self) -> TxnResult<()> {
        let txn = CURRENT
            .with(|cell| cell.borrow_mut().take())
            .ok_or(TxnError::NoActiveTxn)?;

        match txn {
            Transaction::ReadOnly(ro) => {
                release_pin(ro.pinned_hwm(), ro.snapshot(), ro.start_lsn())
            }
            Transaction::ReadWrite(rw) => self.commit_read_write(rw),
        }
    }

    /// Verify under `verify_lock`, append+publish under the nested
    /// `write_txns_lock`, then release the pin held since `begin`.
    fn commit_read_write(&self, txn: Arc<ReadWriteTxn>) -> TxnResult<()> {
        let verify_guard = self.verify_lock.lock();

        let predecessors: Vec<Arc<ReadWriteTxn>> = self
            .committed_queue
            .snapshot_all()
            .into_iter()
            .filter(|predecessor| {
                predecessor.commit_lsn().expect("queue only holds committed txns") > txn.start_lsn()
            })
            .collect();

        if !self.verifier.verify(&txn, &predecessors) {
            drop(verify_guard);
            warn!(
                start_lsn = %txn.start_lsn(),
                predecessor_count = predecessors.len(),
                "conflict detected at commit, aborting"
            );
            self.abort_read_write(&txn)?;
            return Err(TxnError::ConflictDetected);
        }

        let write_guard = self.write_txns_lock.lock();

        let record = StateChangeRecord::commit(txn.start_lsn()).encode();
        let commit_lsn = self.log.append(&record, true)?;

        txn.mark_committed(commit_lsn);
        self.committed_queue.enqueue(Arc::clone(&txn));

        // Verified slot first, committed slot second: a
        // retirement sweep only ever inspects `ref_count`/`commit_lsn`,
        // never the slots, so publish order here only matters for
        // readers racing a fresh `begin` against this commit.
        self.latest_verified.store(Some(Arc::clone(&txn)));
        self.latest_committed.store(Some(Arc::clone(&txn)));

        drop(write_guard);
        drop(verify_guard);

        release_pin(txn.pinned_hwm(), txn.snapshot(), txn.start_lsn())?;
        Ok(())
    }

    /// Abort the transaction bound to the calling thread.
    ///
    /// A no-op success if none is bound.
    pub fn abort(&self) -> TxnResult<()> {
        let txn = CURRENT.with(|cell| cell.borrow_mut().take());
        match txn {
            None => Ok(()),
            Some(Transaction::ReadOnly(ro)) => {
                release_pin(ro.pinned_hwm(), ro.snapshot(), ro.start_lsn())
            }
            Some(Transaction::ReadWrite(rw)) => self.abort_read_write(&rw),
        }
    }

    /// Best-effort ABORT record, then unconditional in-memory teardown —
    /// the WAL error, if any, still surfaces.
    fn abort_read_write(&self, txn: &Arc<ReadWriteTxn>) -> TxnResult<()> {
        let record = StateChangeRecord::abort(txn.start_lsn()).encode();
        let append_result = {
            let _guard = self.write_txns_lock.lock();
            self.log.append(&record, false)
        };

        txn.clear_edits();
        txn.mark_aborted();
        let release_result = release_pin(txn.pinned_hwm(), txn.snapshot(), txn.start_lsn());

        append_result?;
        release_result
    }

    /// Advance the flushed-baseline watermark. Monotonic: a call with a lower or equal
    /// value than the current baseline is a no-op.
    pub fn advance_flushed_baseline(&self, new_baseline: Lsn) {
        let mut current = self.flushed_baseline_lsn.load(Ordering::Acquire);
        while new_baseline.raw() > current {
            match self.flushed_baseline_lsn.compare_exchange_weak(
                current,
                new_baseline.raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// The current flushed-baseline watermark.
    pub fn flushed_baseline(&self) -> Lsn {
        Lsn::new(self.flushed_baseline_lsn.load(Ordering::Acquire))
    }

    /// Run one retirement sweep and return the number of
    /// entries removed. Callable on demand by an external scheduler —
    /// the manager never spawns its own background thread.
    pub fn retire_sweep(&self) -> usize {
        let removed = self.committed_queue.retire(self.flushed_baseline());
        if removed > 0 {
            debug!(removed, "retirement sweep");
        }
        removed
    }

    /// Number of transactions currently held by the committed queue.
    /// Observability only — not part of the commit/begin hot path.
    pub fn committed_queue_len(&self) -> usize {
        self.committed_queue.len()
    }
}

fn hwm_commit_lsn(hwm: &Option<Arc<ReadWriteTxn>>) -> Lsn {
    hwm.as_ref()
        .map(|txn| txn.commit_lsn().expect("hwm is always committed"))
        .unwrap_or(UNKNOWN_LSN)
}

/// The stable-read loop: load the slot, pin it by
/// incrementing its `ref_count`, then confirm the slot still holds the
/// same `Arc` before trusting the pin. Retries on a concurrent publish.
fn acquire_ref(slot: &ArcSwapOption<ReadWriteTxn>) -> Option<Arc<ReadWriteTxn>> {
    loop {
        let candidate = slot.load_full();
        let txn = match &candidate {
            Some(txn) => txn,
            None => return None,
        };
        txn.incr_ref();

        let confirm = slot.load_full();
        let stable = match (&confirm, &candidate) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if stable {
            return candidate;
        }
        txn.decr_ref();
    }
}

/// A pin acquired over `hwm` only needs to be kept if `hwm` actually
/// survived into the final snapshot (as its last element). If the
/// baseline-trim step in [`TxnManager::build_snapshot`] dropped it,
/// its effects are already visible in base storage and the pin can be
/// released immediately — there is nothing left to protect.
fn reconcile_pin(
    hwm: Option<Arc<ReadWriteTxn>>,
    snapshot: &[Arc<ReadWriteTxn>],
) -> Option<Arc<ReadWriteTxn>> {
    let hwm = hwm?;
    let retained = snapshot
        .last()
        .map(|last| Arc::ptr_eq(last, &hwm))
        .unwrap_or(false);
    if retained {
        Some(hwm)
    } else {
        hwm.decr_ref();
        None
    }
}

/// Release the pin held since `begin`, checking the invariant it
/// protects before doing so.
fn release_pin(
    pinned: Option<&Arc<ReadWriteTxn>>,
    snapshot: &[Arc<ReadWriteTxn>],
    start_lsn: Lsn,
) -> TxnResult<()> {
    let pinned = match pinned {
        Some(pinned) => pinned,
        None => return Ok(()),
    };

    let last = snapshot.last().ok_or_else(|| {
        TxnError::InvariantViolated("pinned predecessor but snapshot is empty".to_string())
    })?;

    if !Arc::ptr_eq(last, pinned) || last.commit_lsn() != Some(start_lsn) {
        return Err(TxnError::InvariantViolated(
            "snapshot's last element does not match the pinned predecessor".to_string(),
        ));
    }
    if last.ref_count() == 0 {
        return Err(TxnError::InvariantViolated(
            "pinned predecessor has refCount 0 before release".to_string(),
        ));
    }

    pinned.decr_ref();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Edit;
    use crate::verify::WriteSetVerifier;
    use dirtx_core::{ByteLexicalComparator, RawIdSerializer};
    use dirtx_durability::{FileLogHandle, InMemoryLogHandle};

    fn manager() -> TxnManager {
        TxnManager::new(
            Box::new(InMemoryLogHandle::new()),
            Arc::new(ByteLexicalComparator),
            Arc::new(RawIdSerializer),
        )
    }

    #[test]
    fn commit_and_retire_work_against_a_real_file_backed_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileLogHandle::open(dir.path().join("wal.log")).unwrap();
        let mgr = TxnManager::new(
            Box::new(log),
            Arc::new(ByteLexicalComparator),
            Arc::new(RawIdSerializer),
        );

        mgr.begin(false).unwrap();
        mgr.current()
            .unwrap()
            .as_read_write()
            .unwrap()
            .push_edit(Edit::new(b"cn=alice".to_vec()));
        mgr.commit().unwrap();

        let commit_lsn = mgr.committed_queue.snapshot_all()[0].commit_lsn().unwrap();
        mgr.advance_flushed_baseline(commit_lsn);
        assert_eq!(mgr.retire_sweep(), 1);
    }

    #[test]
    fn begin_twice_on_one_thread_fails_with_already_active() {
        let mgr = manager();
        mgr.begin(true).unwrap();
        let err = mgr.begin(true).unwrap_err();
        assert!(matches!(err, TxnError::AlreadyActive));
        mgr.commit().unwrap();
    }

    #[test]
    fn commit_with_no_active_txn_fails() {
        let mgr = manager();
        let err = mgr.commit().unwrap_err();
        assert!(matches!(err, TxnError::NoActiveTxn));
    }

    #[test]
    fn abort_with_no_active_txn_is_a_silent_success() {
        let mgr = manager();
        mgr.abort().unwrap();
    }

    #[test]
    fn single_writer_commit_is_visible_to_a_later_reader_snapshot() {
        let mgr = manager();

        mgr.begin(false).unwrap();
        {
            let txn = mgr.current().unwrap();
            txn.as_read_write().unwrap().push_edit(Edit::new(b"a=1".to_vec()));
        }
        mgr.commit().unwrap();

        mgr.begin(true).unwrap();
        let reader = mgr.current().unwrap();
        assert_eq!(reader.snapshot().len(), 1);
        mgr.commit().unwrap();
    }

    #[test]
    fn reader_snapshot_excludes_writers_that_commit_after_it_began() {
        let mgr = manager();

        mgr.begin(false).unwrap();
        mgr.commit().unwrap();

        mgr.begin(true).unwrap();
        let reader_snapshot_len = mgr.current().unwrap().snapshot().len();
        mgr.commit().unwrap();

        mgr.begin(false).unwrap();
        mgr.commit().unwrap();

        assert_eq!(reader_snapshot_len, 1);
    }

    #[test]
    fn reader_pins_writer_ref_count_until_it_commits() {
        let mgr = manager();

        mgr.begin(false).unwrap();
        mgr.commit().unwrap();

        mgr.begin(true).unwrap();
        let reader = mgr.current().unwrap();
        let writer = Arc::clone(&reader.snapshot()[0]);
        assert_eq!(writer.ref_count(), 1);

        mgr.commit().unwrap();
        assert_eq!(writer.ref_count(), 0);
    }

    #[test]
    fn two_writers_serialize_through_the_committed_queue() {
        let mgr = manager();

        mgr.begin(false).unwrap();
        mgr.commit().unwrap();

        mgr.begin(false).unwrap();
        let second_snapshot_len = mgr.current().unwrap().snapshot().len();
        mgr.commit().unwrap();

        assert_eq!(second_snapshot_len, 1);
        assert_eq!(mgr.committed_queue_len(), 2);
    }

    #[test]
    fn conflicting_writer_is_rejected_and_torn_down() {
        // A conflict needs two writers overlapping in time: B must begin
        // before A commits. Single-threaded sequencing can't produce
        // that (each begin/commit pair is fully ordered), so this spawns
        // a second thread and uses a channel to interleave them.
        let mgr = Arc::new(TxnManager::with_verifier(
            Box::new(InMemoryLogHandle::new()),
            Arc::new(ByteLexicalComparator),
            Arc::new(RawIdSerializer),
            Box::new(WriteSetVerifier::new(|a: &[u8], b: &[u8]| a == b)),
        ));

        let (a_begun_tx, a_begun_rx) = std::sync::mpsc::channel::<()>();
        let (b_committed_tx, b_committed_rx) = std::sync::mpsc::channel::<()>();

        let mgr_a = Arc::clone(&mgr);
        let writer_a = std::thread::spawn(move || {
            mgr_a.begin(false).unwrap();
            mgr_a
                .current()
                .unwrap()
                .as_read_write()
                .unwrap()
                .push_edit(Edit::new(b"key:alice".to_vec()));
            a_begun_tx.send(()).unwrap();
            b_committed_rx.recv().unwrap();
            mgr_a.commit()
        });

        let mgr_b = Arc::clone(&mgr);
        let writer_b = std::thread::spawn(move || {
            a_begun_rx.recv().unwrap();
            mgr_b.begin(false).unwrap();
            mgr_b
                .current()
                .unwrap()
                .as_read_write()
                .unwrap()
                .push_edit(Edit::new(b"key:alice".to_vec()));
            mgr_b.commit().unwrap();
            b_committed_tx.send(()).unwrap();
        });

        writer_b.join().unwrap();
        let result = writer_a.join().unwrap();
        assert!(matches!(result, Err(TxnError::ConflictDetected)));
    }

    #[test]
    fn advance_flushed_baseline_is_monotonic() {
        let mgr = manager();
        mgr.advance_flushed_baseline(Lsn::new(5));
        mgr.advance_flushed_baseline(Lsn::new(2));
        assert_eq!(mgr.flushed_baseline(), Lsn::new(5));
    }

    #[test]
    fn retire_sweep_removes_unreferenced_flushed_transactions() {
        let mgr = manager();

        mgr.begin(false).unwrap();
        mgr.commit().unwrap();

        let commit_lsn = mgr.committed_queue.snapshot_all()[0].commit_lsn().unwrap();
        mgr.advance_flushed_baseline(commit_lsn);

        assert_eq!(mgr.retire_sweep(), 1);
        assert_eq!(mgr.committed_queue_len(), 0);
    }
}
