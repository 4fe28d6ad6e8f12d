//! The verification hook.
//!
//! `ConflictVerifier::verify` must be pure — it decides whether a
//! committing writer conflicts with predecessors that committed after its
//! start, but never mutates state. Conflict *policy* is out of scope; the
//! core only specifies where and when this hook runs.
//!
//! Whether verification should also examine the read set (full
//! serializability) or only the write set (snapshot-isolation style) is
//! left to the caller. This module ships both shapes and lets the caller
//! choose at `TxnManager::init`.

use crate::transaction::ReadWriteTxn;
use std::sync::Arc;

/// Decides whether a committing read-write transaction conflicts with
/// its predecessors.
///
/// Implementations must be pure: no mutation of `current`, the
/// predecessors, or any shared state. `predecessors` is every committed
/// writer not already visible in `current`'s snapshot — i.e. every
/// writer whose commit LSN is strictly greater than `current`'s start
/// LSN.
pub trait ConflictVerifier: Send + Sync {
    /// `true` if `current` may commit; `false` signals a conflict.
    fn verify(&self, current: &ReadWriteTxn, predecessors: &[Arc<ReadWriteTxn>]) -> bool;
}

/// Never rejects a commit.
///
/// The manager's default verifier when none is supplied at `init` —
/// appropriate for snapshot-isolation-only deployments that rely solely
/// on the snapshot list for visibility and never need first-committer-wins
/// semantics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConflictVerifier;

impl ConflictVerifier for NoConflictVerifier {
    fn verify(&self, _current: &ReadWriteTxn, _predecessors: &[Arc<ReadWriteTxn>]) -> bool {
        true
    }
}

/// Snapshot-isolation-style verifier: a conflict exists iff `current`'s
/// edits and a predecessor's edits are reported as overlapping by the
/// caller-supplied predicate `F`.
///
/// This is the "write-set" half of the read-set-vs-write-set choice. A
/// full serializable verifier would also need the transaction's read
/// set, which the operation layer (out of scope) would have to encode
/// into its `Edit` payloads for this hook to use.
pub struct WriteSetVerifier<F> {
    overlaps: F,
}

impl<F> WriteSetVerifier<F>
where
    F: Fn(&[u8], &[u8]) -> bool + Send + Sync,
{
    /// Build a verifier from an edit-overlap predicate.
    pub fn new(overlaps: F) -> Self {
        WriteSetVerifier { overlaps }
    }
}

impl<F> ConflictVerifier for WriteSetVerifier<F>
where
    F: Fn(&[u8], &[u8]) -> bool + Send + Sync,
{
    fn verify(&self, current: &ReadWriteTxn, predecessors: &[Arc<ReadWriteTxn>]) -> bool {
        let current_edits = current.edits();
        for predecessor in predecessors {
            for predecessor_edit in predecessor.edits() {
                for current_edit in &current_edits {
                    if (self.overlaps)(&current_edit.0, &predecessor_edit.0) {
                        return false;
                    }
                }
            }
        }
        true
    }
}
