//! `dirtx` — an MVCC transaction manager core for an embedded,
//! directory-style database.
//!
//! This crate is a thin facade over three workspace members:
//!
//! - [`dirtx_core`] — log-sequence numbers, the error type, entity-id
//!   ordering/codec contracts.
//! - [`dirtx_durability`] — the append-only WAL ([`LogHandle`]) and the
//!   state-change record wire format.
//! - [`dirtx_concurrency`] — [`TxnManager`] itself: `begin`/`commit`/
//!   `abort`, the committed queue, and the conflict-verification hook.
//!
//! Distribution, durability policy beyond invoking `sync`, recovery/
//! replay, query planning, access control, the directory schema layer,
//! and the wire protocol are all out of scope here — this crate is the
//! transaction-ordering core a partition-storage layer builds on top of.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use dirtx_core::{
    ByteLexicalComparator, IdComparator, IdSerializer, Lsn, RawIdSerializer, TxnError, TxnResult,
    UNKNOWN_LSN,
};
pub use dirtx_durability::{
    FileLogHandle, InMemoryLogHandle, LogHandle, LogRecordIter, StateChangeRecord, TxnRecordState,
};
pub use dirtx_concurrency::{
    CommittedQueue, ConflictVerifier, Edit, NoConflictVerifier, ReadOnlyTxn, ReadWriteTxn,
    Transaction, TxnManager, TxnState, WriteSetVerifier,
};
