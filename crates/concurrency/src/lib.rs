//! The MVCC transaction manager core.
//!
//! [`TxnManager`] is the crate's single entry point: it owns the WAL
//! handle, the committed-transaction history, and the two published
//! high-water-mark slots a `begin` reads from. Everything else in this
//! crate — [`Transaction`], [`CommittedQueue`], [`ConflictVerifier`] — is
//! a collaborator `TxnManager` wires together.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod committed_queue;
pub mod manager;
pub mod transaction;
pub mod verify;

pub use committed_queue::CommittedQueue;
pub use manager::TxnManager;
pub use transaction::{Edit, ReadOnlyTxn, ReadWriteTxn, Transaction, TxnState};
pub use verify::{ConflictVerifier, NoConflictVerifier, WriteSetVerifier};
