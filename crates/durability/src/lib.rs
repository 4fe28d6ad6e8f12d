//! Durability layer: the `LogHandle` collaborator and the state-change
//! record wire format.
//!
//! Everything that touches disk for the transaction manager core lives
//! here. Segment rotation, compaction, manifests, and snapshots belong to
//! a partition-storage layer built on top of this one — this crate only
//! ships enough of a WAL to make `begin`/`commit`/`abort` durable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod log_handle;
pub mod state_change;

pub use log_handle::{FileLogHandle, InMemoryLogHandle, LogHandle, LogRecordIter};
pub use state_change::{StateChangeRecord, TxnRecordState};
