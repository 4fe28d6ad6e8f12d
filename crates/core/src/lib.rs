//! Core types for the directory transaction manager
//!
//! This crate defines the foundations shared by the durability and
//! concurrency layers:
//! - [`Lsn`]: log-sequence-number, the unit of time the whole core orders on
//! - [`TxnError`] / [`TxnResult`]: the unified error hierarchy
//! - [`ids`]: the entity-identifier ordering/codec contract configured at init
//!
//! No I/O and no locking lives here; both of those belong to
//! `dirtx-durability` and `dirtx-concurrency` respectively.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ids;
pub mod lsn;

pub use error::{TxnError, TxnResult};
pub use ids::{ByteLexicalComparator, IdComparator, IdSerializer, RawIdSerializer};
pub use lsn::{Lsn, UNKNOWN_LSN};
