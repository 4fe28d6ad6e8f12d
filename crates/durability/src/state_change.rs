//! Wire format for transaction state-change log records.
//!
//! `txn_id: i64` is the start LSN for COMMIT/ABORT, `UNKNOWN_LSN` for
//! BEGIN. `state: i32` is `0=BEGIN, 1=COMMIT, 2=ABORT`. Both fields are
//! big-endian.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use dirtx_core::{Lsn, TxnError, TxnResult, UNKNOWN_LSN};
use std::io::Cursor;

/// The three states a read-write transaction's log record can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnRecordState {
    /// Transaction has begun; `txn_id` is `UNKNOWN_LSN`.
    Begin,
    /// Transaction committed; `txn_id` is its start LSN.
    Commit,
    /// Transaction aborted; `txn_id` is its start LSN.
    Abort,
}

impl TxnRecordState {
    fn to_wire(self) -> i32 {
        match self {
            TxnRecordState::Begin => 0,
            TxnRecordState::Commit => 1,
            TxnRecordState::Abort => 2,
        }
    }

    fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(TxnRecordState::Begin),
            1 => Some(TxnRecordState::Commit),
            2 => Some(TxnRecordState::Abort),
            _ => None,
        }
    }
}

/// A decoded/to-be-encoded `{txnId, state}` pair — the only payload the
/// core ever writes to the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChangeRecord {
    /// Start LSN for COMMIT/ABORT records; `UNKNOWN_LSN` for BEGIN.
    pub txn_id: Lsn,
    /// Which transition this record marks.
    pub state: TxnRecordState,
}

impl StateChangeRecord {
    /// A BEGIN record. Its `txn_id` is a placeholder until the append
    /// itself assigns the real start LSN.
    pub fn begin() -> Self {
        StateChangeRecord {
            txn_id: UNKNOWN_LSN,
            state: TxnRecordState::Begin,
        }
    }

    /// A COMMIT record for the transaction that started at `start_lsn`.
    pub fn commit(start_lsn: Lsn) -> Self {
        StateChangeRecord {
            txn_id: start_lsn,
            state: TxnRecordState::Commit,
        }
    }

    /// An ABORT record for the transaction that started at `start_lsn`.
    pub fn abort(start_lsn: Lsn) -> Self {
        StateChangeRecord {
            txn_id: start_lsn,
            state: TxnRecordState::Abort,
        }
    }

    /// Encode to the big-endian wire format: `txn_id: i64`, `state: i32`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.write_i64::<BigEndian>(self.txn_id.raw()).unwrap();
        buf.write_i32::<BigEndian>(self.state.to_wire()).unwrap();
        buf
    }

    /// Decode from the big-endian wire format.
    pub fn decode(bytes: &[u8]) -> TxnResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let txn_id = cursor.read_i64::<BigEndian>()?;
        let state_raw = cursor.read_i32::<BigEndian>()?;
        let state = TxnRecordState::from_wire(state_raw).ok_or_else(|| {
            TxnError::InvariantViolated(format!("unknown state-change tag: {state_raw}"))
        })?;
        Ok(StateChangeRecord {
            txn_id: Lsn::new(txn_id),
            state,
        })
    }
}
