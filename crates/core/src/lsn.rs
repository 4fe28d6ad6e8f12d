//! Log-sequence-number: the ordering currency of the whole core.
//!
//! Every appended WAL record gets one; start and commit timestamps for
//! transactions are just LSNs borrowed from the log's own physical order.

use std::fmt;

/// A 64-bit non-decreasing position in the write-ahead log.
///
/// Two LSNs from the same [`crate::Lsn`]-producing log are always
/// comparable by their natural physical order; `Lsn` derives `Ord` for
/// exactly that reason — snapshot lists and the committed queue both rely
/// on plain ascending sort by `Lsn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(i64);

/// Sentinel meaning "no log position" — an unstarted read-write
/// transaction's `commit_lsn`, or a read-only transaction begun against
/// an empty log.
pub const UNKNOWN_LSN: Lsn = Lsn(0);

impl Lsn {
    /// Wrap a raw log offset/position.
    pub const fn new(raw: i64) -> Self {
        Lsn(raw)
    }

    /// The raw `i64` value, as it appears on the wire (big-endian, per
    /// the state-change record format).
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// `true` for [`UNKNOWN_LSN`].
    pub const fn is_unknown(self) -> bool {
        self.0 == UNKNOWN_LSN.0
    }
}

impl Default for Lsn {
    fn default() -> Self {
        UNKNOWN_LSN
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "UNKNOWN")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<i64> for Lsn {
    fn from(raw: i64) -> Self {
        Lsn(raw)
    }
}
