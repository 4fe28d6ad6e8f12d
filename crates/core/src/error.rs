//! Error types for the transaction manager core.
//!
//! `thiserror` gives us `Display`/`std::error::Error` for free; callers
//! match on [`TxnError`] variants rather than parsing strings.

use std::io;
use thiserror::Error;

/// Result type alias used throughout the crate family.
pub type TxnResult<T> = std::result::Result<T, TxnError>;

/// Error kinds the transaction manager can surface.
///
/// Propagation is always to the immediate caller; the manager never
/// retries internally.
#[derive(Debug, Error)]
pub enum TxnError {
    /// `begin` called while a transaction is already bound to this
    /// execution context. Caller bug; surfaced immediately.
    #[error("a transaction is already bound to this execution context")]
    AlreadyActive,

    /// `commit` (or any operation requiring a bound transaction) called
    /// with nothing bound. Caller bug; surfaced immediately.
    #[error("no transaction is bound to this execution context")]
    NoActiveTxn,

    /// The verification hook rejected this commit. The transaction is
    /// aborted (an ABORT record is written) before this error reaches
    /// the caller; the caller may retry with a fresh `begin`.
    #[error("transaction conflicts with a concurrently committed writer")]
    ConflictDetected,

    /// Opaque I/O failure surfaced by the log handle. Transaction state
    /// is undefined after this; treat as fatal unless recovery is
    /// implemented above this core.
    #[error("WAL I/O error: {0}")]
    WalIoError(#[from] io::Error),

    /// An internal invariant check failed. Always a
    /// programming error in this crate or its caller, never a recoverable
    /// condition.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}
