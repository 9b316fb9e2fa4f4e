//! Error types for transactional execution.
//!
//! Every kind here is surfaced synchronously to the caller. The only abort
//! handled without surfacing is the retry-hinted one, which the coordinator
//! replays internally. A persistent abort is not an error by itself: it
//! triggers the fallback path, and becomes [`TxError::ExplicitAbort`] or
//! [`TxError::Aborted`] only when no fallback was supplied.

use crate::status::StatusWord;
use thiserror::Error;

/// All transactional execution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TxError {
    /// The hardware transactional memory capability is absent
    #[error("hardware transactional memory is not supported on this processor")]
    Unsupported,

    /// Commit or abort was requested with no open transaction
    #[error("no active transaction")]
    NoActiveTransaction,

    /// The atomic block aborted explicitly and no fallback was supplied
    #[error("transaction explicitly aborted with reason {reason}")]
    ExplicitAbort {
        /// Decoded abort reason
        reason: u8,
    },

    /// Abort reason outside `0..=254`
    #[error("invalid abort reason {reason}: must be in 0..=254")]
    InvalidAbortReason {
        /// The rejected reason
        reason: u32,
    },

    /// The atomic block failed inside an open transaction
    ///
    /// The transaction was aborted with the reserved internal reason before
    /// this error was raised, so none of the block's effects are visible.
    #[error("atomic block failed inside an open transaction")]
    InternalFailure,

    /// Persistent hardware abort (conflict, capacity, debug) with no fallback
    #[error("transaction aborted: {status}")]
    Aborted {
        /// Status of the aborted attempt
        status: StatusWord,
    },

    /// Bounded retry budget spent with no fallback supplied
    #[error("transaction gave up after {attempts} attempts, last status: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Status of the final attempt
        last: StatusWord,
    },
}

/// Result type for transactional execution.
pub type Result<T> = std::result::Result<T, TxError>;

impl TxError {
    /// Check if retrying the whole operation may succeed.
    ///
    /// Hardware aborts and an exhausted budget are contention-dependent;
    /// everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TxError::Aborted { .. } | TxError::RetriesExhausted { .. }
        )
    }

    /// Check if this error is caused by API misuse.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            TxError::NoActiveTransaction | TxError::InvalidAbortReason { .. }
        )
    }

    /// Reason of an explicit abort.
    pub fn abort_reason(&self) -> Option<u8> {
        match self {
            TxError::ExplicitAbort { reason } => Some(*reason),
            _ => None,
        }
    }

    /// Status word attached to the error, if any.
    pub fn status(&self) -> Option<StatusWord> {
        match self {
            TxError::ExplicitAbort { reason } => Some(StatusWord::explicit(*reason)),
            TxError::Aborted { status } => Some(*status),
            TxError::RetriesExhausted { last, .. } => Some(*last),
            _ => None,
        }
    }
}
