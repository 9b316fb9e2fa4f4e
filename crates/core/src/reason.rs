//! Explicit abort reasons
//!
//! The hardware carries an 8-bit reason in the top byte of the status word.
//! Callers may use `0..=254`; `0xFF` is reserved for the coordinator itself.

use crate::error::{Result, TxError};
use std::fmt;

/// Reason the coordinator uses for its own aborts
///
/// Raised when the atomic block panicked inside an open transaction, or
/// when the transaction saw a fallback running for its critical section.
pub const INTERNAL_FAILURE: u8 = 0xFF;

/// A validated caller-supplied abort reason in `0..=254`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AbortReason(u8);

impl AbortReason {
    /// Reason used by a bare abort
    pub const NONE: AbortReason = AbortReason(0);

    /// Largest reason a caller may request
    pub const MAX: AbortReason = AbortReason(INTERNAL_FAILURE - 1);

    /// Validate a reason code
    ///
    /// Anything that does not fit in 8 bits, and the reserved
    /// [`INTERNAL_FAILURE`] value, is rejected with
    /// [`TxError::InvalidAbortReason`].
    pub fn new(reason: u32) -> Result<Self> {
        match u8::try_from(reason) {
            Ok(code) if code != INTERNAL_FAILURE => Ok(AbortReason(code)),
            _ => Err(TxError::InvalidAbortReason { reason }),
        }
    }

    /// The reason byte
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for AbortReason {
    type Error = TxError;

    fn try_from(reason: u32) -> Result<Self> {
        AbortReason::new(reason)
    }
}

impl From<AbortReason> for u8 {
    fn from(reason: AbortReason) -> u8 {
        reason.0
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
