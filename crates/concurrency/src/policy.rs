//! Retry budget for transient aborts

use std::fmt;

/// How many speculative attempts to make before giving up on hardware
///
/// Only aborts the hardware flags as retryable (and attempts that ran into
/// a live fallback) consume the budget; a persistent abort goes to the
/// fallback path immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry for as long as the hardware hints a retry may succeed
    #[default]
    Unbounded,
    /// At most this many attempts in total; `0` is treated as `1`
    Attempts(u32),
}

impl RetryPolicy {
    /// A single attempt, no retry
    pub const fn single() -> Self {
        RetryPolicy::Attempts(1)
    }

    /// Whether another attempt may follow `made` attempts
    pub const fn allows(&self, made: u32) -> bool {
        match self {
            RetryPolicy::Unbounded => true,
            RetryPolicy::Attempts(max) => {
                let max = if *max == 0 { 1 } else { *max };
                made < max
            }
        }
    }

    /// Maximum attempts, `None` when unbounded
    pub const fn max_attempts(&self) -> Option<u32> {
        match self {
            RetryPolicy::Unbounded => None,
            RetryPolicy::Attempts(0) => Some(1),
            RetryPolicy::Attempts(max) => Some(*max),
        }
    }
}

impl From<Option<u32>> for RetryPolicy {
    fn from(max: Option<u32>) -> Self {
        match max {
            Some(max) => RetryPolicy::Attempts(max),
            None => RetryPolicy::Unbounded,
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_attempts() {
            Some(max) => write!(f, "at most {} attempts", max),
            None => f.write_str("unbounded"),
        }
    }
}
