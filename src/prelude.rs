//! Convenient imports for elide.
//!
//! ```ignore
//! use elide::prelude::*;
//!
//! let block = AtomicBlock::new(|| 1 + 1);
//! assert_eq!(elide::run(&block)?, 2);
//! ```

// Blocks and execution
pub use crate::{AtomicBlock, Attempt, Coordinator, RetryPolicy};

// Configuration
pub use crate::{BackendKind, Config};

// Outcomes
pub use crate::{AbortFlags, AbortReason, Result, StatusWord, TxError};
