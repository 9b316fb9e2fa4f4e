//! # Elide
//!
//! Hardware transactional execution with serialized per-section fallback.
//!
//! An atomic block runs speculatively inside a hardware transaction. Aborts
//! the hardware flags as retryable are replayed transparently; any other
//! abort runs the caller's fallback under a lock owned by the block's
//! critical section, so fallbacks never race speculative attempts of the
//! same section while unrelated sections proceed independently.
//!
//! ## Quick Start
//!
//! ```ignore
//! use elide::prelude::*;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! static X: AtomicU64 = AtomicU64::new(0);
//! static Y: AtomicU64 = AtomicU64::new(0);
//!
//! let transfer = AtomicBlock::tagged("transfer", || {
//!     X.fetch_add(1, Ordering::Relaxed);
//!     Y.fetch_add(1, Ordering::Relaxed);
//! });
//!
//! // Speculate, and fall back to the same code under the section lock.
//! elide::run_or_else(&transfer, || {
//!     X.fetch_add(1, Ordering::Relaxed);
//!     Y.fetch_add(1, Ordering::Relaxed);
//! })?;
//! ```
//!
//! ## Layers
//!
//! - [`elide_core`] - status words, abort reasons, errors
//! - [`elide_hardware`] - the native primitive and its backends
//! - [`elide_concurrency`] - sections, retry policy, the coordinator
//! - this crate - configuration and the process-wide runtime

#![warn(missing_docs)]

mod config;
mod runtime;

pub mod prelude;

pub use config::{Config, BACKEND_ENV, MAX_ATTEMPTS_ENV};
pub use runtime::{
    abort, abort_with, commit, coordinator, in_transaction, init, is_initialized, is_supported,
    run, run_or_else, run_transactionally,
};

pub use elide_concurrency::{
    Attempt, AtomicBlock, Coordinator, CoordinatorBuilder, MetricsSnapshot, RetryPolicy,
    SectionKey, SectionLock, SectionRegistry,
};
pub use elide_core::{AbortFlags, AbortReason, Result, StatusWord, TxError, INTERNAL_FAILURE};
pub use elide_hardware::{BackendKind, Htm};
