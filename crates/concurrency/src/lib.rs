//! Coordination layer for elide
//!
//! This crate runs atomic blocks on the native capability with:
//! - AtomicBlock: the unit of work and its critical section identity
//! - SectionLock / SectionRegistry: per-section fallback locks, created on
//!   first use and reclaimed when unused
//! - RetryPolicy: how long to keep retrying transient aborts
//! - Coordinator: the attempt / retry / fallback protocol
//! - CoordinatorMetrics: commit and abort counters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod coordinator;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod section;

pub use block::AtomicBlock;
pub use coordinator::{Attempt, Coordinator, CoordinatorBuilder};
pub use metrics::{CoordinatorMetrics, MetricsSnapshot};
pub use policy::RetryPolicy;
pub use registry::{SectionRegistry, DEFAULT_PRUNE_THRESHOLD};
pub use section::{FallbackGuard, SectionKey, SectionLock, SPIN_LIMIT};
