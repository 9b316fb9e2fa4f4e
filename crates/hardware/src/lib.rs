//! Native capability layer for elide
//!
//! This crate is the boundary to the processor's transactional memory:
//! - Htm: the begin/commit/abort/test primitive as a trait
//! - Rtm: Intel RTM through inline assembly (x86-64 only)
//! - Emulated: a software stand-in for machines without RTM and for tests
//! - Unavailable: the capability-absent backend
//! - select: detect once and pick a backend

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod emulated;
#[cfg(target_arch = "x86_64")]
pub mod rtm;
pub mod select;
pub mod traits;
pub mod unavailable;

pub use emulated::{AbortUnwind, Emulated};
#[cfg(target_arch = "x86_64")]
pub use rtm::Rtm;
pub use select::{hardware_supported, select, BackendKind, UnknownBackend};
pub use traits::Htm;
pub use unavailable::Unavailable;
