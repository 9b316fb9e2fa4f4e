//! Core types for elide
//!
//! This crate defines the leaf vocabulary shared by every layer:
//! - StatusWord / AbortFlags: decoding of the hardware begin status
//! - AbortReason: validated explicit abort reasons
//! - TxError: the error taxonomy surfaced to callers
//! - SectionKey: identity of a critical section
//!
//! Nothing here touches the hardware, allocates, or has side effects.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod reason;
pub mod section;
pub mod status;

pub use error::{Result, TxError};
pub use reason::{AbortReason, INTERNAL_FAILURE};
pub use section::SectionKey;
pub use status::{AbortFlags, StatusWord};
