//! Identity of critical sections

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a critical section
///
/// Two atomic blocks with equal keys are the same critical section: they
/// share one fallback lock, and backends isolate them together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKey {
    /// An anonymous block; clones of the block share the id
    Block(u64),
    /// A caller-chosen name shared by independently built blocks
    Tag(&'static str),
}

impl SectionKey {
    /// Allocate a fresh, process-unique block key
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SectionKey::Block(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionKey::Block(id) => write!(f, "block#{}", id),
            SectionKey::Tag(tag) => write!(f, "tag:{}", tag),
        }
    }
}
