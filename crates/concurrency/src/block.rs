//! Atomic blocks
//!
//! An [`AtomicBlock`] pairs the code to run speculatively with the identity
//! of its critical section. Identity belongs to the block object, not to
//! what the code does: two blocks with identical bodies are different
//! sections unless they share a tag, while clones of one block are the same
//! section.

use crate::registry::SectionRegistry;
use crate::section::{SectionKey, SectionLock};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Unit of work attempted under hardware transactional memory
///
/// The body may run several times (once per attempt) and from several
/// threads, hence `Fn`. Share a block between threads by reference or
/// through an `Arc`.
pub struct AtomicBlock<F> {
    body: F,
    key: SectionKey,
    /// Lock resolved on first use, with the id of the registry it came from
    section: OnceCell<(u64, Arc<SectionLock>)>,
}

impl<F> AtomicBlock<F> {
    /// A block forming its own critical section
    pub fn new(body: F) -> Self {
        Self::with_key(SectionKey::unique(), body)
    }

    /// A block in the critical section named `tag`
    ///
    /// Every block with the same tag falls back under the same lock.
    pub fn tagged(tag: &'static str, body: F) -> Self {
        Self::with_key(SectionKey::Tag(tag), body)
    }

    /// A block in the critical section identified by `key`
    pub fn with_key(key: SectionKey, body: F) -> Self {
        Self {
            body,
            key,
            section: OnceCell::new(),
        }
    }

    /// Identity of the block's critical section
    pub fn key(&self) -> SectionKey {
        self.key
    }

    /// Run the body
    #[inline]
    pub(crate) fn call<V>(&self) -> V
    where
        F: Fn() -> V,
    {
        (self.body)()
    }

    /// The section lock from `registry`, cached for later calls
    ///
    /// Holding the returned `Arc` keeps the registry entry alive.
    pub fn section(&self, registry: &SectionRegistry) -> Arc<SectionLock> {
        let id = registry.id();
        let (cached_id, lock) = self
            .section
            .get_or_init(|| (id, registry.resolve(self.key)));
        if *cached_id == id {
            Arc::clone(lock)
        } else {
            registry.resolve(self.key)
        }
    }
}

impl<F: Clone> Clone for AtomicBlock<F> {
    fn clone(&self) -> Self {
        Self {
            body: self.body.clone(),
            key: self.key,
            section: self.section.clone(),
        }
    }
}

impl<F> fmt::Debug for AtomicBlock<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicBlock")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
