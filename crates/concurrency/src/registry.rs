//! Process-wide registry of critical section locks
//!
//! Maps [`SectionKey`] to its [`SectionLock`], creating locks on first use.
//!
//! # Design
//!
//! - DashMap: sharded, so sections that hash to different shards never
//!   contend on insertion
//! - Weak entries: the registry never keeps a lock alive; blocks and
//!   in-flight executions hold the strong references
//! - Pruning: dead entries are swept once the map grows past a threshold,
//!   bounding memory in long-running processes with many call sites
//!
//! # Convergence
//!
//! [`SectionRegistry::resolve`] goes through the entry API, which holds the
//! shard's write lock for the whole lookup-or-insert. Two threads racing on
//! a previously unseen key therefore get the same lock instance.

use crate::section::{SectionKey, SectionLock};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Default number of entries before dead ones are swept
pub const DEFAULT_PRUNE_THRESHOLD: usize = 1024;

static GLOBAL: Lazy<Arc<SectionRegistry>> = Lazy::new(|| Arc::new(SectionRegistry::new()));

/// Registry of critical section locks
pub struct SectionRegistry {
    /// Process-unique, never reused
    id: u64,
    sections: DashMap<SectionKey, Weak<SectionLock>>,
    prune_threshold: usize,
    /// Map size after the last sweep
    swept_at: AtomicUsize,
}

impl SectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }

    /// Create a registry that sweeps dead entries past `threshold` entries
    pub fn with_prune_threshold(threshold: usize) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            sections: DashMap::new(),
            prune_threshold: threshold.max(1),
            swept_at: AtomicUsize::new(0),
        }
    }

    /// Identity of this registry, unique for the life of the process
    ///
    /// Unlike the registry's address, an id is never handed to a later
    /// registry.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The process-wide registry
    pub fn global() -> Arc<SectionRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Get the lock for `key`, creating it if absent or reclaimed
    pub fn resolve(&self, key: SectionKey) -> Arc<SectionLock> {
        let lock = match self.sections.entry(key) {
            Entry::Occupied(mut entry) => {
                if let Some(lock) = entry.get().upgrade() {
                    return lock;
                }
                let lock = Arc::new(SectionLock::new(key));
                entry.insert(Arc::downgrade(&lock));
                lock
            }
            Entry::Vacant(entry) => {
                let lock = Arc::new(SectionLock::new(key));
                entry.insert(Arc::downgrade(&lock));
                lock
            }
        };
        self.maybe_prune();
        lock
    }

    /// Get the lock for `key` if it is registered and alive
    pub fn get(&self, key: &SectionKey) -> Option<Arc<SectionLock>> {
        self.sections.get(key).and_then(|weak| weak.upgrade())
    }

    /// Number of entries, live or not yet swept
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Number of entries whose lock is still referenced
    pub fn live(&self) -> usize {
        self.sections
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    /// Remove every dead entry, returning how many were removed
    pub fn purge(&self) -> usize {
        let before = self.sections.len();
        self.sections.retain(|_, weak| weak.strong_count() > 0);
        let after = self.sections.len();
        self.swept_at.store(after, Ordering::Relaxed);
        before.saturating_sub(after)
    }

    /// Sweep when the map has grown by a threshold's worth since the last sweep
    fn maybe_prune(&self) {
        let len = self.sections.len();
        let swept_at = self.swept_at.load(Ordering::Relaxed);
        if len >= swept_at + self.prune_threshold {
            let removed = self.purge();
            tracing::trace!(
                removed,
                remaining = self.sections.len(),
                "pruned section registry"
            );
        }
    }
}

impl Default for SectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionRegistry")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("prune_threshold", &self.prune_threshold)
            .finish()
    }
}
