//! Critical sections and their fallback locks
//!
//! A critical section is "the same atomic block" across threads. Each one
//! owns a [`SectionLock`] that serializes its fallback executions.
//!
//! # Sequence word
//!
//! Besides the mutex, a section keeps a sequence word incremented when a
//! fallback starts and again when it ends, so it is odd exactly while a
//! fallback runs. Speculative attempts use it two ways:
//!
//! 1. Before beginning, wait for an even value and remember it.
//! 2. Inside the transaction, read it again and abort if it moved. The read
//!    also puts the word in the transaction's read set, so a fallback that
//!    starts later aborts the transaction through the hardware.
//!
//! Because the word only grows, comparing it after an abort tells whether a
//! fallback started since the attempt began, even if it already finished.
//!
//! # Reentry
//!
//! The lock is not reentrant, and a thread holding it would wait forever in
//! [`SectionLock::wait_until_free`]. Each thread therefore records the
//! sections it holds; see [`SectionLock::is_held_by_current_thread`].

pub use elide_core::SectionKey;
use parking_lot::{Mutex, MutexGuard};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Spins before [`SectionLock::wait_until_free`] starts yielding
pub const SPIN_LIMIT: u32 = 64;

thread_local! {
    /// Addresses of the section locks this thread holds
    static HELD: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Fallback lock of one critical section
///
/// # Thread Safety
///
/// At most one thread holds the lock. Speculative attempts never take it;
/// they only read the sequence word.
pub struct SectionLock {
    key: SectionKey,
    mutex: Mutex<()>,
    /// Odd while a fallback runs
    seq: AtomicU64,
}

impl SectionLock {
    /// Create an unlocked section
    pub fn new(key: SectionKey) -> Self {
        Self {
            key,
            mutex: Mutex::new(()),
            seq: AtomicU64::new(0),
        }
    }

    /// The section's identity
    pub fn key(&self) -> SectionKey {
        self.key
    }

    /// Current sequence word
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    /// Whether a fallback is running
    #[inline]
    pub fn is_held(&self) -> bool {
        self.sequence() & 1 == 1
    }

    /// Whether the calling thread is the one holding the fallback lock
    pub fn is_held_by_current_thread(&self) -> bool {
        let addr = self.addr();
        HELD.with(|held| held.borrow().contains(&addr))
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }

    fn acquired<'a>(&'a self, guard: MutexGuard<'a, ()>) -> FallbackGuard<'a> {
        self.seq.fetch_add(1, Ordering::AcqRel);
        HELD.with(|held| held.borrow_mut().push(self.addr()));
        FallbackGuard {
            section: self,
            _guard: guard,
        }
    }

    /// Number of fallbacks that have started on this section
    pub fn fallbacks(&self) -> u64 {
        (self.sequence() + 1) / 2
    }

    /// Block until no fallback runs, returning the (even) sequence word
    ///
    /// Never returns if the calling thread holds the lock.
    pub fn wait_until_free(&self) -> u64 {
        let mut spins = 0u32;
        loop {
            let seq = self.sequence();
            if seq & 1 == 0 {
                return seq;
            }
            if spins < SPIN_LIMIT {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    /// Acquire the fallback lock
    ///
    /// The guard releases it on every exit path, unwinding included.
    pub fn lock(&self) -> FallbackGuard<'_> {
        let guard = self.mutex.lock();
        self.acquired(guard)
    }

    /// Acquire the fallback lock if it is free
    pub fn try_lock(&self) -> Option<FallbackGuard<'_>> {
        let guard = self.mutex.try_lock()?;
        Some(self.acquired(guard))
    }
}

impl fmt::Debug for SectionLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionLock")
            .field("key", &self.key)
            .field("seq", &self.sequence())
            .finish()
    }
}

/// Held while a fallback runs
pub struct FallbackGuard<'a> {
    section: &'a SectionLock,
    _guard: MutexGuard<'a, ()>,
}

impl FallbackGuard<'_> {
    /// The section being held
    pub fn section(&self) -> &SectionLock {
        self.section
    }
}

impl Drop for FallbackGuard<'_> {
    fn drop(&mut self) {
        // Runs before the mutex guard field is dropped.
        self.section.seq.fetch_add(1, Ordering::Release);
        let addr = self.section.addr();
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(at) = held.iter().rposition(|&a| a == addr) {
                held.swap_remove(at);
            }
        });
    }
}
