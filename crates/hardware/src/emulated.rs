//! Software emulation of the hardware primitive
//!
//! Used on processors without RTM and throughout the test suites, where it
//! makes the protocol deterministic.
//!
//! # Model
//!
//! - Every critical section has its own gate. An emulated transaction holds
//!   the gate of its section until it commits or aborts, and
//!   [`Htm::isolate`] takes the same gate, so fallback code never
//!   interleaves with a running emulated transaction of its section: the
//!   isolation the hardware would enforce by aborting on conflict.
//!   Transactions and fallbacks of different sections never wait on each
//!   other.
//! - A nested begin for another section takes that section's gate too,
//!   without waiting. If the gate is busy the whole transaction aborts with
//!   a conflict status, the way hardware aborts on a conflicting line.
//! - An abort unwinds back to the outermost `speculate` with an
//!   [`AbortUnwind`] payload. `resume_unwind` is used, so no panic message
//!   is printed.
//! - Nested begins are flattened into the outermost transaction; an abort
//!   raised below the outermost level carries [`AbortFlags::NESTED`].
//! - Statuses queued with [`Emulated::push_status`] make the next outermost
//!   begins fail immediately, as if the hardware aborted on the first
//!   instruction. This is how conflict, capacity and retry hints are driven.
//!
//! Memory is **not** rolled back: writes made before an abort stay visible.
//!
//! - A transaction cannot start on a thread that is inside `isolate` for the
//!   same section; the begin fails with an empty abort status.
//!
//! Transactional state is per thread. A thread may have at most one open
//! emulated transaction at a time, across all `Emulated` instances.

use crate::traits::Htm;
use elide_core::{AbortFlags, SectionKey, StatusWord};
use parking_lot::lock_api::RawMutex as _;
use parking_lot::{Mutex, RawMutex};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Gate table size below which dead gates are never swept
const GATE_SWEEP_MIN: usize = 64;

type Gate = Arc<RawMutex>;

thread_local! {
    /// (owning backend address, nesting depth)
    static OPEN: Cell<(usize, usize)> = const { Cell::new((0, 0)) };
    /// Gates this thread holds, most recent last
    static HELD: RefCell<Vec<Held>> = const { RefCell::new(Vec::new()) };
}

/// A gate locked by the current thread
struct Held {
    owner: usize,
    section: SectionKey,
    gate: Gate,
    /// Taken by `isolate` rather than by a transaction
    isolated: bool,
}

/// Unwind payload carrying the status of an emulated abort
///
/// Code that catches unwinds inside a speculative region must re-raise
/// this payload untouched with [`std::panic::resume_unwind`].
#[derive(Debug)]
pub struct AbortUnwind {
    status: StatusWord,
}

impl AbortUnwind {
    /// Status the aborted `speculate` will return
    pub fn status(&self) -> StatusWord {
        self.status
    }
}

#[derive(Default)]
struct Gates {
    by_section: HashMap<SectionKey, Weak<RawMutex>>,
    swept_at: usize,
}

/// Software emulated transactional memory
pub struct Emulated {
    gates: Mutex<Gates>,
    script: Mutex<VecDeque<u32>>,
    begins: AtomicU64,
    commits: AtomicU64,
    aborts: AtomicU64,
}

/// Releases the gate taken by `isolate`
struct IsolateGuard<'a> {
    htm: &'a Emulated,
    section: SectionKey,
}

impl Drop for IsolateGuard<'_> {
    fn drop(&mut self) {
        let owner = self.htm.id();
        let held = HELD.with(|held| {
            let mut held = held.borrow_mut();
            let at = held
                .iter()
                .rposition(|h| h.owner == owner && h.section == self.section && h.isolated)?;
            Some(held.remove(at))
        });
        if let Some(held) = held {
            // SAFETY: locked by `isolate` on this thread.
            unsafe { held.gate.unlock() }
        }
    }
}

impl Emulated {
    /// Create an emulated backend
    pub fn new() -> Self {
        Self {
            gates: Mutex::new(Gates::default()),
            script: Mutex::new(VecDeque::new()),
            begins: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
        }
    }

    /// Create a backend whose next begins fail with `statuses`, in order
    pub fn scripted<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = StatusWord>,
    {
        let emulated = Self::new();
        emulated
            .script
            .lock()
            .extend(statuses.into_iter().map(StatusWord::raw));
        emulated
    }

    /// Queue a status for an upcoming begin to fail with
    pub fn push_status(&self, status: StatusWord) {
        self.script.lock().push_back(status.raw());
    }

    /// Number of queued statuses not yet consumed
    pub fn pending(&self) -> usize {
        self.script.lock().len()
    }

    /// Begins attempted, including scripted failures and nested begins
    pub fn begins(&self) -> u64 {
        self.begins.load(Ordering::Relaxed)
    }

    /// Outermost transactions committed
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Explicit aborts raised
    pub fn aborts(&self) -> u64 {
        self.aborts.load(Ordering::Relaxed)
    }

    fn id(&self) -> usize {
        self as *const Self as usize
    }

    /// Nesting depth of this thread's transaction on this backend
    fn depth(&self) -> usize {
        let (owner, depth) = OPEN.with(Cell::get);
        if owner == self.id() {
            depth
        } else {
            0
        }
    }

    fn set_depth(&self, depth: usize) {
        let owner = if depth == 0 { 0 } else { self.id() };
        OPEN.with(|open| open.set((owner, depth)));
    }

    /// The gate of `section`, created on first use
    fn gate(&self, section: SectionKey) -> Gate {
        let mut guard = self.gates.lock();
        let gates = &mut *guard;
        if let Some(gate) = gates.by_section.get(&section).and_then(Weak::upgrade) {
            return gate;
        }
        let gate = Arc::new(RawMutex::INIT);
        gates.by_section.insert(section, Arc::downgrade(&gate));
        if gates.by_section.len() >= (gates.swept_at * 2).max(GATE_SWEEP_MIN) {
            gates.by_section.retain(|_, gate| gate.strong_count() > 0);
            gates.swept_at = gates.by_section.len();
        }
        gate
    }

    /// Whether this thread holds the gate of `section`
    fn holds(&self, section: SectionKey) -> bool {
        let owner = self.id();
        HELD.with(|held| {
            held.borrow()
                .iter()
                .any(|h| h.owner == owner && h.section == section)
        })
    }

    /// Record a gate this thread has just locked
    fn hold(&self, section: SectionKey, gate: Gate, isolated: bool) {
        let owner = self.id();
        HELD.with(|held| {
            held.borrow_mut().push(Held {
                owner,
                section,
                gate,
                isolated,
            })
        });
    }

    /// Unlock every gate held by this thread's transaction
    fn release_transaction(&self) {
        let owner = self.id();
        let released: Vec<Held> = HELD.with(|held| {
            let mut held = held.borrow_mut();
            let (mine, rest): (Vec<Held>, Vec<Held>) = held
                .drain(..)
                .partition(|h| h.owner == owner && !h.isolated);
            *held = rest;
            mine
        });
        for held in released {
            // SAFETY: each was locked by this thread's transaction.
            unsafe { held.gate.unlock() }
        }
    }

    /// Unwind to the outermost `speculate`, which returns `status`
    fn raise(&self, status: StatusWord) -> ! {
        panic::resume_unwind(Box::new(AbortUnwind { status }))
    }
}

impl Default for Emulated {
    fn default() -> Self {
        Self::new()
    }
}

impl Htm for Emulated {
    fn is_supported(&self) -> bool {
        true
    }

    fn in_transaction(&self) -> bool {
        self.depth() > 0
    }

    fn speculate(&self, section: SectionKey, region: &mut dyn FnMut()) -> u32 {
        self.begins.fetch_add(1, Ordering::Relaxed);

        let depth = self.depth();
        if depth > 0 {
            // Flattened: an abort unwinds straight to the outermost begin.
            if !self.holds(section) {
                let gate = self.gate(section);
                if !gate.try_lock() {
                    self.raise(StatusWord::aborted(
                        AbortFlags::CONFLICT | AbortFlags::RETRY | AbortFlags::NESTED,
                    ));
                }
                self.hold(section, gate, false);
            }
            self.set_depth(depth + 1);
            region();
            return StatusWord::STARTED_RAW;
        }
        debug_assert_eq!(
            OPEN.with(Cell::get).1,
            0,
            "thread already inside another emulated backend's transaction"
        );

        // Cannot start while this thread isolates the same section.
        if self.holds(section) {
            return StatusWord::aborted(AbortFlags::empty()).raw();
        }

        if let Some(status) = self.script.lock().pop_front() {
            return status;
        }

        let gate = self.gate(section);
        gate.lock();
        self.hold(section, gate, false);
        self.set_depth(1);
        match panic::catch_unwind(AssertUnwindSafe(|| region())) {
            // Left open; commit releases the gates.
            Ok(()) => StatusWord::STARTED_RAW,
            Err(payload) => {
                // The region may have committed before unwinding.
                if self.depth() > 0 {
                    self.set_depth(0);
                    self.release_transaction();
                }
                match payload.downcast::<AbortUnwind>() {
                    Ok(abort) => abort.status.raw(),
                    Err(payload) => panic::resume_unwind(payload),
                }
            }
        }
    }

    fn commit(&self) -> bool {
        match self.depth() {
            0 => false,
            1 => {
                self.set_depth(0);
                self.commits.fetch_add(1, Ordering::Relaxed);
                self.release_transaction();
                true
            }
            depth => {
                self.set_depth(depth - 1);
                true
            }
        }
    }

    fn abort(&self, reason: u8) -> bool {
        let depth = self.depth();
        if depth == 0 {
            return false;
        }
        self.aborts.fetch_add(1, Ordering::Relaxed);
        let mut status = StatusWord::explicit(reason);
        if depth > 1 {
            status = status.with_flags(AbortFlags::NESTED);
        }
        self.raise(status)
    }

    fn isolate(&self, section: SectionKey, f: &mut dyn FnMut()) {
        if self.holds(section) {
            // This thread already holds the gate.
            return f();
        }
        let gate = self.gate(section);
        gate.lock();
        self.hold(section, gate, true);
        let _gate = IsolateGuard { htm: self, section };
        f();
    }

    fn name(&self) -> &'static str {
        "emulated"
    }
}
