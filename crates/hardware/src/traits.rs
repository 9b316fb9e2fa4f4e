//! The native capability boundary
//!
//! [`Htm`] is everything the coordinator needs from the platform. The
//! hardware primitive is opaque and non-reentrant and may abort at any
//! instruction; implementations only surface its raw status words.
//!
//! Begin is shaped as a region rather than a bare `begin() -> u32`: a
//! hardware begin "returns twice" (once on start, again with the abort
//! status), which software backends cannot reproduce. Running the region
//! inside `speculate` lets both kinds express the same control flow.
//!
//! Both `speculate` and `isolate` name the critical section they serve.
//! Hardware tracks conflicts by cache line and ignores it; software
//! backends isolate per section with it.

use elide_core::SectionKey;

/// Hardware transactional memory primitive
///
/// Implementations must be usable from any thread. All transactional state
/// is per-thread: `in_transaction`, `commit` and `abort` refer to the
/// calling thread's open transaction.
pub trait Htm: Send + Sync {
    /// Whether the capability is present. Pure, callable any time.
    fn is_supported(&self) -> bool;

    /// Whether the calling thread is inside an open transaction
    fn in_transaction(&self) -> bool;

    /// Begin a transaction for `section` and run `region` inside it
    ///
    /// Returns [`StatusWord::STARTED_RAW`](elide_core::StatusWord::STARTED_RAW)
    /// once `region` has returned; the transaction is still open and the
    /// caller must [`commit`](Self::commit) it. Any other value is the abort
    /// status, whether the transaction failed to start or aborted while
    /// `region` was running. Effects of an aborted region are discarded by
    /// the hardware.
    ///
    /// Called while a transaction is open, the begin nests into it: it
    /// returns `STARTED_RAW`, and an abort anywhere resumes at the outermost
    /// begin with [`AbortFlags::NESTED`](elide_core::AbortFlags::NESTED)
    /// set when it was raised below the outermost level.
    fn speculate(&self, section: SectionKey, region: &mut dyn FnMut()) -> u32;

    /// Commit the calling thread's transaction
    ///
    /// Returns `false` when no transaction is open.
    fn commit(&self) -> bool;

    /// Abort the calling thread's transaction with `reason`
    ///
    /// Returns `false` when no transaction is open. When one is, control
    /// does not return: the enclosing [`speculate`](Self::speculate) returns
    /// an explicit abort status carrying `reason`.
    fn abort(&self, reason: u8) -> bool;

    /// Run ordinary, non-transactional code on behalf of `section`
    ///
    /// Writes made by `f` must abort any concurrent transaction of the same
    /// section that touched the same memory. Hardware gives this for free;
    /// software backends use it to provide the same isolation. Code isolated
    /// for one section never waits on another section.
    fn isolate(&self, _section: SectionKey, f: &mut dyn FnMut()) {
        f()
    }

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
