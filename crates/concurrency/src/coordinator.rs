//! Transactional execution coordinator
//!
//! Runs an [`AtomicBlock`] speculatively on the hardware, retries when the
//! hardware hints a retry may succeed, and otherwise falls back to running
//! caller-supplied code under the block's section lock.
//!
//! ## Protocol
//!
//! ```text
//! 1. Wait until no fallback runs for the section; remember its sequence word
//! 2. Begin. Inside the transaction:
//!      re-read the sequence word, abort(INTERNAL_FAILURE) if it moved
//!      run the body; on panic abort(INTERNAL_FAILURE)
//! 3. Started: commit and return the body's value
//! 4. Aborted with INTERNAL_FAILURE:
//!      NESTED flagged  -> a nested block met a live fallback: Contended (retry)
//!      sequence moved  -> Contended (retry)
//!      sequence stable -> the body panicked: TxError::InternalFailure
//! 5. RETRY flagged: Transient (retry)
//! 6. Otherwise: Persistent -> fallback under the section lock, or an error
//! ```
//!
//! Retries in steps 4 and 5 count against the [`RetryPolicy`]. Once it is
//! spent the fallback runs if one was supplied, else
//! [`TxError::RetriesExhausted`] is returned.
//!
//! ## Nesting
//!
//! A call made while the calling thread is already inside a transaction
//! joins it with a nested begin for its own section. Inside, it checks its
//! section's sequence word like an outermost attempt, which also puts the
//! word in the read set, and aborts with `INTERNAL_FAILURE` when that
//! section's fallback is running. The abort is raised below the outermost
//! level, so the hardware flags it NESTED and the outermost attempt retries.
//! A panicking nested body first closes its level, so the outermost abort
//! for a panic is never flagged NESTED.
//!
//! ## Reentry
//!
//! A call for a section whose fallback lock the calling thread already
//! holds, typically a fallback running another block of its own section,
//! runs its body directly. The lock already excludes every other execution
//! of the section, and waiting for it to be released would never end.
//!
//! ## Logging
//!
//! Nothing is logged between begin and commit: on real hardware the
//! logging machinery would abort the transaction. Events are emitted once
//! an attempt has resolved.

use crate::block::AtomicBlock;
use crate::metrics::CoordinatorMetrics;
use crate::policy::RetryPolicy;
use crate::registry::SectionRegistry;
use crate::section::SectionLock;
use elide_core::{AbortReason, Result, StatusWord, TxError, INTERNAL_FAILURE};
use elide_hardware::{select, AbortUnwind, BackendKind, Htm};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Outcome of one speculative attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<V> {
    /// The transaction committed with this value
    Committed(V),
    /// The hardware hinted a retry may succeed
    Transient(StatusWord),
    /// Retrying will not help; fall back
    Persistent(StatusWord),
    /// A fallback for the same section started during the attempt
    Contended(StatusWord),
}

impl<V> Attempt<V> {
    /// Abort status, `None` for a commit
    pub fn status(&self) -> Option<StatusWord> {
        match self {
            Attempt::Committed(_) => None,
            Attempt::Transient(status)
            | Attempt::Persistent(status)
            | Attempt::Contended(status) => Some(*status),
        }
    }

    /// Whether the attempt committed
    pub fn is_committed(&self) -> bool {
        matches!(self, Attempt::Committed(_))
    }

    /// Whether another attempt is worth making
    pub fn should_retry(&self) -> bool {
        matches!(self, Attempt::Transient(_) | Attempt::Contended(_))
    }

    /// The committed value
    pub fn into_value(self) -> Option<V> {
        match self {
            Attempt::Committed(value) => Some(value),
            _ => None,
        }
    }
}

/// Coordinates speculative execution, retry and fallback
///
/// # Thread Safety
///
/// Shared freely between threads. All per-call state lives on the calling
/// thread's stack; the only shared mutable state is the section locks and
/// the metrics counters.
pub struct Coordinator {
    htm: Arc<dyn Htm>,
    /// Detected once at build; no primitive is issued when false
    supported: bool,
    registry: Arc<SectionRegistry>,
    retry: RetryPolicy,
    metrics: CoordinatorMetrics,
}

impl Coordinator {
    /// Create a coordinator over `htm` with the global registry and
    /// unbounded retry
    pub fn new(htm: Arc<dyn Htm>) -> Self {
        Self::builder().backend(htm).build()
    }

    /// Start building a coordinator
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Whether hardware transactions are available
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// The backend in use
    pub fn backend(&self) -> &Arc<dyn Htm> {
        &self.htm
    }

    /// Registry resolving section locks
    pub fn registry(&self) -> &Arc<SectionRegistry> {
        &self.registry
    }

    /// Policy used by [`run_transactionally`](Self::run_transactionally)
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Running counters
    pub fn metrics(&self) -> &CoordinatorMetrics {
        &self.metrics
    }

    fn ensure_supported(&self) -> Result<()> {
        if self.supported {
            Ok(())
        } else {
            Err(TxError::Unsupported)
        }
    }

    /// Whether the calling thread is inside a transaction
    pub fn in_transaction(&self) -> Result<bool> {
        self.ensure_supported()?;
        Ok(self.htm.in_transaction())
    }

    /// Commit the calling thread's transaction
    ///
    /// # Errors
    ///
    /// `NoActiveTransaction` when no transaction is open.
    pub fn commit(&self) -> Result<()> {
        self.ensure_supported()?;
        if self.htm.commit() {
            Ok(())
        } else {
            Err(TxError::NoActiveTransaction)
        }
    }

    /// Abort the calling thread's transaction with reason 0
    pub fn abort(&self) -> Result<()> {
        self.abort_reason(AbortReason::NONE)
    }

    /// Abort the calling thread's transaction with `reason`
    ///
    /// With a transaction open this does not return: the enclosing
    /// execution sees an explicit abort carrying `reason`.
    ///
    /// # Errors
    ///
    /// - `InvalidAbortReason` when `reason` is outside `0..=254`, checked
    ///   before anything else
    /// - `NoActiveTransaction` when no transaction is open
    pub fn abort_with(&self, reason: u32) -> Result<()> {
        let reason = AbortReason::new(reason)?;
        self.abort_reason(reason)
    }

    fn abort_reason(&self, reason: AbortReason) -> Result<()> {
        self.ensure_supported()?;
        if self.htm.abort(reason.get()) {
            Ok(())
        } else {
            Err(TxError::NoActiveTransaction)
        }
    }

    /// Make a single speculative attempt at `atomic`
    ///
    /// Never runs a fallback and never retries. Inside a transaction, or
    /// under the section's own fallback lock, the body runs as described
    /// in the module docs and reports `Committed`.
    ///
    /// # Errors
    ///
    /// - `Unsupported` without hardware support
    /// - `InternalFailure` when the body panicked inside the transaction
    /// - `NoActiveTransaction` when the body closed the transaction itself
    pub fn attempt<F, V>(&self, atomic: &AtomicBlock<F>) -> Result<Attempt<V>>
    where
        F: Fn() -> V,
    {
        self.ensure_supported()?;
        let section = atomic.section(&self.registry);
        if section.is_held_by_current_thread() {
            return Ok(Attempt::Committed(atomic.call()));
        }
        if self.htm.in_transaction() {
            return self.nested(atomic, &section).map(Attempt::Committed);
        }
        self.speculate(atomic, &section)
    }

    /// Run `atomic` with the default retry policy, falling back to
    /// `fallback` when the hardware cannot complete it
    pub fn run_transactionally<F, G, V>(
        &self,
        atomic: &AtomicBlock<F>,
        fallback: Option<G>,
    ) -> Result<V>
    where
        F: Fn() -> V,
        G: FnOnce() -> V,
    {
        self.execute(atomic, fallback, self.retry)
    }

    /// Run `atomic` with no fallback
    pub fn run<F, V>(&self, atomic: &AtomicBlock<F>) -> Result<V>
    where
        F: Fn() -> V,
    {
        self.execute(atomic, None::<fn() -> V>, self.retry)
    }

    /// Run `atomic`, falling back to `fallback`
    pub fn run_or_else<F, G, V>(&self, atomic: &AtomicBlock<F>, fallback: G) -> Result<V>
    where
        F: Fn() -> V,
        G: FnOnce() -> V,
    {
        self.execute(atomic, Some(fallback), self.retry)
    }

    /// Run `atomic` under `policy`
    ///
    /// # Errors
    ///
    /// - `Unsupported` without hardware support; nothing runs
    /// - `ExplicitAbort` for an explicit abort with no fallback
    /// - `Aborted` for any other persistent abort with no fallback
    /// - `RetriesExhausted` when `policy` is spent with no fallback
    /// - `InternalFailure` when the body panicked inside the transaction
    ///
    /// A panic in `fallback` propagates to the caller after the section
    /// lock is released.
    pub fn execute<F, G, V>(
        &self,
        atomic: &AtomicBlock<F>,
        fallback: Option<G>,
        policy: RetryPolicy,
    ) -> Result<V>
    where
        F: Fn() -> V,
        G: FnOnce() -> V,
    {
        self.ensure_supported()?;
        let section = atomic.section(&self.registry);
        if section.is_held_by_current_thread() {
            return Ok(atomic.call());
        }
        if self.htm.in_transaction() {
            return self.nested(atomic, &section);
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let status = match self.speculate(atomic, &section)? {
                Attempt::Committed(value) => return Ok(value),
                Attempt::Persistent(status) => {
                    return match fallback {
                        Some(fallback) => {
                            tracing::debug!(
                                section = %section.key(),
                                %status,
                                attempts,
                                "persistent abort, running fallback"
                            );
                            self.fallback(&section, fallback)
                        }
                        None => Err(match status.explicit_reason() {
                            Some(reason) => TxError::ExplicitAbort { reason },
                            None => TxError::Aborted { status },
                        }),
                    };
                }
                Attempt::Transient(status) | Attempt::Contended(status) => status,
            };

            if !policy.allows(attempts) {
                tracing::debug!(
                    section = %section.key(),
                    last = %status,
                    attempts,
                    "retry budget exhausted"
                );
                return match fallback {
                    Some(fallback) => self.fallback(&section, fallback),
                    None => Err(TxError::RetriesExhausted {
                        attempts,
                        last: status,
                    }),
                };
            }
            tracing::trace!(section = %section.key(), %status, attempts, "retrying");
        }
    }

    /// One attempt; the caller has checked support and nesting
    fn speculate<F, V>(&self, atomic: &AtomicBlock<F>, section: &SectionLock) -> Result<Attempt<V>>
    where
        F: Fn() -> V,
    {
        let observed = section.wait_until_free();
        let htm = &*self.htm;
        let mut value = None;

        let raw = htm.speculate(section.key(), &mut || {
            if section.sequence() != observed {
                htm.abort(INTERNAL_FAILURE);
            }
            match panic::catch_unwind(AssertUnwindSafe(|| atomic.call())) {
                Ok(v) => value = Some(v),
                Err(payload) => {
                    if payload.is::<AbortUnwind>() || !htm.abort(INTERNAL_FAILURE) {
                        panic::resume_unwind(payload);
                    }
                }
            }
        });

        let status = StatusWord::decode(raw);
        if status.is_started() {
            if !htm.commit() {
                return Err(TxError::NoActiveTransaction);
            }
            self.metrics.record_commit();
            return value.map(Attempt::Committed).ok_or(TxError::InternalFailure);
        }

        if status.explicit_reason() == Some(INTERNAL_FAILURE) {
            if status.is_nested() || section.sequence() != observed {
                self.metrics.record_contended();
                return Ok(Attempt::Contended(status));
            }
            self.metrics.record_internal_failure();
            tracing::error!(
                section = %section.key(),
                backend = htm.name(),
                "atomic block failed inside a transaction"
            );
            return Err(TxError::InternalFailure);
        }

        if status.may_retry() {
            self.metrics.record_transient();
            Ok(Attempt::Transient(status))
        } else {
            self.metrics.record_persistent(status.is_explicit());
            Ok(Attempt::Persistent(status))
        }
    }

    /// Run `atomic` as part of the calling thread's open transaction
    fn nested<F, V>(&self, atomic: &AtomicBlock<F>, section: &SectionLock) -> Result<V>
    where
        F: Fn() -> V,
    {
        let htm = &*self.htm;
        let mut value = None;

        let raw = htm.speculate(section.key(), &mut || {
            if section.is_held() {
                htm.abort(INTERNAL_FAILURE);
            }
            match panic::catch_unwind(AssertUnwindSafe(|| atomic.call())) {
                Ok(v) => value = Some(v),
                Err(payload) => {
                    if !payload.is::<AbortUnwind>() {
                        htm.commit();
                    }
                    panic::resume_unwind(payload);
                }
            }
        });

        // An abort resumes at the outermost begin, never here.
        let status = StatusWord::decode(raw);
        if !status.is_started() {
            return Err(TxError::Aborted { status });
        }
        if !htm.commit() {
            return Err(TxError::NoActiveTransaction);
        }
        value.ok_or(TxError::InternalFailure)
    }

    /// Run `fallback` holding the section lock
    fn fallback<G, V>(&self, section: &SectionLock, fallback: G) -> Result<V>
    where
        G: FnOnce() -> V,
    {
        self.metrics.record_fallback();
        let mut fallback = Some(fallback);
        let mut value = None;
        self.htm.isolate(section.key(), &mut || {
            let _guard = section.lock();
            if let Some(fallback) = fallback.take() {
                value = Some(fallback());
            }
        });
        value.ok_or(TxError::InternalFailure)
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("backend", &self.htm.name())
            .field("supported", &self.supported)
            .field("retry", &self.retry)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Builder for [`Coordinator`]
#[derive(Default)]
pub struct CoordinatorBuilder {
    backend: Option<Arc<dyn Htm>>,
    registry: Option<Arc<SectionRegistry>>,
    retry: RetryPolicy,
}

impl CoordinatorBuilder {
    /// Use `htm` as the backend
    pub fn backend(mut self, htm: Arc<dyn Htm>) -> Self {
        self.backend = Some(htm);
        self
    }

    /// Select the backend by kind
    pub fn backend_kind(self, kind: BackendKind) -> Self {
        self.backend(select(kind))
    }

    /// Resolve section locks through `registry`
    pub fn registry(mut self, registry: Arc<SectionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Default retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the coordinator, querying the backend once
    ///
    /// Defaults: auto-detected backend, the global registry.
    pub fn build(self) -> Coordinator {
        let htm = self.backend.unwrap_or_else(|| select(BackendKind::Auto));
        let supported = htm.is_supported();
        tracing::debug!(backend = htm.name(), supported, retry = %self.retry, "coordinator ready");
        Coordinator {
            htm,
            supported,
            registry: self.registry.unwrap_or_else(SectionRegistry::global),
            retry: self.retry,
            metrics: CoordinatorMetrics::default(),
        }
    }
}
