//! Process-wide runtime
//!
//! The backend is detected exactly once per process, either by an explicit
//! [`init`] at startup or lazily on first use from [`Config::from_env`].
//! There is no teardown: the coordinator lives until the process exits.

use crate::config::Config;
use elide_concurrency::{AtomicBlock, Coordinator, SectionRegistry};
use elide_core::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;

static RUNTIME: OnceCell<Coordinator> = OnceCell::new();

fn build(config: Config) -> Coordinator {
    let coordinator = Coordinator::builder()
        .backend_kind(config.backend)
        .registry(Arc::new(SectionRegistry::with_prune_threshold(
            config.prune_threshold,
        )))
        .retry(config.retry)
        .build();
    tracing::info!(
        backend = coordinator.backend().name(),
        supported = coordinator.is_supported(),
        retry = %config.retry,
        "transactional runtime initialized"
    );
    coordinator
}

/// Install the process-wide runtime from `config`
///
/// Returns `false` when the runtime was already initialized, by an earlier
/// `init` or by first use; `config` is then ignored.
pub fn init(config: Config) -> bool {
    let mut installed = false;
    RUNTIME.get_or_init(|| {
        installed = true;
        build(config)
    });
    if !installed {
        tracing::debug!("transactional runtime already initialized, ignoring config");
    }
    installed
}

/// The process-wide coordinator, initialized from the environment on first use
pub fn coordinator() -> &'static Coordinator {
    RUNTIME.get_or_init(|| build(Config::from_env()))
}

/// Whether the process-wide runtime has been initialized
pub fn is_initialized() -> bool {
    RUNTIME.get().is_some()
}

/// Run `atomic`, falling back to `fallback` when hardware cannot complete it
///
/// See [`Coordinator::run_transactionally`].
pub fn run_transactionally<F, G, V>(atomic: &AtomicBlock<F>, fallback: Option<G>) -> Result<V>
where
    F: Fn() -> V,
    G: FnOnce() -> V,
{
    coordinator().run_transactionally(atomic, fallback)
}

/// Run `atomic` with no fallback
pub fn run<F, V>(atomic: &AtomicBlock<F>) -> Result<V>
where
    F: Fn() -> V,
{
    coordinator().run(atomic)
}

/// Run `atomic`, falling back to `fallback`
pub fn run_or_else<F, G, V>(atomic: &AtomicBlock<F>, fallback: G) -> Result<V>
where
    F: Fn() -> V,
    G: FnOnce() -> V,
{
    coordinator().run_or_else(atomic, fallback)
}

/// Commit the calling thread's transaction
pub fn commit() -> Result<()> {
    coordinator().commit()
}

/// Abort the calling thread's transaction with reason 0
pub fn abort() -> Result<()> {
    coordinator().abort()
}

/// Abort the calling thread's transaction with `reason` (0..=254)
pub fn abort_with(reason: u32) -> Result<()> {
    coordinator().abort_with(reason)
}

/// Whether the calling thread is inside a transaction
pub fn in_transaction() -> Result<bool> {
    coordinator().in_transaction()
}

/// Whether hardware transactions are available
pub fn is_supported() -> bool {
    coordinator().is_supported()
}
