//! Runtime configuration
//!
//! Built in code with the setters below, or read from the environment:
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `ELIDE_BACKEND` | `auto`, `hardware`, `emulated`, `disabled` | `auto` |
//! | `ELIDE_MAX_ATTEMPTS` | attempt count, `0` for unbounded | unbounded |
//!
//! Malformed values are logged and ignored.

use elide_concurrency::{RetryPolicy, DEFAULT_PRUNE_THRESHOLD};
use elide_hardware::BackendKind;

/// Environment variable selecting the backend
pub const BACKEND_ENV: &str = "ELIDE_BACKEND";

/// Environment variable bounding speculative attempts
pub const MAX_ATTEMPTS_ENV: &str = "ELIDE_MAX_ATTEMPTS";

/// Configuration of the process-wide runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Which transactional memory backend to use
    pub backend: BackendKind,
    /// Default retry policy for transient aborts
    pub retry: RetryPolicy,
    /// Section registry size at which dead entries are swept
    pub prune_threshold: usize,
}

impl Config {
    /// Default configuration: auto-detected backend, unbounded retry
    pub fn new() -> Self {
        Self {
            backend: BackendKind::Auto,
            retry: RetryPolicy::Unbounded,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
        }
    }

    /// Configuration from `ELIDE_BACKEND` and `ELIDE_MAX_ATTEMPTS`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();

        if let Some(value) = lookup(BACKEND_ENV) {
            match value.parse::<BackendKind>() {
                Ok(kind) => config.backend = kind,
                Err(e) => tracing::warn!(variable = BACKEND_ENV, error = %e, "ignoring malformed value"),
            }
        }

        if let Some(value) = lookup(MAX_ATTEMPTS_ENV) {
            match value.trim().parse::<u32>() {
                Ok(0) => config.retry = RetryPolicy::Unbounded,
                Ok(max) => config.retry = RetryPolicy::Attempts(max),
                Err(e) => tracing::warn!(
                    variable = MAX_ATTEMPTS_ENV,
                    value = %value,
                    error = %e,
                    "ignoring malformed value"
                ),
            }
        }

        config
    }

    /// Use the backend of `kind`
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.backend = kind;
        self
    }

    /// Default retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bound speculative attempts, `None` for unbounded
    pub fn max_attempts(self, max: Option<u32>) -> Self {
        self.retry(RetryPolicy::from(max))
    }

    /// Registry size at which dead sections are swept
    pub fn prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
