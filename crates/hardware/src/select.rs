//! Capability probing and backend selection

use crate::emulated::Emulated;
use crate::traits::Htm;
use crate::unavailable::Unavailable;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which backend to run transactions on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Hardware when the processor supports it, otherwise unavailable
    #[default]
    Auto,
    /// Hardware only; unavailable (with a warning) when unsupported
    Hardware,
    /// Software emulation
    Emulated,
    /// Always unavailable
    Disabled,
}

impl BackendKind {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Auto => "auto",
            BackendKind::Hardware => "hardware",
            BackendKind::Emulated => "emulated",
            BackendKind::Disabled => "disabled",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized backend name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend {0:?}, expected auto, hardware, emulated or disabled")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "hardware" | "rtm" => Ok(BackendKind::Hardware),
            "emulated" | "software" => Ok(BackendKind::Emulated),
            "disabled" | "off" | "none" => Ok(BackendKind::Disabled),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Whether the processor supports hardware transactions
pub fn hardware_supported() -> bool {
    hardware().is_some()
}

#[cfg(target_arch = "x86_64")]
fn hardware() -> Option<Arc<dyn Htm>> {
    crate::rtm::Rtm::detect().map(|rtm| Arc::new(rtm) as Arc<dyn Htm>)
}

#[cfg(not(target_arch = "x86_64"))]
fn hardware() -> Option<Arc<dyn Htm>> {
    None
}

/// Resolve a backend kind to a backend
///
/// Queries the processor for `Auto` and `Hardware`. Call once per process
/// and keep the result; probing is not free.
pub fn select(kind: BackendKind) -> Arc<dyn Htm> {
    match kind {
        BackendKind::Auto | BackendKind::Hardware => match hardware() {
            Some(htm) => {
                tracing::debug!(backend = htm.name(), "hardware transactional memory detected");
                htm
            }
            None => {
                tracing::warn!(
                    requested = %kind,
                    "RTM not supported by current CPU, transactional execution is unavailable"
                );
                Arc::new(Unavailable)
            }
        },
        BackendKind::Emulated => Arc::new(Emulated::new()),
        BackendKind::Disabled => Arc::new(Unavailable),
    }
}
