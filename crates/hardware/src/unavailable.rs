//! Backend for processors without transactional memory

use crate::traits::Htm;
use elide_core::SectionKey;

/// Reports the capability as absent; every primitive is inert
///
/// The coordinator checks [`Htm::is_supported`] once and never issues a
/// primitive afterwards, so the inert answers below are never relied on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl Htm for Unavailable {
    fn is_supported(&self) -> bool {
        false
    }

    fn in_transaction(&self) -> bool {
        false
    }

    fn speculate(&self, _section: SectionKey, _region: &mut dyn FnMut()) -> u32 {
        0
    }

    fn commit(&self) -> bool {
        false
    }

    fn abort(&self, _reason: u8) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
