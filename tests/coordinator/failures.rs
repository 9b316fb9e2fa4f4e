//! Failure Tests
//!
//! A panic inside an open transaction is turned into `InternalFailure`
//! after the transaction is aborted; a panic in a fallback propagates with
//! the section released.

use crate::*;
use elide::{AtomicBlock, TxError};
use std::panic::{self, AssertUnwindSafe};

fn boom() -> ! {
    panic::resume_unwind(Box::new("boom"))
}

/// Body panic: transaction aborted, error surfaced, no fallback
#[test]
fn test_body_panic_is_internal_failure() {
    let (htm, coordinator) = emulated();
    let fallback_ran = AtomicU64::new(0);
    let block = AtomicBlock::new(|| -> u32 { boom() });

    let result = coordinator.run_or_else(&block, || {
        fallback_ran.fetch_add(1, Ordering::SeqCst);
        0
    });

    assert_eq!(result, Err(TxError::InternalFailure));
    assert_eq!(fallback_ran.load(Ordering::SeqCst), 0);
    assert!(!htm.in_transaction());
    assert_eq!(htm.aborts(), 1);
    assert_eq!(coordinator.metrics().snapshot().internal_failures, 1);
}

/// The same thread can run transactions after an internal failure
#[test]
fn test_recovers_after_internal_failure() {
    let (_, coordinator) = emulated();
    let failing = AtomicBlock::new(|| -> u8 { boom() });
    assert_eq!(coordinator.run(&failing), Err(TxError::InternalFailure));

    let working = AtomicBlock::new(|| 9u8);
    assert_eq!(coordinator.run(&working), Ok(9));
}

/// Panic in a nested block fails the outermost call
#[test]
fn test_nested_panic_fails_outer() {
    let (_, coordinator) = emulated();
    let inner = AtomicBlock::new(|| -> u32 { boom() });
    let outer = AtomicBlock::new(|| coordinator.run(&inner));
    assert_eq!(coordinator.run(&outer), Err(TxError::InternalFailure));
}

/// Fallback panic propagates after the section lock is released
#[test]
fn test_fallback_panic_propagates() {
    let (_, coordinator) = emulated();
    let block = AtomicBlock::new(|| {
        coordinator.abort().unwrap();
    });

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        coordinator.run_or_else(&block, || {
            boom();
        })
    }));
    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

    let section = block.section(coordinator.registry());
    assert!(!section.is_held());

    // The section gate was released with the lock.
    let after = AtomicBlock::new(|| true);
    assert_eq!(coordinator.run(&after), Ok(true));
}
