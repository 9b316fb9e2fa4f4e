//! Free Function Tests

use crate::*;
use elide::{AtomicBlock, TxError};
use std::sync::atomic::{AtomicU64, Ordering};

#[test]
fn test_run() {
    setup();
    let block = AtomicBlock::new(|| 6 * 7);
    assert_eq!(elide::run(&block), Ok(42));
}

#[test]
fn test_run_transactionally_falls_back() {
    setup();
    let calls = AtomicU64::new(0);
    let block = AtomicBlock::new(|| {
        elide::abort().unwrap();
        false
    });
    let result = elide::run_transactionally(
        &block,
        Some(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        }),
    );
    assert_eq!(result, Ok(true));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_or_else_explicit_reason() {
    setup();
    let block = AtomicBlock::new(|| {
        elide::abort_with(77).unwrap();
        0
    });
    assert_eq!(elide::run_or_else(&block, || 77), Ok(77));
    assert_eq!(elide::run(&block), Err(TxError::ExplicitAbort { reason: 77 }));
}

#[test]
fn test_primitives_outside_transaction() {
    setup();
    assert_eq!(elide::in_transaction(), Ok(false));
    assert_eq!(elide::commit(), Err(TxError::NoActiveTransaction));
    assert_eq!(elide::abort(), Err(TxError::NoActiveTransaction));
    assert_eq!(
        elide::abort_with(255),
        Err(TxError::InvalidAbortReason { reason: 255 })
    );
}

#[test]
fn test_in_transaction_inside_block() {
    setup();
    let block = AtomicBlock::new(elide::in_transaction);
    assert_eq!(elide::run(&block), Ok(Ok(true)));
}

#[test]
fn test_metrics_accumulate() {
    setup();
    let before = elide::coordinator().metrics().snapshot().committed;
    let block = AtomicBlock::new(|| ());
    for _ in 0..5 {
        elide::run(&block).unwrap();
    }
    let after = elide::coordinator().metrics().snapshot().committed;
    assert!(after >= before + 5);
}
