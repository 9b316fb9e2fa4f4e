//! Retry Tests
//!
//! Transient aborts are replayed without the caller seeing them; a bounded
//! budget turns pathological contention into a fallback or an error.

use crate::*;
use elide::{AbortFlags, AtomicBlock, StatusWord, TxError};
use std::sync::atomic::AtomicU32;

fn transient() -> StatusWord {
    StatusWord::aborted(AbortFlags::RETRY | AbortFlags::CONFLICT)
}

/// Retry-hinted aborts are invisible to the caller
#[test]
fn test_transient_aborts_are_transparent() {
    let (htm, coordinator) = emulated();
    for _ in 0..10 {
        htm.push_status(transient());
    }
    let runs = AtomicU32::new(0);
    let block = AtomicBlock::new(|| runs.fetch_add(1, Ordering::SeqCst));

    assert_eq!(coordinator.run(&block), Ok(0));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(htm.pending(), 0);

    let metrics = coordinator.metrics().snapshot();
    assert_eq!(metrics.transient_aborts, 10);
    assert_eq!(metrics.committed, 1);
    assert_eq!(metrics.attempts(), 11);
}

/// A persistent abort goes straight to the fallback, budget untouched
#[test]
fn test_persistent_abort_skips_retry() {
    let (htm, coordinator) = emulated_with(RetryPolicy::Attempts(5));
    htm.push_status(StatusWord::aborted(AbortFlags::CONFLICT));
    htm.push_status(transient());

    let block = AtomicBlock::new(|| "hardware");
    assert_eq!(coordinator.run_or_else(&block, || "fallback"), Ok("fallback"));
    // The second scripted status was never consumed.
    assert_eq!(htm.pending(), 1);
}

/// Budget spent without a fallback surfaces the last status
#[test]
fn test_exhausted_budget_without_fallback() {
    let (htm, coordinator) = emulated_with(RetryPolicy::Attempts(4));
    for _ in 0..4 {
        htm.push_status(transient());
    }
    htm.push_status(StatusWord::aborted(AbortFlags::RETRY));

    let block = AtomicBlock::new(|| ());
    let err = coordinator.run(&block).unwrap_err();
    assert_eq!(
        err,
        TxError::RetriesExhausted {
            attempts: 4,
            last: transient()
        }
    );
    assert!(err.is_retryable());
    assert_eq!(err.status(), Some(transient()));
    assert_eq!(htm.pending(), 1);
}

/// Budget spent with a fallback runs it once
#[test]
fn test_exhausted_budget_runs_fallback() {
    let (htm, coordinator) = emulated();
    for _ in 0..3 {
        htm.push_status(transient());
    }
    let block = AtomicBlock::new(|| 1);
    let result = coordinator.execute(&block, Some(|| 2), RetryPolicy::Attempts(3));
    assert_eq!(result, Ok(2));

    let metrics = coordinator.metrics().snapshot();
    assert_eq!(metrics.transient_aborts, 3);
    assert_eq!(metrics.fallbacks, 1);
}

/// A single-attempt policy never retries
#[test]
fn test_single_attempt() {
    let (htm, coordinator) = emulated();
    htm.push_status(transient());
    htm.push_status(transient());

    let block = AtomicBlock::new(|| ());
    let result = coordinator.execute(&block, None::<fn()>, RetryPolicy::single());
    assert!(matches!(result, Err(TxError::RetriesExhausted { attempts: 1, .. })));
    assert_eq!(htm.pending(), 1);
}

/// Success within the budget returns the hardware result
#[test]
fn test_commit_within_budget() {
    let (htm, coordinator) = emulated_with(RetryPolicy::Attempts(3));
    htm.push_status(transient());
    htm.push_status(transient());

    let block = AtomicBlock::new(|| "hardware");
    assert_eq!(coordinator.run_or_else(&block, || "fallback"), Ok("hardware"));
    assert_eq!(coordinator.retry_policy(), RetryPolicy::Attempts(3));
}
