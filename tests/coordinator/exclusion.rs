//! Mutual Exclusion Tests
//!
//! Two writers bump a pair of counters through the same critical section,
//! some rounds speculatively and some through forced fallbacks, while a
//! reader checks the pair is never observed torn. Unrelated sections must
//! never wait on each other, and a nested block must respect its own
//! section's fallback.

use crate::*;
use elide::{AbortFlags, AtomicBlock, SectionKey, StatusWord, TxError, INTERNAL_FAILURE};
use elide_hardware::Emulated;
use rand::Rng;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const WRITERS: usize = 2;
const ROUNDS: usize = 2_000;

/// x == y at every observable point, whichever path each round took
#[test]
fn test_pair_never_torn() {
    let (htm, coordinator) = emulated();
    let coordinator = Arc::new(coordinator);
    let pair = Arc::new(Pair::default());
    let done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(WRITERS + 1));

    let writers: Vec<_> = (0..WRITERS)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let htm = Arc::clone(&htm);
            let pair = Arc::clone(&pair);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let block = AtomicBlock::tagged("pair", || pair.bump());
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..ROUNDS {
                    if rng.gen_ratio(1, 4) {
                        htm.push_status(StatusWord::aborted(AbortFlags::CONFLICT));
                    }
                    coordinator.run_or_else(&block, || pair.bump()).unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let coordinator = Arc::clone(&coordinator);
        let pair = Arc::clone(&pair);
        let done = Arc::clone(&done);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let block = AtomicBlock::tagged("pair", || pair.read());
            let mut observed = 0u64;
            barrier.wait();
            while !done.load(Ordering::Acquire) {
                let (x, y) = coordinator
                    .run_or_else(&block, || pair.read())
                    .unwrap();
                assert_eq!(x, y, "torn read");
                observed += 1;
            }
            observed
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Release);
    assert!(reader.join().unwrap() > 0);

    let total = (WRITERS * ROUNDS) as u64;
    assert_eq!(pair.read(), (total, total));

    let metrics = coordinator.metrics().snapshot();
    assert!(metrics.fallbacks > 0, "no fallback was forced");
    assert!(metrics.committed > 0, "nothing committed speculatively");

    // Every block was dropped with its thread, and the lock with them.
    assert!(coordinator.registry().get(&SectionKey::Tag("pair")).is_none());
}

/// Fallbacks on one section never overlap
#[test]
fn test_fallbacks_serialized_per_section() {
    let (htm, coordinator) = emulated();
    let coordinator = Arc::new(coordinator);
    let inside = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let htm = Arc::clone(&htm);
            let inside = Arc::clone(&inside);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let block = AtomicBlock::tagged("serial", || ());
                barrier.wait();
                for _ in 0..200 {
                    // Another thread may consume the status first.
                    htm.push_status(StatusWord::aborted(AbortFlags::CAPACITY));
                    coordinator
                        .run_or_else(&block, || {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(inside.load(Ordering::SeqCst), 0);

    // Each call ends in exactly one commit or one fallback.
    let metrics = coordinator.metrics().snapshot();
    assert!(metrics.fallbacks > 0);
    assert_eq!(metrics.committed + metrics.fallbacks, 800);
}

/// Fallbacks of unrelated sections run at the same time
#[test]
fn test_distinct_sections_fall_back_concurrently() {
    let (htm, coordinator) = emulated();
    let coordinator = Arc::new(coordinator);
    let right_ran = Arc::new(AtomicBool::new(false));
    let (entered_tx, entered_rx) = mpsc::channel();

    htm.push_status(StatusWord::aborted(AbortFlags::CAPACITY));
    let left = {
        let coordinator = Arc::clone(&coordinator);
        let right_ran = Arc::clone(&right_ran);
        thread::spawn(move || {
            let block = AtomicBlock::tagged("left", || false);
            coordinator
                .run_or_else(&block, || {
                    entered_tx.send(()).unwrap();
                    let deadline = Instant::now() + Duration::from_secs(2);
                    while !right_ran.load(Ordering::Acquire) && Instant::now() < deadline {
                        thread::yield_now();
                    }
                    right_ran.load(Ordering::Acquire)
                })
                .unwrap()
        })
    };

    // "left" is now inside its fallback.
    entered_rx.recv().unwrap();
    htm.push_status(StatusWord::aborted(AbortFlags::CAPACITY));
    let right = AtomicBlock::tagged("right", || ());
    coordinator
        .run_or_else(&right, || right_ran.store(true, Ordering::Release))
        .unwrap();

    assert!(
        left.join().unwrap(),
        "fallback of 'right' could not run while 'left' fell back"
    );
    assert_eq!(coordinator.metrics().snapshot().fallbacks, 2);
}

/// Speculation on one section proceeds while another section falls back
#[test]
fn test_speculation_unaffected_by_other_fallback() {
    let (htm, coordinator) = emulated();
    let coordinator = Arc::new(coordinator);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    htm.push_status(StatusWord::aborted(AbortFlags::CAPACITY));
    let slow = {
        let coordinator = Arc::clone(&coordinator);
        thread::spawn(move || {
            let block = AtomicBlock::tagged("slow", || ());
            coordinator
                .run_or_else(&block, || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
                .unwrap();
        })
    };

    entered_rx.recv().unwrap();
    let fast = AtomicBlock::tagged("fast", || 5);
    for _ in 0..100 {
        assert_eq!(coordinator.run(&fast), Ok(5));
    }
    release_tx.send(()).unwrap();
    slow.join().unwrap();
    assert_eq!(htm.commits(), 100);
}

/// A nested block checks its own section, not just the outermost one
#[test]
fn test_nested_block_checks_own_section() {
    init_tracing();
    let spy = Arc::new(Spy::new(Arc::new(Emulated::new()), true));
    let coordinator = Coordinator::builder()
        .backend(spy.clone())
        .registry(Arc::new(SectionRegistry::new()))
        .build();
    let pair = Pair::default();
    let inner = AtomicBlock::tagged("inner", || pair.read());
    let outer = AtomicBlock::tagged("outer", || coordinator.run(&inner).unwrap());

    assert_eq!(coordinator.run(&outer), Ok((0, 0)));
    assert_eq!(
        spy.sections(),
        vec![SectionKey::Tag("outer"), SectionKey::Tag("inner")]
    );
    assert_eq!(
        spy.calls(),
        vec!["in_transaction", "speculate", "in_transaction", "speculate", "commit", "commit"]
    );

    // A writer is halfway through the inner section's fallback.
    let section = inner.section(coordinator.registry());
    thread::scope(|scope| {
        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let writer = {
            let section = &section;
            let pair = &pair;
            scope.spawn(move || {
                let _guard = section.lock();
                pair.x.store(1, Ordering::Relaxed);
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                pair.y.store(1, Ordering::Relaxed);
            })
        };
        held_rx.recv().unwrap();

        let result = coordinator.execute(&outer, None::<fn() -> (u64, u64)>, RetryPolicy::Attempts(4));
        match result {
            Err(TxError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(last.is_nested());
                assert_eq!(last.explicit_reason(), Some(INTERNAL_FAILURE));
            }
            other => panic!("torn or unexpected result {:?}", other),
        }

        release_tx.send(()).unwrap();
        writer.join().unwrap();
    });

    assert_eq!(coordinator.run(&outer), Ok((1, 1)));
    assert!(spy.calls().contains(&"abort"));
    assert_eq!(coordinator.metrics().snapshot().contended, 4);
}

/// An attempt waits out a live fallback on its section before speculating
#[test]
fn test_attempt_waits_for_live_fallback() {
    let (_, coordinator) = emulated();
    let block = AtomicBlock::tagged("wait", || 7);
    let section = block.section(coordinator.registry());
    let barrier = Arc::new(Barrier::new(2));

    let holder = {
        let section = Arc::clone(&section);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let _guard = section.lock();
            barrier.wait();
            thread::sleep(std::time::Duration::from_millis(20));
        })
    };

    barrier.wait();
    assert_eq!(coordinator.run(&block), Ok(7));
    // The fallback had finished before the commit.
    assert!(!section.is_held());
    assert_eq!(section.fallbacks(), 1);
    holder.join().unwrap();
}
