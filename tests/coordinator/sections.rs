//! Section Identity Tests
//!
//! Identity is the block object: clones and shared tags share a lock,
//! separately built blocks do not, and unused locks are reclaimed.

use crate::*;
use elide::{AtomicBlock, SectionKey};

/// Clones fall back under one lock
#[test]
fn test_clones_share_lock() {
    let (_, coordinator) = emulated();
    let body = || 1;
    let a = AtomicBlock::new(body);
    let b = a.clone();
    assert_eq!(a.key(), b.key());
    assert!(Arc::ptr_eq(
        &a.section(coordinator.registry()),
        &b.section(coordinator.registry())
    ));
}

/// Identical bodies in separate blocks are separate sections
#[test]
fn test_identical_bodies_distinct() {
    let (_, coordinator) = emulated();
    let a = AtomicBlock::new(|| 1);
    let b = AtomicBlock::new(|| 1);
    assert_ne!(a.key(), b.key());
    assert!(!Arc::ptr_eq(
        &a.section(coordinator.registry()),
        &b.section(coordinator.registry())
    ));
}

/// Locks are reclaimed once every block using them is gone
#[test]
fn test_locks_reclaimed() {
    let (_, coordinator) = emulated();
    for i in 0..100 {
        let block = AtomicBlock::new(move || i);
        assert_eq!(coordinator.run(&block), Ok(i));
    }
    assert_eq!(coordinator.registry().live(), 0);
    coordinator.registry().purge();
    assert!(coordinator.registry().is_empty());
}

/// A tag resolves to the same lock while any block holds it
#[test]
fn test_tag_lookup() {
    let (_, coordinator) = emulated();
    let block = AtomicBlock::tagged("lookup", || ());
    assert_eq!(coordinator.run(&block), Ok(()));

    let key = SectionKey::Tag("lookup");
    let registered = coordinator.registry().get(&key).unwrap();
    assert!(Arc::ptr_eq(&registered, &block.section(coordinator.registry())));
    assert_eq!(registered.key(), key);
}
