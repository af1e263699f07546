//! End-to-end allocator behaviour: partitioning, exhaustion, coalescing,
//! resize and double free

use poolalloc::error::{Error, Result};
use poolalloc::memory::{
    AllocatorConfig, Coalescing, DoubleFreePolicy, FitPolicy, MemoryManager, Reference,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn block_total(manager: &MemoryManager) -> Result<usize> {
    Ok(manager.blocks()?.iter().map(|b| b.size).sum())
}

#[test]
fn test_blocks_always_cover_capacity() -> Result<()> {
    let configs = [
        AllocatorConfig::with_capacity(8192),
        AllocatorConfig::with_capacity(8192).policy(FitPolicy::BestFit),
        AllocatorConfig::with_capacity(8192).coalescing(Coalescing::Bidirectional),
        AllocatorConfig::with_capacity(8192)
            .policy(FitPolicy::BestFit)
            .coalescing(Coalescing::Bidirectional)
            .metadata_ceiling_percent(100),
    ];

    for (seed, config) in configs.into_iter().enumerate() {
        let manager = MemoryManager::init(config)?;
        let mut rng = StdRng::seed_from_u64(seed as u64);
        let mut live: Vec<Reference> = Vec::new();

        for _ in 0..2_000 {
            if live.is_empty() || rng.gen_bool(0.6) {
                if let Ok(r) = manager.allocate(rng.gen_range(1..=300)) {
                    live.push(r);
                }
            } else {
                let r = live.swap_remove(rng.gen_range(0..live.len()));
                manager.free(r)?;
            }
            assert_eq!(block_total(&manager)?, 8192);
        }
        manager.check_invariants()?;

        for r in live.drain(..) {
            manager.free(r)?;
        }
        let stats = manager.stats()?;
        assert_eq!(stats.allocations, 0);
        assert_eq!(stats.free_bytes, 8192);
        manager.check_invariants()?;
    }
    Ok(())
}

#[test]
fn test_exact_exhaustion_then_fail() -> Result<()> {
    let manager = MemoryManager::with_capacity(256)?;
    for _ in 0..4 {
        manager.allocate(64)?;
    }

    let stats = manager.stats()?;
    assert_eq!(stats.allocated_bytes, 256);
    assert_eq!(stats.free_blocks, 0);

    let err = manager.allocate(1).unwrap_err();
    assert!(matches!(
        err,
        Error::AllocationFailure {
            requested: 1,
            largest_free: 0
        }
    ));
    assert_eq!(block_total(&manager)?, 256);
    manager.check_invariants()
}

#[test]
fn test_forward_coalescing_of_adjacent_blocks() -> Result<()> {
    let manager = MemoryManager::with_capacity(256)?;
    let a = manager.allocate(128)?;
    let b = manager.allocate(128)?;
    assert_eq!(b.offset(), a.offset() + 128);

    // Later block first, so freeing `a` merges its free successor
    manager.free(b)?;
    manager.free(a)?;
    assert_eq!(manager.blocks()?.len(), 1);

    let whole = manager.allocate(256)?;
    assert_eq!(whole.offset(), 0);
    manager.check_invariants()
}

#[test]
fn test_forward_coalescing_leaves_free_predecessor() -> Result<()> {
    let manager = MemoryManager::with_capacity(256)?;
    let a = manager.allocate(128)?;
    let b = manager.allocate(128)?;

    manager.free(a)?;
    manager.free(b)?;

    // Two adjacent free blocks remain: no backward merge
    let blocks = manager.blocks()?;
    assert_eq!(blocks.len(), 2);
    assert!(blocks.iter().all(|b| b.free));
    assert!(manager.allocate(256).is_err());
    manager.check_invariants()
}

#[test]
fn test_bidirectional_coalescing_in_any_order() -> Result<()> {
    let manager = MemoryManager::init(
        AllocatorConfig::with_capacity(256).coalescing(Coalescing::Bidirectional),
    )?;
    let a = manager.allocate(128)?;
    let b = manager.allocate(128)?;

    manager.free(a)?;
    manager.free(b)?;
    assert_eq!(manager.blocks()?.len(), 1);
    assert!(manager.allocate(256).is_ok());
    manager.check_invariants()
}

#[test]
fn test_resize_smaller_keeps_reference() -> Result<()> {
    let manager = MemoryManager::with_capacity(1024)?;
    let a = manager.allocate(100)?;
    assert_eq!(manager.resize(Some(a), 40)?, a);
    assert_eq!(manager.resize(Some(a), 100)?, a);
    assert_eq!(manager.size_of(a)?, 100);
    Ok(())
}

#[test]
fn test_resize_larger_preserves_content() -> Result<()> {
    let manager = MemoryManager::with_capacity(1024)?;
    let a = manager.allocate(32)?;
    let content: Vec<u8> = (0..32).collect();
    manager.write(a, 0, &content)?;

    let b = manager.resize(Some(a), 200)?;
    assert_ne!(a.offset(), b.offset());
    assert!(manager.size_of(b)? >= 200);

    let mut copied = vec![0u8; 32];
    manager.read(b, 0, &mut copied)?;
    assert_eq!(copied, content);

    // The old block was released
    assert_eq!(manager.stats()?.allocations, 1);
    manager.check_invariants()
}

#[test]
fn test_resize_failure_keeps_old_block() -> Result<()> {
    let manager = MemoryManager::with_capacity(256)?;
    let a = manager.allocate(64)?;
    manager.write(a, 0, b"keep")?;

    let err = manager.resize(Some(a), 1024).unwrap_err();
    assert!(err.is_allocation_failure());

    let mut buf = [0u8; 4];
    manager.read(a, 0, &mut buf)?;
    assert_eq!(&buf, b"keep");
    assert_eq!(manager.stats()?.allocations, 1);
    Ok(())
}

#[test]
fn test_freed_slot_is_reused() -> Result<()> {
    for policy in [FitPolicy::FirstFit, FitPolicy::BestFit] {
        let manager = MemoryManager::init(AllocatorConfig::with_capacity(64).policy(policy))?;
        let a = manager.allocate(10)?;
        let b = manager.allocate(10)?;
        manager.free(a)?;

        let c = manager.allocate(10)?;
        assert_eq!(c.offset(), a.offset(), "policy {:?}", policy);
        assert_ne!(c.offset(), b.offset());
        assert_eq!(block_total(&manager)?, 64);
        manager.check_invariants()?;
    }
    Ok(())
}

#[test]
fn test_double_free_does_not_corrupt_table() -> Result<()> {
    for double_free in [DoubleFreePolicy::Report, DoubleFreePolicy::Tolerate] {
        let manager = MemoryManager::init(
            AllocatorConfig::with_capacity(256).double_free(double_free),
        )?;
        let a = manager.allocate(8)?;
        manager.free(a)?;

        let second = manager.free(a);
        match double_free {
            DoubleFreePolicy::Report => {
                assert!(matches!(second, Err(Error::DoubleFree { .. })))
            }
            DoubleFreePolicy::Tolerate => assert!(second.is_ok()),
        }

        manager.check_invariants()?;
        let b = manager.allocate(8)?;
        assert_eq!(manager.size_of(b)?, 8);
        assert_eq!(block_total(&manager)?, 256);
    }
    Ok(())
}

#[test]
fn test_independent_managers() -> Result<()> {
    let first = MemoryManager::with_capacity(128)?;
    let second = MemoryManager::with_capacity(128)?;

    let a = first.allocate(16)?;
    let b = second.allocate(16)?;
    assert_eq!(a.offset(), b.offset());
    assert_ne!(a, b);

    // A handle from another manager is ignored
    second.free(a)?;
    assert_eq!(second.stats()?.allocations, 1);
    first.free(a)?;
    assert_eq!(first.stats()?.allocations, 0);
    Ok(())
}

#[test]
fn test_metadata_stays_under_ceiling() -> Result<()> {
    let manager = MemoryManager::with_capacity(10_000)?;
    while manager.allocate(8).is_ok() {}

    let stats = manager.stats()?;
    assert_eq!(stats.metadata_ceiling, 2_000);
    assert!(stats.metadata_bytes <= stats.metadata_ceiling);
    assert_eq!(stats.free_blocks, 0);
    manager.check_invariants()
}
