//! Thread-safe memory manager
//!
//! Every public operation takes the manager's lock for its whole body, so
//! operations are totally ordered. Separate calls do not compose: a `read`
//! followed by a `free` is two critical sections.

use super::arena::Arena;
use super::config::AllocatorConfig;
use super::reference::Reference;
use super::stats::{BlockInfo, PoolStats};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info};

/// Source of arena ids, unique for the life of the process
static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Fixed-capacity pool allocator
///
/// Created uninitialized with [`MemoryManager::new`] or ready to use with
/// [`MemoryManager::init`]. After [`deinit`](Self::deinit) the manager can
/// be initialized again; handles from the previous pool are then foreign.
pub struct MemoryManager {
    config: AllocatorConfig,
    arena: Mutex<Option<Arena>>,
}

impl MemoryManager {
    /// Create an uninitialized manager
    pub fn new(config: AllocatorConfig) -> Self {
        Self {
            config,
            arena: Mutex::new(None),
        }
    }

    /// Create a manager and reserve a pool of `config.capacity` bytes
    pub fn init(config: AllocatorConfig) -> Result<Self> {
        config.validate()?;
        let capacity = config.capacity;
        let manager = Self::new(config);
        manager.init_pool(capacity)?;
        Ok(manager)
    }

    /// Default configuration with the given capacity
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::init(AllocatorConfig::with_capacity(capacity))
    }

    /// Reserve a pool of `capacity` bytes holding one free block
    ///
    /// Fails with `AlreadyInitialized` if a pool is live; call
    /// [`deinit`](Self::deinit) first.
    pub fn init_pool(&self, capacity: usize) -> Result<()> {
        let mut guard = self.arena.lock();
        if let Some(arena) = guard.as_ref() {
            return Err(Error::AlreadyInitialized {
                capacity: arena.capacity(),
            });
        }

        let id = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);
        let arena = Arena::reserve(id, capacity, &self.config).map_err(|e| {
            error!(capacity, error = %e, "Pool initialization failed");
            e
        })?;

        info!(
            arena = id,
            capacity,
            policy = ?self.config.policy,
            coalescing = ?self.config.coalescing,
            metadata_ceiling = arena.metadata_ceiling(),
            "Initialized memory pool"
        );
        *guard = Some(arena);
        Ok(())
    }

    /// Allocate a block of at least `size` bytes
    pub fn allocate(&self, size: usize) -> Result<Reference> {
        self.with_arena(|arena| arena.allocate(size))
    }

    /// Release a block
    ///
    /// Handles this pool never issued are ignored. Double frees and stale
    /// handles follow the configured [`DoubleFreePolicy`](super::DoubleFreePolicy).
    pub fn free(&self, reference: Reference) -> Result<()> {
        self.with_arena(|arena| arena.free(&reference))
    }

    /// Resize a block; `None` allocates a new one
    ///
    /// Returns the same handle when the block is already large enough.
    /// Otherwise the content moves to a new block and the old one is freed.
    /// On failure the old block stays valid.
    pub fn resize(&self, reference: Option<Reference>, new_size: usize) -> Result<Reference> {
        self.with_arena(|arena| arena.resize(reference.as_ref(), new_size))
    }

    /// Release the pool and every block record
    pub fn deinit(&self) {
        let mut guard = self.arena.lock();
        if let Some(arena) = guard.take() {
            let stats = arena.stats();
            info!(
                arena = arena.id(),
                capacity = stats.capacity,
                live_allocations = stats.allocations,
                "Released memory pool"
            );
        }
    }

    /// Copy bytes out of a block, starting `offset` bytes into it
    pub fn read(&self, reference: Reference, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.with_arena(|arena| arena.read(&reference, offset, buf))
    }

    /// Copy bytes into a block, starting `offset` bytes into it
    pub fn write(&self, reference: Reference, offset: usize, data: &[u8]) -> Result<()> {
        self.with_arena(|arena| arena.write(&reference, offset, data))
    }

    /// Granted size of a block (may exceed the requested size)
    pub fn size_of(&self, reference: Reference) -> Result<usize> {
        self.with_arena(|arena| arena.size_of(&reference))
    }

    pub fn stats(&self) -> Result<PoolStats> {
        self.with_arena(|arena| Ok(arena.stats()))
    }

    /// Block records in address order
    pub fn blocks(&self) -> Result<Vec<BlockInfo>> {
        self.with_arena(|arena| Ok(arena.blocks()))
    }

    pub fn check_invariants(&self) -> Result<()> {
        self.with_arena(|arena| arena.check_invariants())
    }

    pub fn is_initialized(&self) -> bool {
        self.arena.lock().is_some()
    }

    /// Capacity of the live pool
    pub fn capacity(&self) -> Option<usize> {
        self.arena.lock().as_ref().map(Arena::capacity)
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    fn with_arena<T>(&self, op: impl FnOnce(&mut Arena) -> Result<T>) -> Result<T> {
        let mut guard = self.arena.lock();
        let arena = guard.as_mut().ok_or(Error::Uninitialized)?;
        op(arena)
    }
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryManager")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
