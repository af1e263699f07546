//! One pool incarnation: the byte pool plus its block table
//!
//! `Arena` holds no lock; [`MemoryManager`](super::MemoryManager) wraps it in
//! a mutex and every method here runs inside that critical section.

use super::block::BLOCK_RECORD_SIZE;
use super::config::{AllocatorConfig, Coalescing, DoubleFreePolicy};
use super::reference::Reference;
use super::stats::{BlockInfo, PoolStats};
use super::table::BlockTable;
use crate::error::{Error, Result};
use std::ops::Range;
use tracing::{debug, warn};

/// What a handle resolves to in this arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// Allocated block owned by the handle, with its size
    Live(usize),
    /// Issued by another arena or an earlier incarnation
    Foreign,
    /// No block starts at the handle's offset
    Unknown,
    AlreadyFree,
    /// Block was freed and granted again since the handle was issued
    Stale,
}

pub struct Arena {
    id: u64,
    pool: Vec<u8>,
    table: BlockTable,
    config: AllocatorConfig,
    next_generation: u64,
    allocated_bytes: usize,
    allocations: usize,
}

impl Arena {
    /// Reserve a zeroed pool of `capacity` bytes
    pub fn reserve(id: u64, capacity: usize, config: &AllocatorConfig) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }

        let mut pool = Vec::new();
        pool.try_reserve_exact(capacity).map_err(|e| {
            Error::Reservation(format!("Failed to reserve {} byte pool: {}", capacity, e))
        })?;
        pool.resize(capacity, 0);

        Ok(Self {
            id,
            pool,
            table: BlockTable::new(capacity),
            config: config.clone(),
            next_generation: 1,
            allocated_bytes: 0,
            allocations: 0,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    pub fn metadata_ceiling(&self) -> usize {
        self.config.metadata_ceiling(self.capacity())
    }

    /// Grant a block of at least `size` bytes
    pub fn allocate(&mut self, size: usize) -> Result<Reference> {
        if size == 0 {
            return Err(Error::InvalidArgument(
                "allocation size must be greater than zero".to_string(),
            ));
        }

        let Some(start) = self.table.find_fit(size, self.config.policy) else {
            let largest_free = self.table.largest_free();
            warn!(
                arena = self.id,
                requested = size,
                largest_free,
                "No free block large enough"
            );
            return Err(Error::AllocationFailure {
                requested: size,
                largest_free,
            });
        };

        let block_size = self.block_size(start)?;
        let leftover = block_size - size;
        if leftover >= self.config.split_threshold() {
            if self.table.metadata_bytes() + BLOCK_RECORD_SIZE > self.metadata_ceiling() {
                debug!(
                    arena = self.id,
                    offset = start,
                    leftover,
                    "Metadata ceiling reached, granting whole block"
                );
            } else if let Some(tail) = self.table.split(start, size) {
                debug!(arena = self.id, offset = start, tail, leftover, "Split block");
            }
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        if !self.table.mark_allocated(start, generation) {
            return Err(Error::Corrupted(format!(
                "fit search returned non-free block at offset {}",
                start
            )));
        }

        let granted = self.block_size(start)?;
        self.allocated_bytes += granted;
        self.allocations += 1;

        debug!(
            arena = self.id,
            offset = start,
            requested = size,
            granted,
            "Allocated block"
        );
        Ok(Reference::new(self.id, start, generation))
    }

    /// Release the block owned by `reference`
    pub fn free(&mut self, reference: &Reference) -> Result<()> {
        let offset = reference.offset();
        match self.lookup(reference) {
            Lookup::Live(size) => {
                self.table.mark_free(offset);
                self.allocated_bytes -= size;
                self.allocations -= 1;
                debug!(arena = self.id, offset, size, "Freed block");
                self.coalesce(offset);
                Ok(())
            }
            Lookup::Foreign | Lookup::Unknown => {
                warn!(arena = self.id, %reference, "Ignoring free of unknown reference");
                Ok(())
            }
            Lookup::AlreadyFree => match self.config.double_free {
                DoubleFreePolicy::Report => Err(Error::DoubleFree { offset }),
                DoubleFreePolicy::Tolerate => {
                    warn!(arena = self.id, offset, "Tolerating double free");
                    self.coalesce(offset);
                    Ok(())
                }
            },
            Lookup::Stale => match self.config.double_free {
                DoubleFreePolicy::Report => Err(Error::StaleReference { offset }),
                DoubleFreePolicy::Tolerate => {
                    warn!(arena = self.id, %reference, "Ignoring free of stale reference");
                    Ok(())
                }
            },
        }
    }

    /// Grow the block behind `reference`, moving it if needed
    pub fn resize(&mut self, reference: Option<&Reference>, new_size: usize) -> Result<Reference> {
        let Some(reference) = reference else {
            return self.allocate(new_size);
        };

        let old_size = match self.lookup(reference) {
            Lookup::Live(size) => size,
            _ => {
                return Err(Error::NotFound(format!(
                    "no live block for {}",
                    reference
                )))
            }
        };
        if old_size >= new_size {
            return Ok(*reference);
        }

        let moved = self.allocate(new_size)?;
        let src = reference.offset()..reference.offset() + old_size;
        self.pool.copy_within(src, moved.offset());
        self.free(reference)?;

        debug!(
            arena = self.id,
            from = reference.offset(),
            to = moved.offset(),
            old_size,
            new_size,
            "Resized block"
        );
        Ok(moved)
    }

    /// Granted size of the block behind `reference`
    pub fn size_of(&self, reference: &Reference) -> Result<usize> {
        self.live_block(reference)
    }

    /// Copy `buf.len()` bytes starting `offset` bytes into the block
    pub fn read(&self, reference: &Reference, offset: usize, buf: &mut [u8]) -> Result<()> {
        let range = self.payload_range(reference, offset, buf.len())?;
        buf.copy_from_slice(&self.pool[range]);
        Ok(())
    }

    /// Store `data` starting `offset` bytes into the block
    pub fn write(&mut self, reference: &Reference, offset: usize, data: &[u8]) -> Result<()> {
        let range = self.payload_range(reference, offset, data.len())?;
        self.pool[range].copy_from_slice(data);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let capacity = self.capacity();
        PoolStats {
            capacity,
            blocks: self.table.len(),
            free_blocks: self.table.free_count(),
            allocations: self.allocations,
            allocated_bytes: self.allocated_bytes,
            free_bytes: capacity - self.allocated_bytes,
            largest_free: self.table.largest_free(),
            metadata_bytes: self.table.metadata_bytes(),
            metadata_ceiling: self.metadata_ceiling(),
        }
    }

    pub fn blocks(&self) -> Vec<BlockInfo> {
        self.table.iter().map(BlockInfo::from).collect()
    }

    /// Verify the block table and usage counters agree
    pub fn check_invariants(&self) -> Result<()> {
        self.table.check_invariants()?;

        let (bytes, count) = self
            .table
            .iter()
            .filter(|b| !b.is_free())
            .fold((0, 0), |(bytes, count), b| (bytes + b.size, count + 1));
        if bytes != self.allocated_bytes || count != self.allocations {
            return Err(Error::Corrupted(format!(
                "counters report {} allocations / {} bytes, table holds {} / {}",
                self.allocations, self.allocated_bytes, count, bytes
            )));
        }
        if self.table.metadata_bytes() > self.metadata_ceiling() {
            return Err(Error::Corrupted(format!(
                "metadata usage {} exceeds ceiling {}",
                self.table.metadata_bytes(),
                self.metadata_ceiling()
            )));
        }
        Ok(())
    }

    fn coalesce(&mut self, offset: usize) {
        if self.table.merge_next(offset) {
            debug!(arena = self.id, offset, "Merged free successor");
        }
        if self.config.coalescing == Coalescing::Bidirectional {
            if let Some(prev) = self.table.merge_prev(offset) {
                debug!(arena = self.id, offset, into = prev, "Merged into free predecessor");
            }
        }
    }

    fn lookup(&self, reference: &Reference) -> Lookup {
        if reference.arena() != self.id {
            return Lookup::Foreign;
        }
        match self.table.get(reference.offset()) {
            None => Lookup::Unknown,
            Some(block) => match block.generation() {
                None => Lookup::AlreadyFree,
                Some(generation) if generation == reference.generation() => {
                    Lookup::Live(block.size)
                }
                Some(_) => Lookup::Stale,
            },
        }
    }

    fn live_block(&self, reference: &Reference) -> Result<usize> {
        match self.lookup(reference) {
            Lookup::Live(size) => Ok(size),
            Lookup::AlreadyFree | Lookup::Stale => Err(Error::StaleReference {
                offset: reference.offset(),
            }),
            Lookup::Foreign | Lookup::Unknown => Err(Error::NotFound(format!(
                "no block for {}",
                reference
            ))),
        }
    }

    fn payload_range(
        &self,
        reference: &Reference,
        offset: usize,
        len: usize,
    ) -> Result<Range<usize>> {
        let block_size = self.live_block(reference)?;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= block_size)
            .ok_or(Error::OutOfBounds {
                offset,
                len,
                block_size,
            })?;
        Ok(reference.offset() + offset..reference.offset() + end)
    }

    fn block_size(&self, start: usize) -> Result<usize> {
        self.table
            .get(start)
            .map(|b| b.size)
            .ok_or_else(|| Error::Corrupted(format!("no block at offset {}", start)))
    }
}
