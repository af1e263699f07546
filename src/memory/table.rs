//! Address-ordered block table
//!
//! Blocks are keyed by their start offset, so successor and predecessor
//! lookups are ordered-map range queries. Free blocks are additionally
//! indexed two ways:
//!
//! ```text
//! free_by_addr: {10, 96, 400}                 → first-fit scans in address order
//! free_by_size: {(16, 96), (54, 10), (600, 400)} → best-fit is one range query
//! ```

use super::block::{Block, BlockState, BLOCK_RECORD_SIZE};
use super::config::FitPolicy;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Block records partitioning `[0, capacity)`
#[derive(Debug)]
pub struct BlockTable {
    capacity: usize,
    blocks: BTreeMap<usize, Block>,
    free_by_addr: BTreeSet<usize>,
    free_by_size: BTreeSet<(usize, usize)>,
}

impl BlockTable {
    /// Create a table holding one free block spanning the whole pool
    pub fn new(capacity: usize) -> Self {
        let mut table = Self {
            capacity,
            blocks: BTreeMap::new(),
            free_by_addr: BTreeSet::new(),
            free_by_size: BTreeSet::new(),
        };
        table.blocks.insert(0, Block::new(0, capacity));
        table.index_free(0, capacity);
        table
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of block records
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytes charged for block records
    pub fn metadata_bytes(&self) -> usize {
        self.blocks.len() * BLOCK_RECORD_SIZE
    }

    pub fn free_count(&self) -> usize {
        self.free_by_addr.len()
    }

    /// Size of the largest free block, 0 if none
    pub fn largest_free(&self) -> usize {
        self.free_by_size
            .iter()
            .next_back()
            .map(|&(size, _)| size)
            .unwrap_or(0)
    }

    pub fn get(&self, start: usize) -> Option<&Block> {
        self.blocks.get(&start)
    }

    /// Blocks in ascending address order
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Block immediately after the one starting at `start`
    pub fn successor(&self, start: usize) -> Option<&Block> {
        self.blocks.range(start + 1..).next().map(|(_, b)| b)
    }

    /// Block immediately before the one starting at `start`
    pub fn predecessor(&self, start: usize) -> Option<&Block> {
        self.blocks.range(..start).next_back().map(|(_, b)| b)
    }

    /// Start of the free block chosen for a request of `size` bytes
    pub fn find_fit(&self, size: usize, policy: FitPolicy) -> Option<usize> {
        match policy {
            FitPolicy::FirstFit => self
                .free_by_addr
                .iter()
                .copied()
                .find(|start| self.blocks.get(start).is_some_and(|b| b.size >= size)),
            FitPolicy::BestFit => self
                .free_by_size
                .range((size, 0)..)
                .next()
                .map(|&(_, start)| start),
        }
    }

    /// Shrink the free block at `start` to `size` bytes and insert a free
    /// block covering the remainder. Returns the start of the new block.
    pub fn split(&mut self, start: usize, size: usize) -> Option<usize> {
        let block = self.blocks.get(&start)?;
        if !block.is_free() || size == 0 || size >= block.size {
            return None;
        }
        let old_size = block.size;
        let tail_start = start + size;
        let tail_size = old_size - size;

        self.unindex_free(start, old_size);
        if let Some(block) = self.blocks.get_mut(&start) {
            block.size = size;
        }
        self.index_free(start, size);

        self.blocks.insert(tail_start, Block::new(tail_start, tail_size));
        self.index_free(tail_start, tail_size);
        Some(tail_start)
    }

    /// Grant the free block at `start`. Returns false if it is not free.
    pub fn mark_allocated(&mut self, start: usize, generation: u64) -> bool {
        let Some(block) = self.blocks.get_mut(&start) else {
            return false;
        };
        if !block.is_free() {
            return false;
        }
        block.state = BlockState::Allocated { generation };
        let size = block.size;
        self.unindex_free(start, size);
        true
    }

    /// Mark the block at `start` free. Returns false if no block starts there.
    pub fn mark_free(&mut self, start: usize) -> bool {
        let Some(block) = self.blocks.get_mut(&start) else {
            return false;
        };
        if block.is_free() {
            return true;
        }
        block.state = BlockState::Free;
        let size = block.size;
        self.index_free(start, size);
        true
    }

    /// Merge the free successor into the free block at `start`
    pub fn merge_next(&mut self, start: usize) -> bool {
        let Some(block) = self.blocks.get(&start) else {
            return false;
        };
        if !block.is_free() {
            return false;
        }
        let size = block.size;
        let Some(next) = self.successor(start) else {
            return false;
        };
        if !next.is_free() {
            return false;
        }
        let (next_start, next_size) = (next.start, next.size);

        self.unindex_free(next_start, next_size);
        self.blocks.remove(&next_start);

        self.unindex_free(start, size);
        if let Some(block) = self.blocks.get_mut(&start) {
            block.size = size + next_size;
        }
        self.index_free(start, size + next_size);
        true
    }

    /// Merge the free block at `start` into a free predecessor.
    /// Returns the start of the surviving block.
    pub fn merge_prev(&mut self, start: usize) -> Option<usize> {
        let prev = self.predecessor(start)?;
        if !prev.is_free() {
            return None;
        }
        let prev_start = prev.start;
        self.merge_next(prev_start).then_some(prev_start)
    }

    /// Verify partitioning and index consistency
    pub fn check_invariants(&self) -> Result<()> {
        let mut expected = 0;
        let mut free = 0;
        for (&start, block) in &self.blocks {
            if start != block.start || start != expected {
                return Err(Error::Corrupted(format!(
                    "gap or overlap at offset {} (expected {})",
                    start, expected
                )));
            }
            if block.size == 0 {
                return Err(Error::Corrupted(format!("empty block at offset {}", start)));
            }
            if block.is_free() {
                free += 1;
                if !self.free_by_addr.contains(&start)
                    || !self.free_by_size.contains(&(block.size, start))
                {
                    return Err(Error::Corrupted(format!(
                        "free block at offset {} missing from free index",
                        start
                    )));
                }
            }
            expected = block.end();
        }
        if expected != self.capacity {
            return Err(Error::Corrupted(format!(
                "blocks cover {} bytes, capacity is {}",
                expected, self.capacity
            )));
        }
        if free != self.free_by_addr.len() || free != self.free_by_size.len() {
            return Err(Error::Corrupted(format!(
                "free index holds {} / {} entries for {} free blocks",
                self.free_by_addr.len(),
                self.free_by_size.len(),
                free
            )));
        }
        Ok(())
    }

    fn index_free(&mut self, start: usize, size: usize) {
        self.free_by_addr.insert(start);
        self.free_by_size.insert((size, start));
    }

    fn unindex_free(&mut self, start: usize, size: usize) {
        self.free_by_addr.remove(&start);
        self.free_by_size.remove(&(size, start));
    }
}
