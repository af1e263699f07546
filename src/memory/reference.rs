//! Opaque handles to allocated blocks

use std::fmt;

/// Handle to a block granted by a [`MemoryManager`](super::MemoryManager)
///
/// Handles are plain values: copying one does not extend the block's
/// lifetime. A handle is only meaningful to the manager incarnation that
/// issued it and only until its block is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    arena: u64,
    offset: usize,
    generation: u64,
}

impl Reference {
    pub(crate) fn new(arena: u64, offset: usize, generation: u64) -> Self {
        Self {
            arena,
            offset,
            generation,
        }
    }

    /// Build a handle into the same arena as `self`
    pub(crate) fn sibling(&self, offset: usize, generation: u64) -> Self {
        Self::new(self.arena, offset, generation)
    }

    /// Offset of the block within the pool
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Generation stamped when the block was granted
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Identifier of the pool incarnation that issued this handle
    pub fn arena(&self) -> u64 {
        self.arena
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ref(arena={}, offset={}, gen={})",
            self.arena, self.offset, self.generation
        )
    }
}
