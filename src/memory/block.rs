//! Block records for the pool allocator

use std::fmt;

/// Bytes charged against the metadata ceiling for every block record.
///
/// Matches the in-memory size of [`Block`] on 64-bit targets; fixed so the
/// ceiling behaves the same on every platform.
pub const BLOCK_RECORD_SIZE: usize = 32;

/// Allocation state of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Free,
    /// Granted to a caller; `generation` is stamped into the caller's handle
    Allocated { generation: u64 },
}

/// One contiguous region of the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Offset of the first byte within the pool
    pub start: usize,
    /// Size in bytes
    pub size: usize,
    pub state: BlockState,
}

impl Block {
    /// Create a new free block
    pub fn new(start: usize, size: usize) -> Self {
        Self {
            start,
            size,
            state: BlockState::Free,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == BlockState::Free
    }

    /// Generation of the current grant, if allocated
    pub fn generation(&self) -> Option<u64> {
        match self.state {
            BlockState::Free => None,
            BlockState::Allocated { generation } => Some(generation),
        }
    }

    /// One past the last byte of this block
    pub fn end(&self) -> usize {
        self.start + self.size
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            BlockState::Free => write!(f, "Block({}..{}, free)", self.start, self.end()),
            BlockState::Allocated { generation } => {
                write!(f, "Block({}..{}, gen={})", self.start, self.end(), generation)
            }
        }
    }
}
