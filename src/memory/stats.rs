//! Pool statistics

use super::block::Block;
use serde::Serialize;

/// Snapshot of pool usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub blocks: usize,
    pub free_blocks: usize,
    /// Live allocations
    pub allocations: usize,
    pub allocated_bytes: usize,
    pub free_bytes: usize,
    pub largest_free: usize,
    /// Bytes charged for block records
    pub metadata_bytes: usize,
    pub metadata_ceiling: usize,
}

impl PoolStats {
    /// Share of capacity currently granted, 0.0 to 1.0
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.allocated_bytes as f64 / self.capacity as f64
        }
    }

    /// 1 - largest_free / free_bytes; 0.0 when all free space is contiguous
    pub fn fragmentation(&self) -> f64 {
        if self.free_bytes == 0 {
            0.0
        } else {
            1.0 - self.largest_free as f64 / self.free_bytes as f64
        }
    }
}

/// Public view of one block record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub start: usize,
    pub size: usize,
    pub free: bool,
}

impl From<&Block> for BlockInfo {
    fn from(block: &Block) -> Self {
        Self {
            start: block.start,
            size: block.size,
            free: block.is_free(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios() {
        let stats = PoolStats {
            capacity: 100,
            allocated_bytes: 25,
            free_bytes: 75,
            largest_free: 50,
            ..PoolStats::default()
        };
        assert!((stats.utilization() - 0.25).abs() < f64::EPSILON);
        assert!((stats.fragmentation() - (1.0 - 50.0 / 75.0)).abs() < 1e-9);

        let empty = PoolStats::default();
        assert_eq!(empty.utilization(), 0.0);
        assert_eq!(empty.fragmentation(), 0.0);
    }

    #[test]
    fn test_block_info_from_block() {
        let info = BlockInfo::from(&Block::new(8, 24));
        assert_eq!(
            info,
            BlockInfo {
                start: 8,
                size: 24,
                free: true
            }
        );
    }
}
