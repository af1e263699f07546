// poolalloc - Fixed-capacity pool allocator
// Address-ordered block allocator with a linked list built on top of it

#![warn(rust_2018_idioms)]

pub mod list;
pub mod memory;

// Re-exports for convenience
pub use list::{LinkedList, NodeRef};
pub use memory::{
    AllocatorConfig, BlockInfo, Coalescing, DoubleFreePolicy, FitPolicy, MemoryManager,
    PoolStats, Reference,
};

/// poolalloc error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Allocation failed: requested {requested} bytes (largest free block: {largest_free})")]
        AllocationFailure { requested: usize, largest_free: usize },

        #[error("Pool reservation failed: {0}")]
        Reservation(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Not found: {0}")]
        NotFound(String),

        #[error("Memory manager is not initialized")]
        Uninitialized,

        #[error("Memory manager is already initialized (capacity: {capacity})")]
        AlreadyInitialized { capacity: usize },

        #[error("Double free of block at offset {offset}")]
        DoubleFree { offset: usize },

        #[error("Stale reference to block at offset {offset}")]
        StaleReference { offset: usize },

        #[error("Access out of bounds: offset {offset} + {len} bytes exceeds block size {block_size}")]
        OutOfBounds {
            offset: usize,
            len: usize,
            block_size: usize,
        },

        #[error("Block table corrupted: {0}")]
        Corrupted(String),

        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Configuration error: {0}")]
        Config(#[from] config::ConfigError),

        #[error("TOML parse error: {0}")]
        TomlDecode(#[from] toml::de::Error),

        #[error("TOML serialization error: {0}")]
        TomlEncode(#[from] toml::ser::Error),
    }

    impl Error {
        /// Whether the error reports pool exhaustion (as opposed to misuse)
        pub fn is_allocation_failure(&self) -> bool {
            matches!(self, Self::AllocationFailure { .. } | Self::Reservation(_))
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;

    #[test]
    fn test_allocation_failure_classification() {
        let err = Error::AllocationFailure {
            requested: 10,
            largest_free: 4,
        };
        assert!(err.is_allocation_failure());
        assert!(Error::Reservation("out of memory".to_string()).is_allocation_failure());
        assert!(!Error::DoubleFree { offset: 0 }.is_allocation_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::OutOfBounds {
            offset: 8,
            len: 4,
            block_size: 10,
        };
        assert_eq!(
            err.to_string(),
            "Access out of bounds: offset 8 + 4 bytes exceeds block size 10"
        );
    }
}
