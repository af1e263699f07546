//! Pool Allocator
//!
//! Carves allocations out of one pre-reserved byte pool. Block metadata is
//! kept outside the pool in an address-ordered table.
//!
//! # Architecture
//!
//! ```text
//! MemoryManager (Mutex)
//!   └─→ Arena (one per init)
//!        ├─→ Pool: [u8; capacity]
//!        └─→ BlockTable
//!             ├─→ 0    → Block(size=10, allocated, gen=1)
//!             ├─→ 10   → Block(size=54, free)
//!             └─→ Free index: by address (first-fit) / by (size, address) (best-fit)
//! ```
//!
//! The blocks always partition `[0, capacity)`. Allocation splits a free
//! block when the tail is worth a record and the metadata ceiling allows it.
//! Free merges the block with its free successor (and predecessor when
//! bidirectional coalescing is configured).
//!
//! Callers hold [`Reference`] handles. A handle carries the arena id and the
//! generation stamped when its block was granted, so handles from another
//! manager, an earlier `init`, or a freed block are recognised.

pub mod arena;
pub mod block;
pub mod config;
pub mod manager;
pub mod reference;
pub mod stats;
pub mod table;

pub use block::{Block, BlockState, BLOCK_RECORD_SIZE};
pub use config::{AllocatorConfig, Coalescing, DoubleFreePolicy, FitPolicy};
pub use manager::MemoryManager;
pub use reference::Reference;
pub use stats::{BlockInfo, PoolStats};
pub use table::BlockTable;
