//! Linked list on top of the pool allocator
//!
//! ```text
//! head ─→ [1 | ●]─→ [2 | ●]─→ [3 | ∅]
//!          pool@0    pool@24   pool@48
//! ```
//!
//! Nodes are allocated one at a time from a [`MemoryManager`](crate::memory::MemoryManager)
//! and encoded into the pool. The list only ever sees [`Reference`](crate::memory::Reference)
//! handles, never block internals.

pub mod linked_list;
pub mod node;

pub use linked_list::LinkedList;
pub use node::{Node, NodeRef, NodeValue, NODE_SIZE};
