//! Node layout inside the pool
//!
//! ```text
//! 0      2     3        8              16             24
//! ┌──────┬─────┬────────┬──────────────┬──────────────┐
//! │value │ tag │ unused │ next offset  │ next gen     │
//! │ u16  │ u8  │        │ u64 (LE)     │ u64 (LE)     │
//! └──────┴─────┴────────┴──────────────┴──────────────┘
//! ```
//!
//! `tag` is 1 when a successor exists. The successor always lives in the
//! same arena as the node, so the arena id is not stored.

use crate::memory::Reference;
use std::fmt;

/// Bytes allocated per node
pub const NODE_SIZE: usize = 24;

const VALUE: usize = 0;
const TAG: usize = 2;
const NEXT_OFFSET: usize = 8;
const NEXT_GENERATION: usize = 16;

/// Value stored in a list node
pub type NodeValue = u16;

/// Handle to a list node
///
/// Valid until the next structural change of the list that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(pub(crate) Reference);

impl NodeRef {
    /// Underlying allocator handle
    pub fn reference(&self) -> Reference {
        self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node@{}", self.0.offset())
    }
}

/// Decoded node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub value: NodeValue,
    pub next: Option<Reference>,
}

impl Node {
    pub fn new(value: NodeValue, next: Option<Reference>) -> Self {
        Self { value, next }
    }

    pub fn encode(&self) -> [u8; NODE_SIZE] {
        let mut bytes = [0u8; NODE_SIZE];
        bytes[VALUE..VALUE + 2].copy_from_slice(&self.value.to_le_bytes());
        if let Some(next) = self.next {
            bytes[TAG] = 1;
            bytes[NEXT_OFFSET..NEXT_OFFSET + 8].copy_from_slice(&(next.offset() as u64).to_le_bytes());
            bytes[NEXT_GENERATION..NEXT_GENERATION + 8]
                .copy_from_slice(&next.generation().to_le_bytes());
        }
        bytes
    }

    /// Decode the bytes of the node stored at `at`
    pub fn decode(at: &Reference, bytes: &[u8; NODE_SIZE]) -> Self {
        let value = NodeValue::from_le_bytes([bytes[VALUE], bytes[VALUE + 1]]);
        let next = (bytes[TAG] == 1).then(|| {
            at.sibling(
                read_u64(bytes, NEXT_OFFSET) as usize,
                read_u64(bytes, NEXT_GENERATION),
            )
        });
        Self { value, next }
    }
}

fn read_u64(bytes: &[u8; NODE_SIZE], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_node_has_no_successor() {
        let at = Reference::new(4, 48, 2);
        let bytes = Node::new(513, None).encode();
        assert_eq!(bytes[TAG], 0);
        assert_eq!(Node::decode(&at, &bytes), Node::new(513, None));
    }

    #[test]
    fn test_successor_keeps_arena() {
        let at = Reference::new(4, 48, 2);
        let next = Reference::new(4, 96, 5);
        let decoded = Node::decode(&at, &Node::new(7, Some(next)).encode());
        assert_eq!(decoded.value, 7);
        assert_eq!(decoded.next, Some(next));
    }
}
