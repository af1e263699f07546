//! Singly linked list backed by a [`MemoryManager`]

use super::node::{Node, NodeRef, NodeValue, NODE_SIZE};
use crate::error::{Error, Result};
use crate::memory::{AllocatorConfig, MemoryManager, Reference};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Singly linked list of `u16` values
///
/// Every node is one allocation of [`NODE_SIZE`] bytes from the backing
/// manager and its bytes live in the manager's pool. Structural operations
/// are serialized by the list lock, which is always taken before the
/// manager's lock.
pub struct LinkedList {
    memory: Arc<MemoryManager>,
    head: Mutex<Option<Reference>>,
}

impl LinkedList {
    /// Create an empty list on an existing manager
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self {
            memory,
            head: Mutex::new(None),
        }
    }

    /// Create an empty list on a fresh pool of `pool_size` bytes
    pub fn init(pool_size: usize) -> Result<Self> {
        Self::with_config(AllocatorConfig::with_capacity(pool_size))
    }

    pub fn with_config(config: AllocatorConfig) -> Result<Self> {
        let memory = MemoryManager::init(config)?;
        info!(capacity = memory.config().capacity, "Initialized list pool");
        Ok(Self::new(Arc::new(memory)))
    }

    /// Backing memory manager
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Append a value at the tail
    pub fn insert_tail(&self, value: NodeValue) -> Result<NodeRef> {
        let mut head = self.head.lock();

        let mut tail = None;
        for item in self.cursor(*head) {
            tail = Some(item?);
        }

        let at = self.alloc_node(value, None)?;
        match tail {
            None => *head = Some(at),
            Some((tail_at, mut tail_node)) => {
                tail_node.next = Some(at);
                self.link(tail_at, &tail_node, at)?;
            }
        }

        debug!(value, offset = at.offset(), "Appended node");
        Ok(NodeRef(at))
    }

    /// Insert a value right after `node`
    pub fn insert_after(&self, node: NodeRef, value: NodeValue) -> Result<NodeRef> {
        let head = self.head.lock();

        let mut target = None;
        for item in self.cursor(*head) {
            let (at, current) = item?;
            if at == node.0 {
                target = Some(current);
                break;
            }
        }
        let Some(mut target) = target else {
            warn!(%node, "Cannot insert after a node outside the list");
            return Err(Error::InvalidArgument(format!(
                "{} is not a node of this list",
                node
            )));
        };

        let at = self.alloc_node(value, target.next)?;
        target.next = Some(at);
        self.link(node.0, &target, at)?;

        debug!(value, after = node.0.offset(), offset = at.offset(), "Inserted node");
        Ok(NodeRef(at))
    }

    /// Insert a value right before `node`; before the head makes it the new head
    pub fn insert_before(&self, node: NodeRef, value: NodeValue) -> Result<NodeRef> {
        let mut head = self.head.lock();

        let Some(first) = *head else {
            warn!(%node, "Cannot insert before a node of an empty list");
            return Err(Error::InvalidArgument(
                "cannot insert before a node of an empty list".to_string(),
            ));
        };

        if first == node.0 {
            let at = self.alloc_node(value, Some(first))?;
            *head = Some(at);
            debug!(value, offset = at.offset(), "Inserted new head");
            return Ok(NodeRef(at));
        }

        let mut prev = None;
        for item in self.cursor(Some(first)) {
            let (at, current) = item?;
            if current.next == Some(node.0) {
                prev = Some((at, current));
                break;
            }
        }
        let Some((prev_at, mut prev_node)) = prev else {
            warn!(%node, "Target node not found");
            return Err(Error::NotFound(format!("{} is not a node of this list", node)));
        };

        let at = self.alloc_node(value, Some(node.0))?;
        prev_node.next = Some(at);
        self.link(prev_at, &prev_node, at)?;

        debug!(value, before = node.0.offset(), offset = at.offset(), "Inserted node");
        Ok(NodeRef(at))
    }

    /// Remove the first node holding `value`. Returns false if none does.
    pub fn delete_first(&self, value: NodeValue) -> Result<bool> {
        let mut head = self.head.lock();

        let mut prev: Option<(Reference, Node)> = None;
        for item in self.cursor(*head) {
            let (at, node) = item?;
            if node.value == value {
                match prev {
                    None => *head = node.next,
                    Some((prev_at, mut prev_node)) => {
                        prev_node.next = node.next;
                        self.store(prev_at, &prev_node)?;
                    }
                }
                self.memory.free(at)?;
                debug!(value, offset = at.offset(), "Deleted node");
                return Ok(true);
            }
            prev = Some((at, node));
        }

        debug!(value, "Value not in list");
        Ok(false)
    }

    /// First node holding `value`
    ///
    /// The handle is only valid until the next structural change.
    pub fn find(&self, value: NodeValue) -> Result<Option<NodeRef>> {
        let head = self.head.lock();
        for item in self.cursor(*head) {
            let (at, node) = item?;
            if node.value == value {
                return Ok(Some(NodeRef(at)));
            }
        }
        Ok(None)
    }

    /// Value stored in `node`
    pub fn value(&self, node: NodeRef) -> Result<NodeValue> {
        let _head = self.head.lock();
        Ok(self.load(node.0)?.value)
    }

    pub fn count(&self) -> Result<usize> {
        let head = self.head.lock();
        let mut count = 0;
        for item in self.cursor(*head) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> bool {
        self.head.lock().is_none()
    }

    /// Values from head to tail
    pub fn values(&self) -> Result<Vec<NodeValue>> {
        let head = self.head.lock();
        self.cursor(*head)
            .map(|item| item.map(|(_, node)| node.value))
            .collect()
    }

    /// Render as `[v1, v2, ...]`
    pub fn render(&self) -> Result<String> {
        Ok(format_values(&self.values()?))
    }

    /// Render from `start` (default: head) through `end` inclusive
    ///
    /// Stops at the tail if `end` is `None` or not reached. Renders `[]`
    /// when `start` is not in the list.
    pub fn render_range(&self, start: Option<NodeRef>, end: Option<NodeRef>) -> Result<String> {
        let head = self.head.lock();
        let start = start.map(|n| n.0).or(*head);

        let mut values = Vec::new();
        let mut started = false;
        for item in self.cursor(*head) {
            let (at, node) = item?;
            if !started {
                if Some(at) != start {
                    continue;
                }
                started = true;
            }
            values.push(node.value);
            if end.is_some_and(|end| end.0 == at) {
                break;
            }
        }
        Ok(format_values(&values))
    }

    /// Free every node, then release the backing pool
    pub fn clear(&self) -> Result<()> {
        let mut head = self.head.lock();

        let nodes = self
            .cursor(*head)
            .map(|item| item.map(|(at, _)| at))
            .collect::<Result<Vec<_>>>()?;
        for &at in &nodes {
            self.memory.free(at)?;
        }

        *head = None;
        self.memory.deinit();
        info!(nodes = nodes.len(), "Cleared list");
        Ok(())
    }

    fn cursor(&self, start: Option<Reference>) -> Cursor<'_> {
        Cursor {
            memory: &self.memory,
            next: start,
        }
    }

    fn alloc_node(&self, value: NodeValue, next: Option<Reference>) -> Result<Reference> {
        let at = self.memory.allocate(NODE_SIZE).map_err(|e| {
            warn!(value, error = %e, "Failed to allocate new node");
            e
        })?;
        if let Err(e) = self.store(at, &Node::new(value, next)) {
            self.memory.free(at).ok();
            return Err(e);
        }
        Ok(at)
    }

    /// Store `node` (whose next now points at the fresh node `new`), freeing `new` on failure
    fn link(&self, at: Reference, node: &Node, new: Reference) -> Result<()> {
        if let Err(e) = self.store(at, node) {
            self.memory.free(new).ok();
            return Err(e);
        }
        Ok(())
    }

    fn load(&self, at: Reference) -> Result<Node> {
        load(&self.memory, at)
    }

    fn store(&self, at: Reference, node: &Node) -> Result<()> {
        self.memory.write(at, 0, &node.encode())
    }
}

impl fmt::Debug for LinkedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedList")
            .field("head", &*self.head.lock())
            .field("memory", &self.memory)
            .finish()
    }
}

fn load(memory: &MemoryManager, at: Reference) -> Result<Node> {
    let mut bytes = [0u8; NODE_SIZE];
    memory.read(at, 0, &mut bytes)?;
    Ok(Node::decode(&at, &bytes))
}

fn format_values(values: &[NodeValue]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

/// Walks nodes from a starting handle; stops after the first error
struct Cursor<'a> {
    memory: &'a MemoryManager,
    next: Option<Reference>,
}

impl Iterator for Cursor<'_> {
    type Item = Result<(Reference, Node)>;

    fn next(&mut self) -> Option<Self::Item> {
        let at = self.next.take()?;
        Some(load(self.memory, at).map(|node| {
            self.next = node.next;
            (at, node)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_list() -> LinkedList {
        LinkedList::init(4096).expect("init list")
    }

    #[test]
    fn test_insert_tail_and_render() -> Result<()> {
        let list = new_list();
        assert_eq!(list.render()?, "[]");
        assert!(list.is_empty());

        list.insert_tail(1)?;
        list.insert_tail(2)?;
        list.insert_tail(3)?;
        assert_eq!(list.render()?, "[1, 2, 3]");

        assert!(list.delete_first(2)?);
        assert_eq!(list.render()?, "[1, 3]");
        assert_eq!(list.count()?, 2);
        Ok(())
    }

    #[test]
    fn test_delete_missing_value() -> Result<()> {
        let list = new_list();
        assert!(!list.delete_first(9)?);
        list.insert_tail(1)?;
        assert!(!list.delete_first(9)?);
        assert_eq!(list.values()?, vec![1]);
        Ok(())
    }

    #[test]
    fn test_delete_head_and_tail() -> Result<()> {
        let list = new_list();
        for v in [5, 6, 7] {
            list.insert_tail(v)?;
        }
        assert!(list.delete_first(5)?);
        assert!(list.delete_first(7)?);
        assert_eq!(list.values()?, vec![6]);
        assert!(list.delete_first(6)?);
        assert!(list.is_empty());
        assert_eq!(list.memory().stats()?.allocations, 0);
        Ok(())
    }

    #[test]
    fn test_delete_first_only_removes_one() -> Result<()> {
        let list = new_list();
        for v in [4, 8, 4] {
            list.insert_tail(v)?;
        }
        assert!(list.delete_first(4)?);
        assert_eq!(list.render()?, "[8, 4]");
        Ok(())
    }

    #[test]
    fn test_insert_after() -> Result<()> {
        let list = new_list();
        let first = list.insert_tail(1)?;
        list.insert_tail(3)?;

        let two = list.insert_after(first, 2)?;
        assert_eq!(list.render()?, "[1, 2, 3]");
        assert_eq!(list.value(two)?, 2);

        // After the tail
        let tail = list.find(3)?.expect("3 is in the list");
        list.insert_after(tail, 4)?;
        assert_eq!(list.render()?, "[1, 2, 3, 4]");
        Ok(())
    }

    #[test]
    fn test_insert_after_foreign_node() -> Result<()> {
        let list = new_list();
        let other = new_list();
        let node = other.insert_tail(1)?;
        list.insert_tail(1)?;

        let before = list.memory().stats()?;
        assert!(matches!(
            list.insert_after(node, 2),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(list.memory().stats()?, before);
        Ok(())
    }

    #[test]
    fn test_insert_before() -> Result<()> {
        let list = new_list();
        let two = list.insert_tail(2)?;
        let four = list.insert_tail(4)?;

        list.insert_before(two, 1)?;
        list.insert_before(four, 3)?;
        assert_eq!(list.render()?, "[1, 2, 3, 4]");
        Ok(())
    }

    #[test]
    fn test_insert_before_errors() -> Result<()> {
        let list = new_list();
        let other = new_list();
        let stray = other.insert_tail(9)?;

        assert!(matches!(
            list.insert_before(stray, 1),
            Err(Error::InvalidArgument(_))
        ));

        list.insert_tail(1)?;
        let before = list.memory().stats()?;
        assert!(matches!(list.insert_before(stray, 2), Err(Error::NotFound(_))));
        // No node was allocated for the failed insert
        assert_eq!(list.memory().stats()?, before);
        Ok(())
    }

    #[test]
    fn test_find() -> Result<()> {
        let list = new_list();
        assert!(list.find(1)?.is_none());
        list.insert_tail(1)?;
        let second = list.insert_tail(2)?;
        list.insert_tail(2)?;

        assert_eq!(list.find(2)?, Some(second));
        assert!(list.find(3)?.is_none());
        Ok(())
    }

    #[test]
    fn test_render_range() -> Result<()> {
        let list = new_list();
        let mut nodes = Vec::new();
        for v in 1..=5 {
            nodes.push(list.insert_tail(v)?);
        }

        assert_eq!(list.render_range(Some(nodes[1]), Some(nodes[3]))?, "[2, 3, 4]");
        assert_eq!(list.render_range(None, Some(nodes[1]))?, "[1, 2]");
        assert_eq!(list.render_range(Some(nodes[3]), None)?, "[4, 5]");
        // End before start is never reached
        assert_eq!(list.render_range(Some(nodes[3]), Some(nodes[0]))?, "[4, 5]");
        assert_eq!(list.render_range(Some(nodes[2]), Some(nodes[2]))?, "[3]");

        list.delete_first(5)?;
        assert_eq!(list.render_range(Some(nodes[4]), None)?, "[]");
        Ok(())
    }

    #[test]
    fn test_render_range_empty_list() -> Result<()> {
        let list = new_list();
        assert_eq!(list.render_range(None, None)?, "[]");
        Ok(())
    }

    #[test]
    fn test_clear_releases_pool() -> Result<()> {
        let list = new_list();
        for v in 0..10 {
            list.insert_tail(v)?;
        }
        assert_eq!(list.memory().stats()?.allocations, 10);

        list.clear()?;
        assert!(list.is_empty());
        assert!(!list.memory().is_initialized());
        assert!(matches!(list.insert_tail(1), Err(Error::Uninitialized)));
        Ok(())
    }

    #[test]
    fn test_stale_handle_after_delete() -> Result<()> {
        let list = new_list();
        list.insert_tail(1)?;
        let two = list.insert_tail(2)?;
        list.delete_first(2)?;

        assert!(list.value(two).is_err());
        assert!(matches!(
            list.insert_after(two, 3),
            Err(Error::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_pool_exhaustion() -> Result<()> {
        // Room for a handful of nodes only
        let list = LinkedList::init(128)?;
        let mut inserted = 0;
        loop {
            match list.insert_tail(inserted) {
                Ok(_) => inserted += 1,
                Err(e) => {
                    assert!(e.is_allocation_failure());
                    break;
                }
            }
        }
        assert!(inserted > 0);
        assert_eq!(list.count()?, inserted as usize);
        list.memory().check_invariants()
    }
}
