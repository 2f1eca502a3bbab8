//! Key-order trackers behind the eviction decorators
//!
//! Trackers hold keys only; values stay in the delegate. Each insertion
//! reports at most one eldest key once the bound is exceeded.

use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use ahash::RandomState;

/// Insertion-ordered key queue
///
/// Re-pushing a key appends a duplicate rather than moving it, so an
/// overwritten key keeps its original position and may be reported twice.
pub struct FifoTracker<K> {
    order: VecDeque<K>,
    capacity: usize,
}

impl<K> FifoTracker<K> {
    /// Create a tracker bounded to `capacity` keys
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            order: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append `key`, returning the eldest key if the bound is exceeded
    pub fn push(&mut self, key: K) -> Option<K> {
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            self.order.pop_front()
        } else {
            None
        }
    }

    /// Number of tracked entries, duplicates included
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forget every key
    pub fn clear(&mut self) {
        self.order.clear();
    }
}

struct Node<K> {
    key: K,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Access-ordered key set with O(1) touch and eviction
///
/// Uses a slab of intrusive list nodes; head is most recently used.
pub struct LruTracker<K> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    capacity: usize,
}

impl<K> LruTracker<K>
where
    K: Hash + Eq + Clone,
{
    /// Create a tracker bounded to `capacity` keys
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            map: HashMap::with_capacity_and_hasher(capacity + 1, RandomState::new()),
            nodes: Vec::with_capacity(capacity + 1),
            head: None,
            tail: None,
            free_list: Vec::new(),
            capacity,
        }
    }

    /// Mark `key` most recently used if tracked; returns whether it was
    pub fn touch<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.map.get(key) {
            Some(&idx) => {
                self.move_to_front(idx);
                true
            }
            None => false,
        }
    }

    /// Record a write of `key`
    ///
    /// A tracked key moves to the front. A new key is linked at the front and,
    /// if that exceeds the bound, the least recently used key is unlinked and
    /// returned.
    pub fn insert(&mut self, key: K) -> Option<K> {
        if self.touch(&key) {
            return None;
        }

        let idx = self.alloc_node();
        self.nodes[idx] = Some(Node {
            key: key.clone(),
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
        self.map.insert(key, idx);

        if self.map.len() > self.capacity {
            self.pop_eldest()
        } else {
            None
        }
    }

    /// Stop tracking `key`; returns whether it was tracked
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.map.remove(key) {
            Some(idx) => {
                self.unlink(idx);
                self.nodes[idx] = None;
                self.free_list.push(idx);
                true
            }
            None => false,
        }
    }

    /// Whether `key` is tracked
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Forget every key
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    fn pop_eldest(&mut self) -> Option<K> {
        let tail_idx = self.tail?;
        self.unlink(tail_idx);
        self.free_list.push(tail_idx);
        let node = self.nodes[tail_idx].take()?;
        self.map.remove(&node.key);
        Some(node.key)
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.nodes[idx] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn alloc_node(&mut self) -> usize {
        match self.free_list.pop() {
            Some(idx) => idx,
            None => {
                self.nodes.push(None);
                self.nodes.len() - 1
            }
        }
    }
}
