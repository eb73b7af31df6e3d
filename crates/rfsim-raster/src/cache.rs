//! Bounded key/value cache with least-recently-used eviction.

use std::collections::HashMap;
use std::hash::Hash;

/// Sentinel slot index meaning "no node".
const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// A fixed-capacity cache that evicts the least-recently-used entry.
///
/// Both `add` and `get` count as uses. Promotion relinks list nodes inside
/// a slab and never copies values; every operation is O(1) apart from
/// hashing the key. Values are owned by their slot: eviction, [`clear`]
/// and dropping the cache are the only places a value is released, so a
/// value whose `Drop` closes a file handle or frees a pixel buffer does
/// so exactly once.
///
/// The most recent entry is exposed through [`recent`] so callers making
/// runs of lookups that land on the same value can skip the hash lookup
/// entirely.
///
/// [`clear`]: LruCache::clear
/// [`recent`]: LruCache::recent
#[derive(Debug)]
pub struct LruCache<K, V> {
    nodes: Vec<Node<K, V>>,
    index: HashMap<K, usize>,
    head: usize,
    tail: usize,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (clamped to 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            nodes: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            capacity,
        }
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The fixed capacity this cache was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a key is present, without promoting it.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Insert a value, evicting the least-recently-used entry first if the
    /// cache is full. Inserting an existing key replaces its value. Either
    /// way the entry becomes the most recent one and a reference to its
    /// value is returned.
    pub fn add(&mut self, key: K, value: V) -> &mut V {
        if let Some(&slot) = self.index.get(&key) {
            self.nodes[slot].value = value;
            self.promote(slot);
            return &mut self.nodes[self.head].value;
        }
        if self.nodes.len() == self.capacity {
            let evicted = self.remove_slot(self.tail);
            self.index.remove(&evicted.key);
        }
        let slot = self.nodes.len();
        self.nodes.push(Node {
            key: key.clone(),
            value,
            prev: NIL,
            next: self.head,
        });
        if self.head != NIL {
            self.nodes[self.head].prev = slot;
        } else {
            self.tail = slot;
        }
        self.head = slot;
        self.index.insert(key, slot);
        &mut self.nodes[slot].value
    }

    /// Look up a key, promoting the entry to most recent on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.promote(slot);
        Some(&self.nodes[self.head].value)
    }

    /// Look up a key for mutation, promoting the entry on a hit.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let slot = *self.index.get(key)?;
        self.promote(slot);
        Some(&mut self.nodes[self.head].value)
    }

    /// The most recent entry, without reordering anything.
    pub fn recent(&self) -> Option<(&K, &V)> {
        if self.head == NIL {
            return None;
        }
        let node = &self.nodes[self.head];
        Some((&node.key, &node.value))
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Unlink a node from the recency list.
    fn detach(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        if prev != NIL {
            self.nodes[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    /// Move a node to the front of the recency list.
    fn promote(&mut self, slot: usize) {
        if slot == self.head {
            return;
        }
        self.detach(slot);
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = self.head;
        self.nodes[self.head].prev = slot;
        self.head = slot;
    }

    /// Remove a node, keeping the slab dense by moving the last node into
    /// the vacated slot and repointing its neighbors and index entry.
    fn remove_slot(&mut self, slot: usize) -> Node<K, V> {
        self.detach(slot);
        let node = self.nodes.swap_remove(slot);
        if slot < self.nodes.len() {
            let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
            if prev != NIL {
                self.nodes[prev].next = slot;
            } else {
                self.head = slot;
            }
            if next != NIL {
                self.nodes[next].prev = slot;
            } else {
                self.tail = slot;
            }
            let moved = self.nodes[slot].key.clone();
            self.index.insert(moved, slot);
        }
        node
    }
}
