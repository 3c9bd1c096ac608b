//! Insertion-ordered set with LRU eviction.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// A set that remembers how recently each key was touched.
///
/// Keys are kept in touch order; [`truncate`](Self::truncate) evicts from
/// the stale end and reports what it removed, which lets a caller drop the
/// associated payload (the line iterator uses this to bound its chunk map).
#[derive(Debug)]
pub struct RecentSet<K> {
    map: HashMap<K, u64>,
    order: BTreeMap<u64, K>,
    next_seq: u64,
}

impl<K: Eq + Hash + Clone> RecentSet<K> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` when the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Marks keys as most recently used, inserting unseen ones.
    ///
    /// Returns how many of the keys were newly inserted. Keys already
    /// present are promoted to the fresh end of the order.
    pub fn touch(&mut self, keys: impl IntoIterator<Item = K>) -> usize {
        let mut inserted = 0;
        for key in keys {
            let seq = self.next_seq;
            self.next_seq += 1;
            match self.map.insert(key.clone(), seq) {
                Some(old) => {
                    self.order.remove(&old);
                }
                None => inserted += 1,
            }
            self.order.insert(seq, key);
        }
        inserted
    }

    /// Returns `true` when `key` is in the set (does not promote it).
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Shrinks the set to at most `n` keys, evicting the stalest first.
    ///
    /// Returns the evicted keys, oldest first.
    pub fn truncate(&mut self, n: usize) -> Vec<K> {
        let mut evicted = Vec::new();
        while self.map.len() > n {
            let Some((&seq, _)) = self.order.iter().next() else {
                break;
            };
            if let Some(key) = self.order.remove(&seq) {
                self.map.remove(&key);
                evicted.push(key);
            }
        }
        evicted
    }

    /// Iterates keys from stalest to freshest.
    pub fn list(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }
}

impl<K: Eq + Hash + Clone> Default for RecentSet<K> {
    fn default() -> Self {
        Self::new()
    }
}
