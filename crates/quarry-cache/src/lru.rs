//! Cost-bounded LRU map shared by the cache implementations.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct LruMap<K, V> {
    map: HashMap<K, Entry<V>>,
    order: VecDeque<K>,
    cost: u64,
}

#[derive(Debug)]
struct Entry<V> {
    value: Arc<V>,
    cost: u64,
}

impl<K, V> Default for LruMap<K, V> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            cost: 0,
        }
    }
}

impl<K: Eq + Hash + Clone, V> LruMap<K, V> {
    pub(crate) fn get(&mut self, key: &K) -> Option<Arc<V>> {
        let value = self.map.get(key)?.value.clone();
        self.touch(key);
        Some(value)
    }

    pub(crate) fn insert(&mut self, key: K, value: Arc<V>, cost: u64) {
        if let Some(prev) = self.map.insert(key.clone(), Entry { value, cost }) {
            self.cost = self.cost.saturating_sub(prev.cost);
        }
        self.cost = self.cost.saturating_add(cost);
        self.touch(&key);
    }

    /// Removes and returns the least-recently-used entry.
    pub(crate) fn pop_lru(&mut self) -> Option<(K, Arc<V>)> {
        loop {
            let key = self.order.pop_front()?;
            let Some(entry) = self.map.remove(&key) else {
                continue;
            };
            self.cost = self.cost.saturating_sub(entry.cost);
            return Some((key, entry.value));
        }
    }

    pub(crate) fn cost(&self) -> u64 {
        self.cost
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }
}
