//! Bounded event deduplication.

use std::collections::{HashSet, VecDeque};

use lanevakt_core::event::EventKey;

/// Insertion-ordered seen-set with bounded memory.
///
/// When the table exceeds its capacity, the oldest tenth (at least one entry)
/// is evicted. An evicted key can in principle be observed again and would
/// then be processed twice; the bound is chosen so that requires a reorg
/// deeper than anything the collectors are built for.
pub struct DedupTable {
    capacity: usize,
    seen: HashSet<EventKey>,
    order: VecDeque<EventKey>,
}

impl DedupTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: HashSet::with_capacity(capacity.max(1)),
            order: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.seen.contains(key)
    }

    /// Records `key`. Returns `false` if it was already present.
    pub fn insert(&mut self, key: EventKey) -> bool {
        if !self.seen.insert(key) {
            return false;
        }
        self.order.push_back(key);
        if self.seen.len() > self.capacity {
            self.evict_oldest();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict_oldest(&mut self) {
        let batch = (self.capacity / 10).max(1);
        for _ in 0..batch {
            match self.order.pop_front() {
                Some(old) => {
                    self.seen.remove(&old);
                }
                None => break,
            }
        }
    }
}
