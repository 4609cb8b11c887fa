use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::executor::lock;

/// A bounded pool of released layout outputs.
///
/// Layout engines may take a recycled value from the pool instead of allocating a fresh one.
/// A pool is an ordinary value: give each binder its own, or share one `Arc<LayoutPool<_>>`
/// between binders that render the same kind of content. It lives as long as its last owner.
pub struct LayoutPool<T> {
    capacity: usize,
    items: Mutex<Vec<T>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStats {
    pub len: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl<T> LayoutPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(Vec::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn acquire(&self) -> Option<T> {
        let item = lock(&self.items).pop();
        if item.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        item
    }

    /// Offers `item` back to the pool. Returns `false` (dropping it) when the pool is full.
    pub fn release(&self, item: T) -> bool {
        let mut items = lock(&self.items);
        if items.len() >= self.capacity {
            return false;
        }
        items.push(item);
        true
    }

    pub fn clear(&self) {
        lock(&self.items).clear();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            len: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<T> core::fmt::Debug for LayoutPool<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LayoutPool")
            .field("stats", &self.stats())
            .finish()
    }
}
