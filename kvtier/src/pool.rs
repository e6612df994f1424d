//! Fixed-capacity container with O(1) removal of a uniformly random element.
//!
//! The stores use it to track idle storage units and to pick eviction
//! victims. It is not internally synchronized; owners wrap it in their own
//! lock together with the rest of their bookkeeping.

use rand::Rng;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("pool is empty")]
    Empty,
    #[error("pool capacity of {capacity} exceeded")]
    CapacityExceeded { capacity: usize },
}

/// Set of items supporting O(1) insertion and O(1) removal of a uniformly
/// random item. Insertion order is not preserved.
pub struct RandomEvictionPool<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> RandomEvictionPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds `item`. Fails once the configured capacity is reached; the pool
    /// never grows past it.
    pub fn add(&mut self, item: T) -> Result<(), PoolError> {
        if self.items.len() >= self.capacity {
            return Err(PoolError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Removes and returns a uniformly random item by swapping the last item
    /// into the vacated slot.
    pub fn pop_random(&mut self) -> Result<T, PoolError> {
        if self.items.is_empty() {
            return Err(PoolError::Empty);
        }
        let idx = rand::thread_rng().gen_range(0..self.items.len());
        Ok(self.items.swap_remove(idx))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn add_and_pop_account_correctly() {
        let mut pool = RandomEvictionPool::new(3);
        pool.add("a").unwrap();
        pool.add("b").unwrap();
        pool.add("c").unwrap();
        assert_eq!(pool.len(), 3);
        pool.pop_random().unwrap();
        assert_eq!(pool.len(), 2);
        pool.add("d").unwrap();
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn pop_random_returns_each_item_exactly_once() {
        let mut pool = RandomEvictionPool::new(100);
        for i in 0..100 {
            pool.add(i).unwrap();
        }
        let mut seen = HashSet::new();
        while !pool.is_empty() {
            let item = pool.pop_random().unwrap();
            assert!(seen.insert(item), "{item} handed out twice");
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn add_past_capacity_fails() {
        let mut pool = RandomEvictionPool::new(1);
        pool.add(1).unwrap();
        assert!(matches!(
            pool.add(2),
            Err(PoolError::CapacityExceeded { capacity: 1 })
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn pop_from_empty_fails() {
        let mut pool = RandomEvictionPool::<u32>::new(1);
        assert!(matches!(pool.pop_random(), Err(PoolError::Empty)));
    }
}
