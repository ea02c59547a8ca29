//! Pending task ordering.
//!
//! Pure data structure: tasks leave in ascending priority order, and in
//! submission order among equal priorities.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Task priority. 0 is the most urgent value and the default.
pub type Priority = u32;

/// Priority queue of not-yet-started tasks.
pub struct PendingQueue<T> {
    order: BinaryHeap<Reverse<(Priority, u64)>>,
    items: HashMap<u64, T>,
    next_sequence: u64,
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self {
            order: BinaryHeap::new(),
            items: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Adds an item and returns its insertion sequence number.
    pub fn push(&mut self, priority: Priority, item: T) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.order.push(Reverse((priority, sequence)));
        self.items.insert(sequence, item);
        sequence
    }

    /// Removes the most urgent item together with its sequence number.
    pub fn pop(&mut self) -> Option<(u64, T)> {
        let Reverse((_, sequence)) = self.order.pop()?;
        self.items.remove(&sequence).map(|item| (sequence, item))
    }

    /// Removes every item, most urgent first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.items.len());
        while let Some((_, item)) = self.pop() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_priority_value_pops_first() {
        let mut queue = PendingQueue::new();
        queue.push(2, "b");
        queue.push(1, "a");
        queue.push(3, "c");

        assert_eq!(queue.drain(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut queue = PendingQueue::new();
        for name in ["first", "second", "third"] {
            queue.push(0, name);
        }

        assert_eq!(queue.pop(), Some((0, "first")));
        assert_eq!(queue.pop(), Some((1, "second")));
        assert_eq!(queue.pop(), Some((2, "third")));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_sequence_numbers_are_monotonic() {
        let mut queue = PendingQueue::new();
        assert_eq!(queue.push(5, ()), 0);
        assert_eq!(queue.push(1, ()), 1);
        queue.pop();
        assert_eq!(queue.push(1, ()), 2);
    }

    #[test]
    fn test_default_priority_is_most_urgent() {
        let mut queue = PendingQueue::new();
        queue.push(7, "later");
        queue.push(Priority::default(), "default");
        queue.push(1, "soon");

        assert_eq!(queue.drain(), vec!["default", "soon", "later"]);
    }

    #[test]
    fn test_len_and_is_empty() {
        let mut queue = PendingQueue::new();
        assert!(queue.is_empty());
        queue.push(1, 'x');
        queue.push(1, 'y');
        assert_eq!(queue.len(), 2);
        queue.drain();
        assert!(queue.is_empty());
    }
}
