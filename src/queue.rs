use std::collections::{vec_deque, VecDeque};

/// Bounded FIFO. `VecDeque::with_capacity` may over-allocate, so the bound is
/// tracked separately.
#[derive(Debug, Clone)]
pub struct Queue<T: Clone> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Hands the item back if the queue is full.
    #[must_use]
    pub fn try_push(&mut self, item: T) -> Option<T> {
        if self.is_full() {
            return Some(item);
        }

        self.data.push_back(item);
        None
    }

    pub fn try_pop(&mut self) -> Option<T> {
        self.data.pop_front()
    }

    pub fn front(&self) -> Option<&T> {
        self.data.front()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> vec_deque::IterMut<'_, T> {
        self.data.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded() {
        let mut q = Queue::new(2);
        assert_eq!(q.try_push(1), None);
        assert_eq!(q.try_push(2), None);
        assert!(q.is_full());
        assert_eq!(q.try_push(3), Some(3));

        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_push(3), None);
        assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_fifo_order() {
        let mut q = Queue::new(4);
        for i in 0..4 {
            assert_eq!(q.try_push(i), None);
        }

        assert_eq!(q.front(), Some(&0));
        assert_eq!(q.try_pop(), Some(0));
        assert_eq!(q.len(), 3);
        assert_eq!(q.front(), Some(&1));
        assert!(!q.is_full());
    }
}
