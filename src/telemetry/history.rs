//! # Bounded History
//!
//! Fixed-capacity FIFO buffer used for the telemetry history and the
//! trajectory. Appending to a full buffer evicts the oldest entry first.

use std::collections::VecDeque;

use super::record::TelemetryRecord;

/// Number of telemetry records kept in [`History`].
pub const HISTORY_CAPACITY: usize = 50;

/// Append-only buffer that keeps the most recent `capacity` items.
///
/// # Examples
///
/// ```
/// use robot_console::telemetry::history::BoundedBuffer;
///
/// let mut buffer = BoundedBuffer::new(2);
/// buffer.push(1);
/// buffer.push(2);
/// buffer.push(3);
/// assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an item, evicting the oldest if the buffer is full.
    ///
    /// Returns the evicted item, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Most recently appended item.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Oldest retained item.
    #[must_use]
    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Owned copy of the contents, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Recent telemetry records, oldest first.
pub type History = BoundedBuffer<TelemetryRecord>;

impl History {
    /// Creates an empty history holding [`HISTORY_CAPACITY`] records.
    #[must_use]
    pub fn telemetry() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_never_exceeds_capacity() {
        let mut history = History::telemetry();
        for i in 0..500 {
            history.push(TelemetryRecord::blank(format!("{}", i)));
            assert!(history.len() <= HISTORY_CAPACITY);
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut history = History::telemetry();
        for i in 0..(HISTORY_CAPACITY + 5) {
            history.push(TelemetryRecord::blank(format!("{}", i)));
        }
        assert_eq!(history.oldest().unwrap().timestamp, "5");
        assert_eq!(history.latest().unwrap().timestamp, "54");

        let stamps: Vec<usize> = history
            .iter()
            .map(|r| r.timestamp.parse().unwrap())
            .collect();
        let expected: Vec<usize> = (5..55).collect();
        assert_eq!(stamps, expected, "Order must be preserved after eviction");
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut buffer = BoundedBuffer::new(2);
        assert_eq!(buffer.push('a'), None);
        assert_eq!(buffer.push('b'), None);
        assert_eq!(buffer.push('c'), Some('a'));
        assert_eq!(buffer.to_vec(), vec!['b', 'c']);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut buffer = BoundedBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.to_vec(), vec![2]);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer: BoundedBuffer<u8> = BoundedBuffer::new(3);
        assert!(buffer.is_empty());
        assert!(buffer.latest().is_none());
        assert!(buffer.oldest().is_none());
    }
}
