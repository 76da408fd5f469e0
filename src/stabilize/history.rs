//! Bounded ring of recent inter-frame transforms.

use crate::stabilize::transform::Transform;

/// A bounded history of the most recent inter-frame transforms, newest last.
///
/// Storage stays compacted on push so that [`window`](#method.window) can
/// hand out a contiguous chronological slice without copying.
#[derive(Clone, Debug)]
pub struct TransformHistory {
    entries: Vec<Transform>,
    capacity: usize,
}

impl TransformHistory {
    /// Creates an empty history holding at most `capacity` transforms.
    pub fn new(capacity: usize) -> Self {
        TransformHistory {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Appends a transform, evicting the oldest entry once full.
    pub fn push(&mut self, transform: Transform) {
        if self.entries.len() == self.capacity {
            self.entries.remove(0);
        }
        self.entries.push(transform);
    }

    /// Returns the most recent `n` transforms in chronological order,
    /// clipped to the current length.
    pub fn window(&self, n: usize) -> &[Transform] {
        let n = n.min(self.entries.len());
        &self.entries[self.entries.len() - n..]
    }

    /// Number of stored transforms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history holds no transforms.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes every stored transform. The capacity is unchanged.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Changes the capacity, keeping the most recent entries when shrinking.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if self.entries.len() > capacity {
            self.entries.drain(..self.entries.len() - capacity);
        }
        self.capacity = capacity;
        self.entries.reserve(capacity.saturating_sub(self.entries.len()));
    }
}
