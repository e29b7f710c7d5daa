//! Read-only windows over shared slices.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A cheap, cloneable view of `data[range]`.
///
/// Read-only algorithms split spans instead of regions: every node may read
/// its window concurrently, and the data stays owned by the caller's `Arc`.
pub struct Span<T> {
    data: Arc<[T]>,
    range: Range<usize>,
}

impl<T> Span<T> {
    /// A span over all of `data`.
    #[must_use]
    pub fn new(data: Arc<[T]>) -> Self {
        let len = data.len();
        Self { data, range: 0..len }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Returns true for an empty span.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Offset of the first element inside the shared slice.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.range.start
    }

    /// Borrows the window.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data[self.range.clone()]
    }

    /// Splits at `mid`, relative to the start of the span.
    ///
    /// # Panics
    ///
    /// Panics if `mid > self.len()`.
    #[must_use]
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        assert!(mid <= self.len(), "span split point {mid} out of bounds (len {})", self.len());
        let at = self.range.start + mid;
        let right = Self {
            data: Arc::clone(&self.data),
            range: at..self.range.end,
        };
        let left = Self {
            data: self.data,
            range: self.range.start..at,
        };
        (left, right)
    }
}

impl<T> Clone for Span<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            range: self.range.clone(),
        }
    }
}

impl<T> fmt::Debug for Span<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span").field("range", &self.range).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_absolute_offsets() {
        let span = Span::new(Arc::from(vec![1, 2, 3, 4, 5]));
        let (left, right) = span.split_at(2);
        let (mid, tail) = right.split_at(1);
        assert_eq!(left.as_slice(), &[1, 2]);
        assert_eq!(mid.as_slice(), &[3]);
        assert_eq!(tail.offset(), 3);
        assert_eq!(tail.as_slice(), &[4, 5]);
    }
}
