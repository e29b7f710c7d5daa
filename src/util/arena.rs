//! Shared buffers sliced into disjoint regions.
//!
//! A recursive tree over one buffer hands each node its own [`Region`]: a
//! bounds-checked window that only that node can touch. Regions are created
//! by splitting and merged back by joining, so two live regions of one buffer
//! never overlap and a node can mutate its window from any thread without
//! locking.
//!
//! The buffer is freed when the last region referring to it is dropped. The
//! depth-0 node recovers the whole vector with [`Region::into_vec`] once every
//! other region has been joined back into it, and keeps an empty
//! [`anchor`](Region::anchor) on scratch buffers so that it decides when the
//! memory is released.
//!
//! # Safety model
//!
//! Every access goes through a region whose range lies inside the buffer,
//! and regions are only ever produced by [`Region::new`],
//! [`Region::split_at`], [`Region::join`] and [`Region::anchor`], which
//! preserve disjointness.

#![allow(unsafe_code)]

use crate::error::{Error, ErrorKind, Result};
use core::fmt;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ptr::NonNull;
use std::sync::Arc;

/// Owned storage of a vector, addressed through raw parts.
struct Buffer<T> {
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
}

impl<T> Buffer<T> {
    fn from_vec(vec: Vec<T>) -> Self {
        let mut vec = ManuallyDrop::new(vec);
        let len = vec.len();
        let cap = vec.capacity();
        // SAFETY: `Vec::as_mut_ptr` is never null, even for empty vectors.
        let ptr = unsafe { NonNull::new_unchecked(vec.as_mut_ptr()) };
        Self { ptr, len, cap }
    }

    fn into_vec(self) -> Vec<T> {
        let this = ManuallyDrop::new(self);
        // SAFETY: the parts came from a `Vec<T>` in `from_vec` and `Drop` will
        // not run for `this`.
        unsafe { Vec::from_raw_parts(this.ptr.as_ptr(), this.len, this.cap) }
    }
}

impl<T> Drop for Buffer<T> {
    fn drop(&mut self) {
        // SAFETY: same parts as in `into_vec`; this is the only owner left.
        drop(unsafe { Vec::from_raw_parts(self.ptr.as_ptr(), self.len, self.cap) });
    }
}

// SAFETY: the buffer owns its elements like a `Vec<T>` does.
unsafe impl<T: Send> Send for Buffer<T> {}
// SAFETY: shared access only reaches elements through regions, which carry
// their own bounds.
unsafe impl<T: Sync> Sync for Buffer<T> {}

/// A disjoint window `[start, end)` into a shared buffer.
pub struct Region<T> {
    buf: Arc<Buffer<T>>,
    start: usize,
    end: usize,
}

// SAFETY: a region is the unique handle to its elements; moving it to another
// thread moves exclusive access, as with `&mut [T]`.
unsafe impl<T: Send> Send for Region<T> {}
// SAFETY: `&Region` only yields `&[T]`.
unsafe impl<T: Sync> Sync for Region<T> {}

impl<T> Region<T> {
    /// Takes ownership of `vec` and returns one region covering all of it.
    #[must_use]
    pub fn new(vec: Vec<T>) -> Self {
        let len = vec.len();
        Self {
            buf: Arc::new(Buffer::from_vec(vec)),
            start: 0,
            end: len,
        }
    }

    /// Number of elements in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true for an empty window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Offset of the window inside its buffer.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.start
    }

    /// Returns true if both regions slice the same buffer.
    #[must_use]
    pub fn same_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buf, &other.buf)
    }

    /// Splits the window at `mid`, relative to its start.
    ///
    /// # Panics
    ///
    /// Panics if `mid > self.len()`, like [`slice::split_at`].
    #[must_use]
    pub fn split_at(self, mid: usize) -> (Self, Self) {
        assert!(mid <= self.len(), "region split point {mid} out of bounds (len {})", self.len());
        let at = self.start + mid;
        let right = Self {
            buf: Arc::clone(&self.buf),
            start: at,
            end: self.end,
        };
        let left = Self {
            buf: self.buf,
            start: self.start,
            end: at,
        };
        (left, right)
    }

    /// Joins two adjacent windows of the same buffer, `self` first.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::RegionMismatch`] if the regions belong to
    /// different buffers or `other` does not start where `self` ends.
    pub fn join(self, other: Self) -> Result<Self> {
        if !self.same_buffer(&other) || self.end != other.start {
            return Err(Error::new(ErrorKind::RegionMismatch).with_message(format!(
                "cannot join [{}, {}) with [{}, {})",
                self.start, self.end, other.start, other.end
            )));
        }
        Ok(Self {
            buf: self.buf,
            start: self.start,
            end: other.end,
        })
    }

    /// An empty region at the start of this one.
    ///
    /// Overlaps nothing, but keeps the buffer alive until it is dropped.
    #[must_use]
    pub fn anchor(&self) -> Self {
        Self {
            buf: Arc::clone(&self.buf),
            start: self.start,
            end: self.start,
        }
    }

    /// Borrows the window.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `[start, end)` lies inside the buffer and no other live
        // region overlaps it, so no `&mut` alias exists.
        unsafe { std::slice::from_raw_parts(self.buf.ptr.as_ptr().add(self.start), self.len()) }
    }

    /// Mutably borrows the window.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in `as_slice`; `&mut self` makes the borrow unique.
        unsafe { std::slice::from_raw_parts_mut(self.buf.ptr.as_ptr().add(self.start), self.len()) }
    }

    /// Recovers the vector.
    ///
    /// Succeeds only for a region that covers the whole buffer and is the
    /// last one referring to it; otherwise hands the region back.
    pub fn into_vec(self) -> std::result::Result<Vec<T>, Self> {
        if self.start != 0 || self.end != self.buf.len {
            return Err(self);
        }
        let Self { buf, start, end } = self;
        match Arc::try_unwrap(buf) {
            Ok(buffer) => Ok(buffer.into_vec()),
            Err(buf) => Err(Self { buf, start, end }),
        }
    }
}

impl<T> Region<MaybeUninit<T>> {
    /// Allocates an uninitialized scratch buffer of `len` elements.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ScratchAllocation`] if the memory cannot be
    /// reserved.
    pub fn uninit(len: usize) -> Result<Self> {
        let mut vec = Vec::new();
        vec.try_reserve_exact(len)
            .map_err(|e| Error::scratch_allocation(len, e))?;
        vec.resize_with(len, MaybeUninit::uninit);
        Ok(Self::new(vec))
    }
}

impl<T> fmt::Debug for Region<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("buffer_len", &self.buf.len)
            .finish()
    }
}
