//! Sequential routines run at the leaves of the sort and merge trees.

#![allow(unsafe_code)]

use std::cmp::Ordering;
use std::mem::{self, MaybeUninit};
use std::ptr;

/// Stable sort of `v` by a strict-weak `is_less`.
pub(crate) fn sort_by_less<T, F>(v: &mut [T], is_less: &F)
where
    F: Fn(&T, &T) -> bool,
{
    v.sort_by(|a, b| {
        if is_less(a, b) {
            Ordering::Less
        } else if is_less(b, a) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    });
}

/// Returns true if no element is less than its predecessor.
pub(crate) fn is_sorted_by_less<T, F>(v: &[T], is_less: &F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    v.windows(2).all(|w| !is_less(&w[1], &w[0]))
}

/// Returns true if every element is less than its predecessor.
///
/// Such a range has no equal neighbours, so reversing it is a stable sort.
pub(crate) fn is_strictly_descending<T, F>(v: &[T], is_less: &F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    v.len() > 1 && v.windows(2).all(|w| is_less(&w[1], &w[0]))
}

/// Returns true if the runs `v[..mid]` and `v[mid..]` are already in order.
pub(crate) fn runs_in_order<T, F>(v: &[T], mid: usize, is_less: &F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    mid == 0 || mid >= v.len() || !is_less(&v[mid], &v[mid - 1])
}

/// Stable merge of the sorted runs `v[..mid]` and `v[mid..]`.
///
/// The left run is moved into `scratch` and merged back from the front. If
/// `is_less` panics, every element still ends up in `v` exactly once.
///
/// # Panics
///
/// Panics if `scratch` is shorter than `mid`.
pub(crate) fn merge_buffered<T, F>(v: &mut [T], mid: usize, scratch: &mut [MaybeUninit<T>], is_less: &F)
where
    F: Fn(&T, &T) -> bool,
{
    let len = v.len();
    if mem::size_of::<T>() == 0 || runs_in_order(v, mid, is_less) {
        return;
    }
    assert!(scratch.len() >= mid, "scratch of {} cannot hold run of {mid}", scratch.len());

    let v = v.as_mut_ptr();
    let buf = scratch.as_mut_ptr().cast::<T>();
    // SAFETY: `mid < len`, `scratch` holds at least `mid` slots and does not
    // overlap `v`. After the copy the left run lives only in `buf`; the hole
    // tracks the gap `[dest, right)` in `v` that it must be written back to,
    // and its length always equals the unconsumed part of `buf`.
    unsafe {
        ptr::copy_nonoverlapping(v, buf, mid);
        let mut hole = MergeHole {
            start: buf,
            end: buf.add(mid),
            dest: v,
        };
        let mut right = v.add(mid);
        let right_end = v.add(len);
        while hole.start < hole.end && right < right_end {
            // Ties take from the left run, which keeps the merge stable.
            let src = if is_less(&*right, &*hole.start) {
                let src = right;
                right = right.add(1);
                src
            } else {
                let src = hole.start;
                hole.start = hole.start.add(1);
                src
            };
            ptr::copy_nonoverlapping(src, hole.dest, 1);
            hole.dest = hole.dest.add(1);
        }
    }
}

/// Writes the unconsumed part of the left run back into the gap on drop.
struct MergeHole<T> {
    start: *mut T,
    end: *mut T,
    dest: *mut T,
}

impl<T> Drop for MergeHole<T> {
    fn drop(&mut self) {
        // SAFETY: `[start, end)` are initialized scratch elements and the gap
        // at `dest` has exactly that many slots.
        unsafe {
            let len = self.end.offset_from(self.start) as usize;
            ptr::copy_nonoverlapping(self.start, self.dest, len);
        }
    }
}
