//! Cutoff splitting.
//!
//! Every recursive algorithm asks the same question at every node: is the
//! remaining range small enough to run sequentially? [`find_cutoff`] answers
//! it in O(1) for index ranges; [`find_cutoff_iter`] answers it for ranges
//! that can only be walked, touching at most `cutoff + 1` elements.

/// Returns `end` if `[begin, end)` holds at most `cutoff` elements, otherwise
/// `begin + cutoff`.
///
/// A cutoff of 0 behaves as 1 so that recursion always terminates.
#[must_use]
pub fn find_cutoff(begin: usize, cutoff: usize, end: usize) -> usize {
    debug_assert!(begin <= end, "inverted range {begin}..{end}");
    let cutoff = cutoff.max(1);
    if end.saturating_sub(begin) <= cutoff {
        end
    } else {
        begin + cutoff
    }
}

/// Where [`find_cutoff_iter`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffPoint {
    /// The whole remainder fits; holds its length.
    End(usize),
    /// The remainder is longer than the cutoff; holds the cutoff.
    Inside(usize),
}

impl CutoffPoint {
    /// Number of elements before the cutoff point.
    #[must_use]
    pub fn position(self) -> usize {
        match self {
            Self::End(n) | Self::Inside(n) => n,
        }
    }

    /// Returns true if the cutoff point is the end of the range.
    #[must_use]
    pub fn is_end(self) -> bool {
        matches!(self, Self::End(_))
    }
}

/// [`find_cutoff`] for forward-only ranges.
///
/// Advances `iter` by at most `cutoff + 1` elements (saturating).
pub fn find_cutoff_iter<I: Iterator>(iter: I, cutoff: usize) -> CutoffPoint {
    let cutoff = cutoff.max(1);
    let seen = iter.take(cutoff.saturating_add(1)).count();
    if seen <= cutoff {
        CutoffPoint::End(seen)
    } else {
        CutoffPoint::Inside(cutoff)
    }
}

/// Midpoint of `[begin, end)`, rounding down.
#[must_use]
pub fn midpoint(begin: usize, end: usize) -> usize {
    begin + (end - begin) / 2
}

/// Returns true if a range of `len` elements is a base case for `cutoff`.
#[must_use]
pub fn is_base_case(len: usize, cutoff: usize) -> bool {
    find_cutoff(0, cutoff, len) == len
}
