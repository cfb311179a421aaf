//! Half-open character ranges over document text

use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open character range `[begin, end)` into document text
///
/// Offsets count Unicode scalar values, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start offset
    pub begin: usize,
    /// Exclusive end offset
    pub end: usize,
}

impl Span {
    /// Create a span without validation
    #[inline]
    #[must_use]
    pub const fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    /// Number of characters covered
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    /// True when `begin >= end`
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    /// Check whether two spans share at least one character
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Span) -> bool {
        self.begin < other.end && other.begin < self.end
    }

    /// Check whether `self` lies entirely inside `outer`
    #[inline]
    #[must_use]
    pub fn is_within(&self, outer: &Span) -> bool {
        outer.begin <= self.begin && self.end <= outer.end
    }

    /// Check whether the character at `offset` is covered
    #[inline]
    #[must_use]
    pub fn covers(&self, offset: usize) -> bool {
        self.begin <= offset && offset < self.end
    }

    /// Validate as an annotation span: `0 <= begin < end <= text_len`
    ///
    /// # Errors
    /// - `DocumentError::InvalidSpan` for empty or reversed spans
    /// - `DocumentError::SpanOutOfRange` when `end` exceeds the text
    pub fn check_annotation(&self, text_len: usize) -> Result<(), DocumentError> {
        if self.is_empty() {
            return Err(DocumentError::InvalidSpan {
                begin: self.begin,
                end: self.end,
            });
        }
        self.check_bounds(text_len)
    }

    /// Validate as a range that may be empty: `begin <= end <= text_len`
    ///
    /// # Errors
    /// Returns `DocumentError::SpanOutOfRange` if the range leaves the text
    pub fn check_bounds(&self, text_len: usize) -> Result<(), DocumentError> {
        if self.begin > self.end || self.end > text_len {
            return Err(DocumentError::out_of_range(*self, text_len));
        }
        Ok(())
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.begin, self.end)
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}
