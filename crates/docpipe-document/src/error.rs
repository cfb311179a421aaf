//! Error types for the document store
//!
//! Every variant here describes an invariant the store refuses to break.
//! Callers merging annotator output treat all of them as fatal.

use crate::annotation::AnnotationKind;
use crate::span::Span;

/// Errors raised when mutating a [`Document`](crate::Document)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// Span offsets fall outside `[0, len(text)]`
    #[error("span {begin}..{end} out of range for text of length {len}")]
    SpanOutOfRange {
        /// Start offset (characters)
        begin: usize,
        /// End offset (characters, exclusive)
        end: usize,
        /// Text length in characters
        len: usize,
    },

    /// Span is empty or reversed
    #[error("invalid span {begin}..{end}: begin must be strictly less than end")]
    InvalidSpan {
        /// Start offset
        begin: usize,
        /// End offset
        end: usize,
    },

    /// Two spans of the same kind from one batch overlap
    #[error("overlapping {kind} spans {first} and {second}")]
    OverlappingSpans {
        /// Annotation kind
        kind: AnnotationKind,
        /// Earlier span
        first: Span,
        /// Later span
        second: Span,
    },

    /// Span of this kind already present in the document
    #[error("duplicate {kind} span {span}")]
    DuplicateSpan {
        /// Annotation kind
        kind: AnnotationKind,
        /// The repeated span
        span: Span,
    },

    /// Text cannot change while annotations point into it
    #[error("text is locked by {annotations} annotations; reset the document first")]
    TextLocked {
        /// Annotations currently stored
        annotations: usize,
    },

    /// Attachment payload is not valid base64
    #[error("attachment {id} payload invalid: {reason}")]
    InvalidPayload {
        /// Attachment id
        id: u32,
        /// Decoder message
        reason: String,
    },
}

impl DocumentError {
    /// Create out-of-range error
    #[inline]
    #[must_use]
    pub fn out_of_range(span: Span, len: usize) -> Self {
        Self::SpanOutOfRange {
            begin: span.begin,
            end: span.end,
            len,
        }
    }
}
