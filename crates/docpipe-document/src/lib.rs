//! docpipe Document Store
//!
//! The shared, annotated document that flows through a pipeline.
//!
//! # Core Concepts
//!
//! - [`Document`]: text, language, attachments and owned annotations
//! - [`Annotation`]: closed set of annotation variants
//! - [`AnnotationIndex`]: per-kind ordered index over a document's annotations
//! - [`Attachment`]: base64 binary payload (e.g. audio) with metadata
//! - [`Span`]: half-open character range into the text
//!
//! # Example
//!
//! ```rust
//! use docpipe_document::{Document, SegmentSpan};
//!
//! let mut doc = Document::with_text("Hello there. General Kenobi.", "en");
//! doc.add_annotation(SegmentSpan::new(13, 28)).unwrap();
//! doc.add_annotation(SegmentSpan::new(0, 12)).unwrap();
//!
//! let begins: Vec<_> = doc.select_typed::<SegmentSpan>().map(|s| s.begin).collect();
//! assert_eq!(begins, vec![0, 13]);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod annotation;
mod attachment;
mod document;
mod error;
mod index;
mod span;

// Re-exports
pub use annotation::{
    Annotation, AnnotationKind, AnnotationVariant, AnnotatorMetaData, DocumentModification,
    SegmentSpan, SpeakerTurn, Transcription,
};
pub use attachment::{Attachment, AttachmentMetadata, AudioFormat, AUDIO_KIND};
pub use document::{Document, Origin, StoredAnnotation, UNSPECIFIED_LANGUAGE};
pub use error::DocumentError;
pub use index::{AnnotationId, AnnotationIndex, Selection};
pub use span::Span;

/// Sealed trait support for annotation variants.
/// **Note:** This is only for internal/testing use and may change.
#[doc(hidden)]
pub mod __private {
    pub use super::annotation::private::Sealed;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
