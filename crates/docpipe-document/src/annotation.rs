//! Annotation variants
//!
//! The set of annotation types is closed: every variant the pipeline can
//! carry is listed in [`Annotation`]. Variants are either span-capable
//! (anchored to a character range of the document text) or unordered.
//!
//! Typed selection goes through [`AnnotationVariant`], which maps a concrete
//! struct to its [`AnnotationKind`] and back out of an [`Annotation`].

use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of [`Annotation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Text segment such as a sentence
    Segment,
    /// Provenance record for a produced segment
    AnnotatorMetaData,
    /// Marker that a stage touched the document
    DocumentModification,
    /// Timed word or utterance from an audio attachment
    Transcription,
    /// Speaker diarization turn from an audio attachment
    SpeakerTurn,
}

impl AnnotationKind {
    /// All kinds, in declaration order
    pub const ALL: [AnnotationKind; 5] = [
        AnnotationKind::Segment,
        AnnotationKind::AnnotatorMetaData,
        AnnotationKind::DocumentModification,
        AnnotationKind::Transcription,
        AnnotationKind::SpeakerTurn,
    ];

    /// Whether annotations of this kind carry a text span
    #[inline]
    #[must_use]
    pub fn is_span(self) -> bool {
        matches!(self, AnnotationKind::Segment)
    }

    /// Stable lowercase name (matches the wire tag)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Segment => "segment",
            AnnotationKind::AnnotatorMetaData => "annotator_meta_data",
            AnnotationKind::DocumentModification => "document_modification",
            AnnotationKind::Transcription => "transcription",
            AnnotationKind::SpeakerTurn => "speaker_turn",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text segment, e.g. a sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentSpan {
    /// Inclusive start offset
    pub begin: usize,
    /// Exclusive end offset
    pub end: usize,
}

impl SegmentSpan {
    /// Create segment
    #[inline]
    #[must_use]
    pub const fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    /// Covered range
    #[inline]
    #[must_use]
    pub fn span(&self) -> Span {
        Span::new(self.begin, self.end)
    }
}

/// Provenance of one produced segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatorMetaData {
    /// Producing component name
    pub component: String,
    /// Producing component version
    pub version: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    /// Model used by the component, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl AnnotatorMetaData {
    /// Create provenance record stamped with the current time
    #[must_use]
    pub fn now(component: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            version: version.into(),
            timestamp: chrono::Utc::now().timestamp(),
            model_name: None,
        }
    }

    /// With model name
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }
}

/// Record that a stage executed against the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentModification {
    /// Who modified the document (component name)
    pub user: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
    /// Free-form description
    pub description: String,
}

impl DocumentModification {
    /// Create modification record stamped with the current time
    #[must_use]
    pub fn now(user: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            timestamp: chrono::Utc::now().timestamp(),
            description: description.into(),
        }
    }
}

/// Timed utterance transcribed from an audio attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    /// Start time in the audio (seconds)
    pub start_time: f64,
    /// End time in the audio (seconds)
    pub end_time: f64,
    /// Speaker label
    pub speaker: String,
    /// Transcribed text
    pub utterance: String,
    /// Producing model
    pub model: String,
    /// Source attachment
    pub attachment_id: u32,
}

/// Speaker turn from diarization of an audio attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    /// Audio channel
    pub channel: u32,
    /// Turn onset (seconds)
    pub onset: f64,
    /// Turn duration (seconds)
    pub duration: f64,
    /// Speaker label
    pub speaker: String,
    /// Confidence score, absent when the model reports none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Producing model
    pub model: String,
    /// Source attachment
    pub attachment_id: u32,
}

/// A typed fact attached to a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    /// Span-capable text segment
    Segment(SegmentSpan),
    /// Segment provenance
    AnnotatorMetaData(AnnotatorMetaData),
    /// Stage execution marker
    DocumentModification(DocumentModification),
    /// Audio transcription
    Transcription(Transcription),
    /// Audio speaker turn
    SpeakerTurn(SpeakerTurn),
}

impl Annotation {
    /// Variant discriminant
    #[must_use]
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Annotation::Segment(_) => AnnotationKind::Segment,
            Annotation::AnnotatorMetaData(_) => AnnotationKind::AnnotatorMetaData,
            Annotation::DocumentModification(_) => AnnotationKind::DocumentModification,
            Annotation::Transcription(_) => AnnotationKind::Transcription,
            Annotation::SpeakerTurn(_) => AnnotationKind::SpeakerTurn,
        }
    }

    /// Text span, for span-capable variants
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            Annotation::Segment(s) => Some(s.span()),
            _ => None,
        }
    }
}

/// Sealed mapping between a variant struct and [`Annotation`]
pub trait AnnotationVariant: private::Sealed + Sized {
    /// Kind this struct represents
    const KIND: AnnotationKind;

    /// Borrow the struct out of an annotation of matching kind
    fn from_annotation(annotation: &Annotation) -> Option<&Self>;

    /// Wrap into an [`Annotation`]
    fn into_annotation(self) -> Annotation;
}

/// Sealed trait - prevents external implementations
#[doc(hidden)]
pub mod private {
    /// Sealed trait marker
    pub trait Sealed {}
}

macro_rules! impl_variant {
    ($ty:ty, $variant:ident) => {
        impl private::Sealed for $ty {}

        impl AnnotationVariant for $ty {
            const KIND: AnnotationKind = AnnotationKind::$variant;

            #[inline]
            fn from_annotation(annotation: &Annotation) -> Option<&Self> {
                match annotation {
                    Annotation::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            #[inline]
            fn into_annotation(self) -> Annotation {
                Annotation::$variant(self)
            }
        }

        impl From<$ty> for Annotation {
            fn from(value: $ty) -> Self {
                Annotation::$variant(value)
            }
        }
    };
}

impl_variant!(SegmentSpan, Segment);
impl_variant!(AnnotatorMetaData, AnnotatorMetaData);
impl_variant!(DocumentModification, DocumentModification);
impl_variant!(Transcription, Transcription);
impl_variant!(SpeakerTurn, SpeakerTurn);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_matches_variant() {
        let a: Annotation = SegmentSpan::new(0, 4).into();
        assert_eq!(a.kind(), AnnotationKind::Segment);
        assert_eq!(a.span(), Some(Span::new(0, 4)));

        let m: Annotation = DocumentModification::now("seg", "ran").into();
        assert_eq!(m.kind(), AnnotationKind::DocumentModification);
        assert_eq!(m.span(), None);
    }

    #[test]
    fn only_segments_are_span_capable() {
        let spans: Vec<_> = AnnotationKind::ALL.iter().filter(|k| k.is_span()).collect();
        assert_eq!(spans, vec![&AnnotationKind::Segment]);
    }

    #[test]
    fn wire_tag_matches_kind_name() {
        let a: Annotation = SegmentSpan::new(1, 2).into();
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "segment");
        assert_eq!(json["begin"], 1);

        for kind in AnnotationKind::ALL {
            let tag = serde_json::to_value(kind).unwrap();
            assert_eq!(tag, kind.as_str());
        }
    }

    #[test]
    fn decodes_tagged_metadata() {
        let json = r#"{"type":"annotator_meta_data","component":"spacy","version":"0.3","timestamp":17}"#;
        let a: Annotation = serde_json::from_str(json).unwrap();
        let meta = AnnotatorMetaData::from_annotation(&a).unwrap();
        assert_eq!(meta.component, "spacy");
        assert_eq!(meta.model_name, None);
    }

    #[test]
    fn variants_are_sealed() {
        fn sealed<T: crate::__private::Sealed + AnnotationVariant>() -> AnnotationKind {
            T::KIND
        }
        assert_eq!(sealed::<SegmentSpan>(), AnnotationKind::Segment);
        assert_eq!(sealed::<Transcription>(), AnnotationKind::Transcription);
    }

    #[test]
    fn typed_accessor_rejects_other_kind() {
        let a: Annotation = SegmentSpan::new(0, 1).into();
        assert!(DocumentModification::from_annotation(&a).is_none());
        assert!(SegmentSpan::from_annotation(&a).is_some());
    }
}
