//! Document store
//!
//! [`Document`] owns the text, the attachments and every annotation merged
//! into it. Annotations live in an insertion-ordered arena; the
//! [`AnnotationIndex`] only holds ids into that arena.
//!
//! # Invariants
//! - every span-capable annotation satisfies `0 <= begin < end <= len(text)`,
//!   checked on insertion
//! - a batch added through [`Document::add_batch`] is validated completely
//!   before the first annotation is inserted
//! - the text is only replaceable while no annotation refers to it

use crate::annotation::{Annotation, AnnotationKind, AnnotationVariant};
use crate::attachment::Attachment;
use crate::error::DocumentError;
use crate::index::{AnnotationId, AnnotationIndex};
use crate::span::Span;
use std::collections::HashMap;

/// Language tag used until the caller sets one
pub const UNSPECIFIED_LANGUAGE: &str = "x-unspecified";

/// Who inserted an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Added directly by the caller
    Caller,
    /// Merged from the pipeline stage at this position
    Stage(usize),
}

/// Annotation plus bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAnnotation {
    /// Arena id
    pub id: AnnotationId,
    /// Inserting party
    pub origin: Origin,
    /// The annotation itself
    pub annotation: Annotation,
}

/// The shared unit of work flowing through a pipeline
#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    char_len: usize,
    language: String,
    attachments: Vec<Attachment>,
    annotations: Vec<StoredAnnotation>,
    index: AnnotationIndex,
}

impl Document {
    /// Create empty document
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            text: String::new(),
            char_len: 0,
            language: UNSPECIFIED_LANGUAGE.to_string(),
            attachments: Vec::new(),
            annotations: Vec::new(),
            index: AnnotationIndex::new(),
        }
    }

    /// Create document with text and language
    #[must_use]
    pub fn with_text(text: impl Into<String>, language: impl Into<String>) -> Self {
        let mut doc = Self::new();
        doc.replace_text(text.into());
        doc.set_language(language);
        doc
    }

    /// Replace the whole text
    ///
    /// Stored spans are offsets into the current text, so the text can only
    /// change while the document holds no annotations. Attachment ranges
    /// must still fit the new text.
    ///
    /// # Errors
    /// - `TextLocked` if any annotation is present
    /// - `SpanOutOfRange` if an attachment range exceeds the new text
    pub fn set_text(&mut self, text: impl Into<String>) -> Result<(), DocumentError> {
        if !self.annotations.is_empty() {
            return Err(DocumentError::TextLocked {
                annotations: self.annotations.len(),
            });
        }

        let text = text.into();
        let len = text.chars().count();
        for attachment in &self.attachments {
            attachment.metadata.range.check_bounds(len)?;
        }
        self.replace_text(text);
        Ok(())
    }

    fn replace_text(&mut self, text: String) {
        self.char_len = text.chars().count();
        self.text = text;
    }

    /// Set the language tag
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    /// Document text
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text length in characters (the coordinate space of spans)
    #[inline]
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    /// Language tag
    #[inline]
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Text covered by `span`, if it lies inside the document
    #[must_use]
    pub fn covered_text(&self, span: Span) -> Option<&str> {
        if span.check_bounds(self.char_len).is_err() {
            return None;
        }
        let start = self.byte_offset(span.begin)?;
        let end = self.byte_offset(span.end)?;
        self.text.get(start..end)
    }

    fn byte_offset(&self, char_offset: usize) -> Option<usize> {
        if char_offset == self.char_len {
            return Some(self.text.len());
        }
        self.text.char_indices().nth(char_offset).map(|(i, _)| i)
    }

    /// Attach a binary payload
    ///
    /// # Errors
    /// Returns `DocumentError::SpanOutOfRange` if the synchronisation range
    /// falls outside the current text
    pub fn add_attachment(&mut self, mut attachment: Attachment) -> Result<u32, DocumentError> {
        attachment.metadata.range.check_bounds(self.char_len)?;
        let id = u32::try_from(self.attachments.len()).unwrap_or(u32::MAX);
        attachment.id = id;
        self.attachments.push(attachment);
        Ok(id)
    }

    /// All attachments in insertion order
    #[inline]
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Attachments of one kind
    pub fn attachments_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Attachment> + 'a {
        self.attachments.iter().filter(move |a| a.kind == kind)
    }

    /// Check a single annotation against the text without inserting it
    ///
    /// # Errors
    /// Returns `SpanOutOfRange`/`InvalidSpan` for bad spans
    pub fn check_annotation(&self, annotation: &Annotation) -> Result<(), DocumentError> {
        match annotation.span() {
            Some(span) => span.check_annotation(self.char_len),
            None => Ok(()),
        }
    }

    /// Insert an annotation added by the caller
    ///
    /// # Errors
    /// Returns `SpanOutOfRange`/`InvalidSpan` if the span leaves the text
    pub fn add_annotation(
        &mut self,
        annotation: impl Into<Annotation>,
    ) -> Result<AnnotationId, DocumentError> {
        self.add_annotation_from(annotation.into(), Origin::Caller)
    }

    /// Insert an annotation with explicit origin
    ///
    /// # Errors
    /// Returns `SpanOutOfRange`/`InvalidSpan` if the span leaves the text
    pub fn add_annotation_from(
        &mut self,
        annotation: Annotation,
        origin: Origin,
    ) -> Result<AnnotationId, DocumentError> {
        self.check_annotation(&annotation)?;

        let id = AnnotationId(self.annotations.len());
        self.index.insert(annotation.kind(), annotation.span(), id);
        self.annotations.push(StoredAnnotation {
            id,
            origin,
            annotation,
        });
        Ok(id)
    }

    /// Validate a batch produced by one party
    ///
    /// Checks, in order: every span against the text; no two spans of the
    /// same kind in the batch overlap; no span repeats one already present.
    ///
    /// # Errors
    /// The first violation found
    pub fn check_batch(&self, batch: &[Annotation]) -> Result<(), DocumentError> {
        let mut by_kind: HashMap<AnnotationKind, Vec<Span>> = HashMap::new();

        for annotation in batch {
            self.check_annotation(annotation)?;
            if let Some(span) = annotation.span() {
                if self.index.contains_span(annotation.kind(), span) {
                    return Err(DocumentError::DuplicateSpan {
                        kind: annotation.kind(),
                        span,
                    });
                }
                by_kind.entry(annotation.kind()).or_default().push(span);
            }
        }

        let mut kinds: Vec<_> = by_kind.into_iter().collect();
        kinds.sort_by_key(|(kind, _)| *kind);

        for (kind, mut spans) in kinds {
            spans.sort_unstable();
            for pair in spans.windows(2) {
                if pair[0] == pair[1] {
                    return Err(DocumentError::DuplicateSpan {
                        kind,
                        span: pair[0],
                    });
                }
                if pair[0].overlaps(&pair[1]) {
                    return Err(DocumentError::OverlappingSpans {
                        kind,
                        first: pair[0],
                        second: pair[1],
                    });
                }
            }
        }

        Ok(())
    }

    /// Validate then insert a whole batch
    ///
    /// Nothing is inserted if any annotation fails validation.
    ///
    /// # Errors
    /// See [`Document::check_batch`]
    pub fn add_batch(
        &mut self,
        batch: Vec<Annotation>,
        origin: Origin,
    ) -> Result<Vec<AnnotationId>, DocumentError> {
        self.check_batch(&batch)?;
        batch
            .into_iter()
            .map(|annotation| self.add_annotation_from(annotation, origin))
            .collect()
    }

    /// Annotations of `kind` in index order
    pub fn select(&self, kind: AnnotationKind) -> impl Iterator<Item = &Annotation> + '_ {
        self.index
            .select(kind)
            .map(move |id| &self.annotations[id.0].annotation)
    }

    /// Typed selection, e.g. `doc.select_typed::<SegmentSpan>()`
    pub fn select_typed<'a, T: AnnotationVariant + 'a>(&'a self) -> impl Iterator<Item = &'a T> + 'a {
        self.select(T::KIND).filter_map(T::from_annotation)
    }

    /// Span annotations of `kind` lying inside `range`
    pub fn select_within(
        &self,
        kind: AnnotationKind,
        range: Span,
    ) -> impl Iterator<Item = &Annotation> + '_ {
        self.index
            .select_within(kind, range)
            .map(move |id| &self.annotations[id.0].annotation)
    }

    /// Span annotations of `kind` covering `offset`
    pub fn select_covering(
        &self,
        kind: AnnotationKind,
        offset: usize,
    ) -> impl Iterator<Item = &Annotation> + '_ {
        self.index
            .select_covering(kind, offset)
            .map(move |id| &self.annotations[id.0].annotation)
    }

    /// Annotations of `kind` merged by the given stage, in index order
    pub fn select_from_stage(
        &self,
        kind: AnnotationKind,
        stage: usize,
    ) -> impl Iterator<Item = &Annotation> + '_ {
        self.index
            .select(kind)
            .map(move |id| &self.annotations[id.0])
            .filter(move |stored| stored.origin == Origin::Stage(stage))
            .map(|stored| &stored.annotation)
    }

    /// Number of annotations of `kind`
    #[inline]
    #[must_use]
    pub fn count(&self, kind: AnnotationKind) -> usize {
        self.index.count(kind)
    }

    /// Look up by id
    #[inline]
    #[must_use]
    pub fn get(&self, id: AnnotationId) -> Option<&StoredAnnotation> {
        self.annotations.get(id.0)
    }

    /// Every annotation in insertion order
    #[inline]
    #[must_use]
    pub fn annotations(&self) -> &[StoredAnnotation] {
        &self.annotations
    }

    /// The type index
    #[inline]
    #[must_use]
    pub fn index(&self) -> &AnnotationIndex {
        &self.index
    }

    /// Clear text, language, attachments and annotations
    pub fn reset(&mut self) {
        self.text.clear();
        self.char_len = 0;
        self.language = UNSPECIFIED_LANGUAGE.to_string();
        self.attachments.clear();
        self.annotations.clear();
        self.index.clear();
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{DocumentModification, SegmentSpan};
    use crate::attachment::{AudioFormat, Attachment};
    use pretty_assertions::assert_eq;

    const EXAMPLE: &str =
        "This is a very great example sentence! I absolutely hate this example. ";

    fn seg(begin: usize, end: usize) -> Annotation {
        SegmentSpan::new(begin, end).into()
    }

    #[test]
    fn add_annotation_checks_range_on_insert() {
        let mut doc = Document::with_text("Example text", "de");
        assert!(doc.add_annotation(SegmentSpan::new(0, 12)).is_ok());

        let err = doc.add_annotation(SegmentSpan::new(5, 13)).unwrap_err();
        assert_eq!(
            err,
            DocumentError::SpanOutOfRange {
                begin: 5,
                end: 13,
                len: 12
            }
        );
        assert_eq!(doc.count(AnnotationKind::Segment), 1);
    }

    #[test]
    fn empty_text_rejects_every_span() {
        let mut doc = Document::with_text("", "en");
        assert!(doc.add_annotation(SegmentSpan::new(0, 1)).is_err());
        assert!(doc
            .add_annotation(DocumentModification::now("stage", "ran"))
            .is_ok());
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let mut doc = Document::with_text("Grüße aus Köln.", "de");
        assert_eq!(doc.char_len(), 15);
        assert!(doc.add_annotation(SegmentSpan::new(0, 15)).is_ok());
        assert_eq!(doc.covered_text(Span::new(0, 5)), Some("Grüße"));
        assert_eq!(doc.covered_text(Span::new(10, 15)), Some("Köln."));
    }

    #[test]
    fn select_returns_span_order() {
        let mut doc = Document::with_text(EXAMPLE, "en");
        doc.add_annotation(SegmentSpan::new(39, 70)).unwrap();
        doc.add_annotation(SegmentSpan::new(0, 38)).unwrap();

        let spans: Vec<_> = doc
            .select_typed::<SegmentSpan>()
            .map(|s| (s.begin, s.end))
            .collect();
        assert_eq!(spans, vec![(0, 38), (39, 70)]);
        assert_eq!(
            doc.covered_text(Span::new(0, 38)),
            Some("This is a very great example sentence!")
        );
    }

    #[test]
    fn check_batch_rejects_overlap() {
        let doc = Document::with_text(EXAMPLE, "en");
        let err = doc.check_batch(&[seg(0, 38), seg(30, 50)]).unwrap_err();
        assert!(matches!(err, DocumentError::OverlappingSpans { .. }));
    }

    #[test]
    fn check_batch_rejects_repeat_of_existing_span() {
        let mut doc = Document::with_text(EXAMPLE, "en");
        doc.add_annotation(SegmentSpan::new(0, 38)).unwrap();
        let err = doc.check_batch(&[seg(0, 38)]).unwrap_err();
        assert!(matches!(err, DocumentError::DuplicateSpan { .. }));
    }

    #[test]
    fn check_batch_rejects_duplicate_inside_batch() {
        let doc = Document::with_text(EXAMPLE, "en");
        let err = doc.check_batch(&[seg(0, 38), seg(0, 38)]).unwrap_err();
        assert!(matches!(err, DocumentError::DuplicateSpan { .. }));
    }

    #[test]
    fn add_batch_is_all_or_nothing() {
        let mut doc = Document::with_text(EXAMPLE, "en");
        let result = doc.add_batch(vec![seg(0, 38), seg(39, 99)], Origin::Stage(0));
        assert!(result.is_err());
        assert!(doc.annotations().is_empty());

        let ids = doc
            .add_batch(vec![seg(39, 70), seg(0, 38)], Origin::Stage(0))
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(doc.select_from_stage(AnnotationKind::Segment, 0).count(), 2);
        assert_eq!(doc.select_from_stage(AnnotationKind::Segment, 1).count(), 0);
    }

    #[test]
    fn select_within_and_covering() {
        let mut doc = Document::with_text(EXAMPLE, "en");
        doc.add_batch(vec![seg(0, 38), seg(39, 70)], Origin::Caller)
            .unwrap();

        assert_eq!(
            doc.select_within(AnnotationKind::Segment, Span::new(0, 40)).count(),
            1
        );
        let covering: Vec<_> = doc
            .select_covering(AnnotationKind::Segment, 45)
            .filter_map(Annotation::span)
            .collect();
        assert_eq!(covering, vec![Span::new(39, 70)]);
    }

    #[test]
    fn attachment_range_checked_and_ids_assigned() {
        let mut doc = Document::with_text("Example text", "de");
        let audio = Attachment::audio(b"pcm", AudioFormat::SPEECH_16K_MONO, Span::new(0, 12));
        assert_eq!(doc.add_attachment(audio.clone()).unwrap(), 0);
        assert_eq!(doc.add_attachment(audio).unwrap(), 1);
        assert_eq!(doc.attachments_of("audio").count(), 2);

        let too_long = Attachment::audio(b"pcm", AudioFormat::SPEECH_16K_MONO, Span::new(0, 13));
        assert!(doc.add_attachment(too_long).is_err());
    }

    #[test]
    fn set_text_refused_while_annotated() {
        let mut doc = Document::with_text("Example text", "en");
        doc.add_annotation(SegmentSpan::new(0, 12)).unwrap();

        assert_eq!(
            doc.set_text("ab"),
            Err(DocumentError::TextLocked { annotations: 1 })
        );
        assert_eq!(doc.text(), "Example text");
        assert_eq!(doc.covered_text(Span::new(0, 12)), Some("Example text"));

        doc.reset();
        doc.set_text("ab").unwrap();
        assert_eq!(doc.char_len(), 2);
    }

    #[test]
    fn set_text_checks_attachment_ranges() {
        let mut doc = Document::with_text("Example text", "en");
        doc.add_attachment(Attachment::from_bytes("image", b"x", Span::new(0, 7)))
            .unwrap();

        assert!(matches!(
            doc.set_text("ab"),
            Err(DocumentError::SpanOutOfRange { end: 7, len: 2, .. })
        ));
        assert_eq!(doc.char_len(), 12);

        doc.set_text("Another text").unwrap();
        assert_eq!(doc.text(), "Another text");
    }

    #[test]
    fn reset_clears_everything() {
        let mut doc = Document::with_text(EXAMPLE, "en");
        doc.add_annotation(SegmentSpan::new(0, 38)).unwrap();
        doc.add_attachment(Attachment::from_bytes("image", b"x", Span::new(0, 0)))
            .unwrap();

        doc.reset();

        assert_eq!(doc.text(), "");
        assert_eq!(doc.language(), UNSPECIFIED_LANGUAGE);
        assert!(doc.attachments().is_empty());
        assert!(doc.index().is_empty());
        assert!(doc.add_annotation(SegmentSpan::new(0, 1)).is_err());
    }
}
