//! Annotation index
//!
//! Provides [`AnnotationIndex`] for typed, ordered retrieval of annotations.
//!
//! The index never owns annotations. It stores [`AnnotationId`]s pointing
//! into the document's annotation arena:
//! - span-capable kinds live in one `BTreeSet` per kind, keyed by
//!   `(begin, end, id)`, so a full select is O(k) and a range select is
//!   O(log n + k)
//! - unordered kinds keep insertion order in a plain `Vec`

use crate::annotation::AnnotationKind;
use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::collections::{btree_set, BTreeSet, HashMap};
use std::fmt;

/// Position of an annotation in its document's arena
///
/// Ids are assigned in insertion order, which makes them the final
/// tie-breaker for spans with equal offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnnotationId(pub usize);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SpanKey {
    begin: usize,
    end: usize,
    id: AnnotationId,
}

impl SpanKey {
    fn lowest(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end,
            id: AnnotationId(0),
        }
    }

    fn highest(begin: usize, end: usize) -> Self {
        Self {
            begin,
            end,
            id: AnnotationId(usize::MAX),
        }
    }
}

/// Type-indexed view over a document's annotations
#[derive(Debug, Default, Clone)]
pub struct AnnotationIndex {
    spans: HashMap<AnnotationKind, BTreeSet<SpanKey>>,
    unordered: HashMap<AnnotationKind, Vec<AnnotationId>>,
}

impl AnnotationIndex {
    /// Create empty index
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an annotation
    ///
    /// `span` must be `Some` exactly for span-capable kinds; unordered
    /// entries ignore it.
    pub fn insert(&mut self, kind: AnnotationKind, span: Option<Span>, id: AnnotationId) {
        match span {
            Some(span) if kind.is_span() => {
                self.spans.entry(kind).or_default().insert(SpanKey {
                    begin: span.begin,
                    end: span.end,
                    id,
                });
            }
            _ => self.unordered.entry(kind).or_default().push(id),
        }
    }

    /// All annotations of `kind`, ascending by `(begin, end, insertion)`
    /// for spans and in insertion order otherwise
    #[must_use]
    pub fn select(&self, kind: AnnotationKind) -> Selection<'_> {
        let inner = if let Some(set) = self.spans.get(&kind) {
            SelectionInner::Spans(set.iter())
        } else if let Some(ids) = self.unordered.get(&kind) {
            SelectionInner::Unordered(ids.iter())
        } else {
            SelectionInner::Empty
        };
        Selection { inner }
    }

    /// Span annotations of `kind` lying entirely inside `range`
    pub fn select_within(
        &self,
        kind: AnnotationKind,
        range: Span,
    ) -> impl Iterator<Item = AnnotationId> + '_ {
        self.spans
            .get(&kind)
            .filter(|_| !range.is_empty())
            .into_iter()
            .flat_map(move |set| {
                set.range(SpanKey::lowest(range.begin, 0)..SpanKey::lowest(range.end, 0))
            })
            .filter(move |key| key.end <= range.end)
            .map(|key| key.id)
    }

    /// Span annotations of `kind` covering the character at `offset`
    ///
    /// Scans every span starting at or before `offset`.
    pub fn select_covering(
        &self,
        kind: AnnotationKind,
        offset: usize,
    ) -> impl Iterator<Item = AnnotationId> + '_ {
        self.spans
            .get(&kind)
            .into_iter()
            .flat_map(move |set| set.range(..=SpanKey::highest(offset, usize::MAX)))
            .filter(move |key| key.end > offset)
            .map(|key| key.id)
    }

    /// Whether a span of `kind` with exactly these offsets exists
    #[must_use]
    pub fn contains_span(&self, kind: AnnotationKind, span: Span) -> bool {
        self.spans.get(&kind).is_some_and(|set| {
            set.range(SpanKey::lowest(span.begin, span.end)..=SpanKey::highest(span.begin, span.end))
                .next()
                .is_some()
        })
    }

    /// Number of annotations of `kind`
    #[must_use]
    pub fn count(&self, kind: AnnotationKind) -> usize {
        self.spans.get(&kind).map_or(0, BTreeSet::len)
            + self.unordered.get(&kind).map_or(0, Vec::len)
    }

    /// Kinds with at least one annotation, in declaration order
    #[must_use]
    pub fn kinds(&self) -> Vec<AnnotationKind> {
        AnnotationKind::ALL
            .into_iter()
            .filter(|kind| self.count(*kind) > 0)
            .collect()
    }

    /// Total annotations indexed
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.values().map(BTreeSet::len).sum::<usize>()
            + self.unordered.values().map(Vec::len).sum::<usize>()
    }

    /// Check if index is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.spans.clear();
        self.unordered.clear();
    }
}

/// Ordered iterator returned by [`AnnotationIndex::select`]
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    inner: SelectionInner<'a>,
}

#[derive(Debug, Clone)]
enum SelectionInner<'a> {
    Spans(btree_set::Iter<'a, SpanKey>),
    Unordered(std::slice::Iter<'a, AnnotationId>),
    Empty,
}

impl Iterator for Selection<'_> {
    type Item = AnnotationId;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            SelectionInner::Spans(iter) => iter.next().map(|key| key.id),
            SelectionInner::Unordered(iter) => iter.next().copied(),
            SelectionInner::Empty => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            SelectionInner::Spans(iter) => iter.size_hint(),
            SelectionInner::Unordered(iter) => iter.size_hint(),
            SelectionInner::Empty => (0, Some(0)),
        }
    }
}

impl ExactSizeIterator for Selection<'_> {}
