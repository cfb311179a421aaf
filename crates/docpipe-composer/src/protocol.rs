//! Request and reply bodies of the annotator service contract
//!
//! A stage receives a [`DocumentSnapshot`] of everything merged so far and
//! answers with an [`AnnotationDelta`] holding only new annotations.

use docpipe_document::{Annotation, Attachment, Document};
use serde::{Deserialize, Serialize};

/// Document state sent to a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Full text
    pub text: String,
    /// Language tag
    pub language: String,
    /// Attachments visible to this instance
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Annotations merged so far, in insertion order
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl DocumentSnapshot {
    /// Capture the full document
    #[must_use]
    pub fn capture(document: &Document) -> Self {
        Self::with_attachments(document, document.attachments().to_vec())
    }

    /// Capture text and annotations with a chosen subset of attachments
    #[must_use]
    pub fn with_attachments(document: &Document, attachments: Vec<Attachment>) -> Self {
        Self {
            text: document.text().to_string(),
            language: document.language().to_string(),
            attachments,
            annotations: document
                .annotations()
                .iter()
                .map(|stored| stored.annotation.clone())
                .collect(),
        }
    }
}

/// Modification details a service may report about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationMeta {
    /// Reporting party
    pub user: String,
    /// Unix timestamp (seconds), if the service sets one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Free-form comment
    #[serde(default)]
    pub comment: String,
}

/// Reply of a stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDelta {
    /// Newly produced annotations
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    /// Self-reported modification details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_meta: Option<Vec<ModificationMeta>>,
}

impl AnnotationDelta {
    /// Delta carrying the given annotations
    #[must_use]
    pub fn new(annotations: Vec<Annotation>) -> Self {
        Self {
            annotations,
            modification_meta: None,
        }
    }

    /// With a modification entry
    #[inline]
    #[must_use]
    pub fn with_modification(mut self, user: impl Into<String>, comment: impl Into<String>) -> Self {
        self.modification_meta
            .get_or_insert_with(Vec::new)
            .push(ModificationMeta {
                user: user.into(),
                timestamp: None,
                comment: comment.into(),
            });
        self
    }

    /// First reported modification entry
    #[must_use]
    pub fn first_modification(&self) -> Option<&ModificationMeta> {
        self.modification_meta.as_ref().and_then(|m| m.first())
    }
}
