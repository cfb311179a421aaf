//! Minimal view of the `/v1/process` bodies
//!
//! Mock services and scripted drivers encode replies in whatever format the
//! request arrived in (JSON or YAML).

use docpipe_document::{Annotation, Attachment};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The parts of a snapshot the mocks look at
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotView {
    pub text: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// Reply body
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeltaBody {
    pub annotations: Vec<Annotation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modification_meta: Vec<ModificationEntry>,
}

/// Self-reported modification entry
#[derive(Debug, Clone, Serialize)]
pub struct ModificationEntry {
    pub user: String,
    pub comment: String,
}

impl DeltaBody {
    pub fn new(annotations: Vec<Annotation>) -> Self {
        Self {
            annotations,
            modification_meta: Vec::new(),
        }
    }

    pub fn with_modification(mut self, user: &str, comment: &str) -> Self {
        self.modification_meta.push(ModificationEntry {
            user: user.to_string(),
            comment: comment.to_string(),
        });
        self
    }
}

pub fn is_yaml(content_type: &str) -> bool {
    content_type.contains("yaml")
}

pub fn encode<T: Serialize>(content_type: &str, value: &T) -> anyhow::Result<Vec<u8>> {
    if is_yaml(content_type) {
        Ok(serde_yaml::to_string(value)?.into_bytes())
    } else {
        Ok(serde_json::to_vec(value)?)
    }
}

pub fn decode<T: DeserializeOwned>(content_type: &str, body: &[u8]) -> anyhow::Result<T> {
    if is_yaml(content_type) {
        Ok(serde_yaml::from_slice(body)?)
    } else {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Sentence boundaries as half-open character offsets
///
/// A sentence runs up to and including its terminal punctuation; leading
/// whitespace is not part of it. A trailing fragment without punctuation
/// counts as a sentence too.
pub fn segment_sentences(text: &str) -> Vec<(usize, usize)> {
    let Ok(pattern) = regex::Regex::new(r"[^.!?]+(?:[.!?]+|$)") else {
        return Vec::new();
    };

    pattern
        .find_iter(text)
        .filter_map(|m| {
            let matched = m.as_str();
            let trimmed = matched.trim_start();
            if trimmed.trim_end().is_empty() {
                return None;
            }
            let start_byte = m.start() + (matched.len() - trimmed.len());
            let end_byte = m.start() + matched.trim_end().len();
            let begin = text[..start_byte].chars().count();
            let end = text[..end_byte].chars().count();
            Some((begin, end))
        })
        .collect()
}
