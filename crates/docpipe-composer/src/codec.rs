//! Interchange formats for `/v1/process` bodies
//!
//! [`ScriptingContext`] is attached to a composer once, at construction,
//! and decides how snapshots are encoded and deltas decoded.

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Wire encoding of request and response bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterchangeFormat {
    /// `application/json`
    #[default]
    Json,
    /// `application/yaml`
    Yaml,
}

impl InterchangeFormat {
    /// MIME type sent as `Content-Type`
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            InterchangeFormat::Json => "application/json",
            InterchangeFormat::Yaml => "application/yaml",
        }
    }

    /// Short format name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            InterchangeFormat::Json => "json",
            InterchangeFormat::Yaml => "yaml",
        }
    }

    /// Serialize a value
    ///
    /// # Errors
    /// Returns `CodecError::Encode` if the serializer rejects the value
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        let encoded = match self {
            InterchangeFormat::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            InterchangeFormat::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
        };
        encoded.map_err(|reason| CodecError::Encode {
            format: self.name(),
            reason,
        })
    }

    /// Deserialize a value
    ///
    /// # Errors
    /// Returns `CodecError::Decode` if the bytes do not match `T`
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        let decoded = match self {
            InterchangeFormat::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            InterchangeFormat::Yaml => serde_yaml::from_slice(bytes).map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| CodecError::Decode {
            format: self.name(),
            reason,
        })
    }

    /// Pick the format matching a `Content-Type` header value
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or_default().trim();
        match mime {
            "application/json" => Some(InterchangeFormat::Json),
            "application/yaml" | "application/x-yaml" | "text/yaml" => {
                Some(InterchangeFormat::Yaml)
            }
            _ => None,
        }
    }
}

/// Process-wide interchange settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScriptingContext {
    /// Body encoding
    #[serde(default)]
    pub format: InterchangeFormat,
}

impl ScriptingContext {
    /// Context with default (JSON) encoding
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exchange bodies as JSON
    #[inline]
    #[must_use]
    pub fn with_json_library(mut self) -> Self {
        self.format = InterchangeFormat::Json;
        self
    }

    /// Exchange bodies as YAML
    #[inline]
    #[must_use]
    pub fn with_yaml(mut self) -> Self {
        self.format = InterchangeFormat::Yaml;
        self
    }

    /// Selected format
    #[inline]
    #[must_use]
    pub fn format(&self) -> InterchangeFormat {
        self.format
    }
}
