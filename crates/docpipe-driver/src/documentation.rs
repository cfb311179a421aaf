//! Self-description published by annotator services
//!
//! Services answer `GET /v1/documentation` and
//! `GET /v1/details/input_output`. Verification only requires the first
//! to decode.

use serde::{Deserialize, Serialize};

/// What a service supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCapability {
    /// Language tags the service handles
    pub supported_languages: Vec<String>,
    /// Whether identical input yields identical output
    pub reproducible: bool,
}

/// Reply to `GET /v1/documentation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDocumentation {
    /// Annotator name
    pub annotator_name: String,
    /// Annotator version
    pub version: String,
    /// Implementation language
    #[serde(default)]
    pub implementation_lang: Option<String>,
    /// Free-form metadata
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
    /// Container the service runs in, if known
    #[serde(default)]
    pub docker_container_id: Option<String>,
    /// Accepted parameters
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    /// Capabilities
    pub capability: ServiceCapability,
    /// Implementation-specific notes
    #[serde(default)]
    pub implementation_specific: Option<String>,
}

/// Reply to `GET /v1/details/input_output`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputOutput {
    /// Annotation types consumed
    pub inputs: Vec<String>,
    /// Annotation types produced
    pub outputs: Vec<String>,
}
