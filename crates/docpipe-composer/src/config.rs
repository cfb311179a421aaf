//! Composer configuration
//!
//! [`ComposerConfig`] is fixed at construction. [`PipelineDefinition`]
//! lists stages declaratively and can be loaded from TOML or YAML.

use crate::codec::ScriptingContext;
use crate::error::ConfigurationError;
use docpipe_driver::ComponentDescriptor;
pub use docpipe_driver::DispatchPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Composer settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Skip pre-flight verification for every stage
    pub skip_verification: bool,
    /// Per-call timeout in milliseconds; unset means unbounded
    pub call_timeout_ms: Option<u64>,
    /// Multi-instance dispatch for stages that do not set their own
    pub dispatch: DispatchPolicy,
    /// Interchange settings
    pub scripting: ScriptingContext,
    /// Tracing settings
    pub telemetry: TelemetryConfig,
}

impl ComposerConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip (or require) verification for all stages
    #[inline]
    #[must_use]
    pub fn with_skip_verification(mut self, skip: bool) -> Self {
        self.skip_verification = skip;
        self
    }

    /// Bound every stage call
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Multi-instance dispatch policy
    #[inline]
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchPolicy) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Interchange settings
    #[inline]
    #[must_use]
    pub fn with_scripting(mut self, scripting: ScriptingContext) -> Self {
        self.scripting = scripting;
        self
    }

    /// Tracing settings
    #[inline]
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Call timeout as a `Duration`
    #[inline]
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Returns `ConfigurationError::Invalid` on syntax or schema errors
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(text).map_err(|e| ConfigurationError::Invalid(e.to_string()))
    }

    /// Read from a TOML file
    ///
    /// # Errors
    /// Returns `ConfigurationError::Invalid` if the file cannot be read or parsed
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        Self::from_toml_str(&read(path.as_ref())?)
    }
}

/// Declarative list of stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Stages in execution order
    #[serde(default)]
    pub stages: Vec<ComponentDescriptor>,
}

impl PipelineDefinition {
    /// Parse from TOML (`[[stages]]` tables)
    ///
    /// # Errors
    /// Returns `ConfigurationError::Invalid` on syntax or schema errors
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(text).map_err(|e| ConfigurationError::Invalid(e.to_string()))
    }

    /// Parse from YAML (`stages:` sequence)
    ///
    /// # Errors
    /// Returns `ConfigurationError::Invalid` on syntax or schema errors
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(text).map_err(|e| ConfigurationError::Invalid(e.to_string()))
    }

    /// Read a file, choosing the parser by extension (`.yaml`/`.yml`, else TOML)
    ///
    /// # Errors
    /// Returns `ConfigurationError::Invalid` if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = read(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigurationError> {
    std::fs::read_to_string(path)
        .map_err(|e| ConfigurationError::Invalid(format!("{}: {e}", path.display())))
}
