//! Error types for the composer
//!
//! Four families, mirroring how a failure should be handled:
//! - configuration misuse, surfaced immediately
//! - provisioning failures, raised before any stage is dispatched
//! - stage execution failures (transport, timeout, malformed reply)
//! - invariant violations by a misbehaving annotator

use docpipe_document::DocumentError;
use docpipe_driver::{DriverError, TransportClass};
use std::time::Duration;

/// Main composer error type
#[derive(Debug, thiserror::Error)]
pub enum ComposerError {
    /// Caller misuse
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A stage could not be provisioned
    #[error("stage {stage} ({component}) provisioning failed: {source}")]
    Provisioning {
        /// Stage position
        stage: usize,
        /// Stage display name
        component: String,
        /// Driver failure
        #[source]
        source: DriverError,
    },

    /// A stage failed while processing the document
    #[error("stage {stage} ({component}) failed: {source}")]
    StageExecution {
        /// Stage position
        stage: usize,
        /// Stage display name
        component: String,
        /// What went wrong
        #[source]
        source: StageError,
    },

    /// A stage returned annotations the document refuses
    #[error("stage {stage} ({component}) violated document invariants: {source}")]
    InvariantViolation {
        /// Stage position
        stage: usize,
        /// Stage display name
        component: String,
        /// Rejected invariant
        #[source]
        source: DocumentError,
    },
}

/// Coarse classification of a [`ComposerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller misuse
    Configuration,
    /// Provisioning failure
    Provisioning,
    /// Stage execution failure
    StageExecution,
    /// Annotator broke a document invariant
    InvariantViolation,
}

impl ComposerError {
    /// Error family
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Provisioning { .. } => ErrorKind::Provisioning,
            Self::StageExecution { .. } => ErrorKind::StageExecution,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
        }
    }

    /// Check if the failure may go away on a later attempt
    ///
    /// The composer never retries on its own; this is a hint for callers.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provisioning { source, .. } => {
                matches!(source, DriverError::EndpointUnreachable { .. })
            }
            Self::StageExecution { source, .. } => matches!(
                source,
                StageError::StageUnreachable(_) | StageError::StageTimeout { .. }
            ),
            Self::Configuration(_) | Self::InvariantViolation { .. } => false,
        }
    }

    /// Position of the failing stage, if the error belongs to one
    #[inline]
    #[must_use]
    pub fn stage(&self) -> Option<usize> {
        match self {
            Self::Configuration(_) => None,
            Self::Provisioning { stage, .. }
            | Self::StageExecution { stage, .. }
            | Self::InvariantViolation { stage, .. } => Some(*stage),
        }
    }
}

/// Caller misuse of the composer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// A driver for this transport is already registered
    #[error("driver already registered for {0}")]
    DuplicateDriver(TransportClass),

    /// No driver serves the descriptor's transport
    #[error("no driver registered for {0}")]
    UnknownTransport(TransportClass),

    /// Another run holds the composer
    #[error("a run is already in progress")]
    RunInProgress,

    /// The composer has been shut down
    #[error("composer has been shut down")]
    ComposerShutdown,

    /// Configuration or pipeline file could not be read
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of a single stage
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Transport failure calling an instance
    #[error("{0}")]
    StageUnreachable(DriverError),

    /// The call did not complete in time
    #[error("call timed out after {}ms", .timeout.as_millis())]
    StageTimeout {
        /// Configured timeout
        timeout: Duration,
    },

    /// Reply could not be decoded or broke the delta contract
    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    /// The snapshot could not be encoded
    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] CodecError),
}

/// Interchange encode/decode failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed
    #[error("{format} encode failed: {reason}")]
    Encode {
        /// Format name
        format: &'static str,
        /// Serializer message
        reason: String,
    },

    /// Deserialization failed
    #[error("{format} decode failed: {reason}")]
    Decode {
        /// Format name
        format: &'static str,
        /// Deserializer message
        reason: String,
    },
}
