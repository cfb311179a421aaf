//! Error types for drivers
//!
//! Two families:
//! - provisioning failures raised while resolving a descriptor
//! - transport failures raised while calling a live instance

use crate::descriptor::TransportClass;

/// Driver failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// Transport failure while calling a live instance
    #[error("stage unreachable at {endpoint}: {reason}")]
    StageUnreachable {
        /// Instance address
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// Pre-flight verification failed
    #[error("endpoint {endpoint} failed verification: {reason}")]
    EndpointUnreachable {
        /// Verified address
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// Container image absent and not fetchable
    #[error("image unavailable: {image}: {reason}")]
    ImageUnavailable {
        /// Image reference
        image: String,
        /// Why it is unavailable
        reason: String,
    },

    /// Container runtime command failed
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// Descriptor handed to the wrong driver
    #[error("descriptor targets {actual:?}, driver serves {expected:?}")]
    WrongTransport {
        /// Transport served by the driver
        expected: TransportClass,
        /// Transport of the descriptor
        actual: TransportClass,
    },
}

impl DriverError {
    /// Build a transport failure
    #[inline]
    pub fn unreachable(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::StageUnreachable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a verification failure
    #[inline]
    pub fn verification(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::EndpointUnreachable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error happened before any document was dispatched
    #[inline]
    #[must_use]
    pub fn is_provisioning(&self) -> bool {
        !matches!(self, Self::StageUnreachable { .. })
    }
}
