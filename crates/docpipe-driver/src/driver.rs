//! Driver trait and live instance handles
//!
//! A [`Driver`] turns a [`ComponentDescriptor`] into callable instances of
//! one transport class. Drivers move opaque encoded payloads; encoding the
//! document and decoding the reply is the caller's business.

use crate::descriptor::{ComponentDescriptor, TransportClass, VerificationPolicy};
use crate::error::DriverError;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique live-instance identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Ulid);

impl InstanceId {
    /// Generate new instance ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to one live annotator instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    /// Instance ID
    pub id: InstanceId,
    /// Position among the stage's instances (0-based)
    pub index: usize,
    /// Transport class of the owning driver
    pub transport: TransportClass,
    /// Base URL of the service
    pub address: String,
    /// Backing container, for container-managed instances
    pub container_id: Option<String>,
}

impl InstanceHandle {
    /// Create handle for a service at `address`
    #[must_use]
    pub fn new(transport: TransportClass, index: usize, address: impl Into<String>) -> Self {
        Self {
            id: InstanceId::new(),
            index,
            transport,
            address: address.into(),
            container_id: None,
        }
    }

    /// With backing container
    #[inline]
    #[must_use]
    pub fn with_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }
}

/// Encoded document snapshot sent to a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    /// MIME type of `body`
    pub content_type: &'static str,
    /// Encoded snapshot
    pub body: Vec<u8>,
}

/// Raw reply from a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    /// Encoded annotation delta
    pub body: Vec<u8>,
}

/// Resolves descriptors of one transport class into live instances
///
/// Implementations must be safe to share across tasks; a single driver
/// serves every stage of its transport class.
#[async_trait::async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    /// Transport class this driver serves
    fn transport(&self) -> TransportClass;

    /// Provision `descriptor.scale` live instances
    ///
    /// # Errors
    /// Provisioning failures (`EndpointUnreachable`, `ImageUnavailable`,
    /// `Runtime`, `WrongTransport`)
    async fn resolve(
        &self,
        descriptor: &ComponentDescriptor,
        verification: VerificationPolicy,
    ) -> Result<Vec<InstanceHandle>, DriverError>;

    /// Send one encoded snapshot and wait for the reply
    ///
    /// # Errors
    /// Any transport failure surfaces as `StageUnreachable`
    async fn call(
        &self,
        handle: &InstanceHandle,
        request: &WireRequest,
    ) -> Result<WireResponse, DriverError>;

    /// Tear down an instance; releasing twice is a no-op
    ///
    /// # Errors
    /// Runtime failures while stopping backing resources
    async fn release(&self, handle: &InstanceHandle) -> Result<(), DriverError>;
}

/// Reject descriptors of the wrong transport class
///
/// # Errors
/// Returns `DriverError::WrongTransport` on mismatch
pub fn ensure_transport(
    expected: TransportClass,
    descriptor: &ComponentDescriptor,
) -> Result<(), DriverError> {
    let actual = descriptor.transport();
    if actual == expected {
        Ok(())
    } else {
        Err(DriverError::WrongTransport { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_builder() {
        let handle = InstanceHandle::new(TransportClass::ContainerManaged, 2, "http://127.0.0.1:9714")
            .with_container("abc123");
        assert_eq!(handle.index, 2);
        assert_eq!(handle.container_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn instance_ids_are_unique() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }

    #[test]
    fn ensure_transport_mismatch() {
        let d = ComponentDescriptor::container("img");
        assert!(ensure_transport(TransportClass::ContainerManaged, &d).is_ok());
        assert_eq!(
            ensure_transport(TransportClass::DirectRemote, &d),
            Err(DriverError::WrongTransport {
                expected: TransportClass::DirectRemote,
                actual: TransportClass::ContainerManaged,
            })
        );
    }
}
