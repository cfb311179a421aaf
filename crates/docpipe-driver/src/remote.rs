//! Direct-remote driver
//!
//! Binds descriptors to services that are already running. Nothing is
//! provisioned; `resolve` only verifies reachability (unless skipped) and
//! deals out `scale` handles round the listed endpoints.

use crate::descriptor::{ComponentDescriptor, ComponentTarget, TransportClass, VerificationPolicy};
use crate::documentation::{InputOutput, ServiceDocumentation};
use crate::driver::{ensure_transport, Driver, InstanceHandle, InstanceId, WireRequest, WireResponse};
use crate::error::DriverError;
use crate::http::ServiceClient;
use dashmap::DashMap;

/// Driver for services reachable at fixed addresses
#[derive(Debug, Default)]
pub struct RemoteDriver {
    client: ServiceClient,
    live: DashMap<InstanceId, InstanceHandle>,
}

impl RemoteDriver {
    /// Create driver with a default HTTP client
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(ServiceClient::new())
    }

    /// Create driver with a custom service client
    #[must_use]
    pub fn with_client(client: ServiceClient) -> Self {
        Self {
            client,
            live: DashMap::new(),
        }
    }

    /// Fetch a service's documentation
    ///
    /// # Errors
    /// Returns `EndpointUnreachable` on failure
    pub async fn documentation(&self, endpoint: &str) -> Result<ServiceDocumentation, DriverError> {
        self.client.documentation(endpoint).await
    }

    /// Fetch a service's declared input and output types
    ///
    /// # Errors
    /// Returns `EndpointUnreachable` on failure
    pub async fn input_output(&self, endpoint: &str) -> Result<InputOutput, DriverError> {
        self.client.input_output(endpoint).await
    }

    /// Number of handles not yet released
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

#[async_trait::async_trait]
impl Driver for RemoteDriver {
    fn transport(&self) -> TransportClass {
        TransportClass::DirectRemote
    }

    async fn resolve(
        &self,
        descriptor: &ComponentDescriptor,
        verification: VerificationPolicy,
    ) -> Result<Vec<InstanceHandle>, DriverError> {
        ensure_transport(TransportClass::DirectRemote, descriptor)?;
        let endpoints = match &descriptor.target {
            ComponentTarget::Remote(endpoints) if !endpoints.is_empty() => endpoints,
            _ => {
                return Err(DriverError::verification(
                    descriptor.display_name(),
                    "no endpoint configured",
                ))
            }
        };

        if verification == VerificationPolicy::Verify {
            for endpoint in endpoints {
                let doc = self.client.documentation(endpoint).await?;
                tracing::debug!(
                    %endpoint,
                    annotator = %doc.annotator_name,
                    version = %doc.version,
                    "verified remote component"
                );
            }
        }

        let handles: Vec<_> = (0..descriptor.scale())
            .map(|index| {
                let endpoint = &endpoints[index % endpoints.len()];
                InstanceHandle::new(TransportClass::DirectRemote, index, endpoint.clone())
            })
            .collect();

        for handle in &handles {
            self.live.insert(handle.id, handle.clone());
        }

        Ok(handles)
    }

    async fn call(
        &self,
        handle: &InstanceHandle,
        request: &WireRequest,
    ) -> Result<WireResponse, DriverError> {
        self.client.process(&handle.address, request).await
    }

    async fn release(&self, handle: &InstanceHandle) -> Result<(), DriverError> {
        self.live.remove(&handle.id);
        Ok(())
    }
}
