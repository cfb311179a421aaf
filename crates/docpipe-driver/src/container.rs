//! Container-managed driver
//!
//! Starts one container per requested instance from the descriptor's image
//! and talks to each over the same HTTP contract as remote services. The
//! container runtime sits behind [`ContainerRuntime`] so the driver logic
//! is independent of the docker CLI.

use crate::descriptor::{
    ComponentDescriptor, ComponentTarget, FetchPolicy, TransportClass, VerificationPolicy,
};
use crate::driver::{ensure_transport, Driver, InstanceHandle, InstanceId, WireRequest, WireResponse};
use crate::error::DriverError;
use crate::http::ServiceClient;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A container the runtime has started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedContainer {
    /// Runtime container ID
    pub id: String,
    /// Base URL of the service inside it
    pub address: String,
}

/// Operations the driver needs from a container runtime
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether `image` is available locally
    async fn image_present(&self, image: &str) -> Result<bool, DriverError>;

    /// Pull `image`
    async fn fetch(&self, image: &str) -> Result<(), DriverError>;

    /// Start a detached container from `image`
    async fn start(&self, image: &str) -> Result<StartedContainer, DriverError>;

    /// Stop and remove a container
    async fn stop(&self, container_id: &str) -> Result<(), DriverError>;
}

/// Driver that provisions annotators from container images
pub struct ContainerDriver {
    runtime: Arc<dyn ContainerRuntime>,
    client: ServiceClient,
    ready_timeout: Duration,
    poll_interval: Duration,
    live: DashMap<InstanceId, InstanceHandle>,
}

impl fmt::Debug for ContainerDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerDriver")
            .field("ready_timeout", &self.ready_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("live", &self.live.len())
            .finish_non_exhaustive()
    }
}

impl ContainerDriver {
    /// Create driver over a container runtime
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            client: ServiceClient::new(),
            ready_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
            live: DashMap::new(),
        }
    }

    /// With custom service client
    #[inline]
    #[must_use]
    pub fn with_client(mut self, client: ServiceClient) -> Self {
        self.client = client;
        self
    }

    /// How long a fresh container may take to answer its readiness check
    #[inline]
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Delay between readiness checks
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Number of containers not yet released
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    async fn ensure_image(&self, image: &str, policy: FetchPolicy) -> Result<(), DriverError> {
        if self.runtime.image_present(image).await? {
            return Ok(());
        }
        match policy {
            FetchPolicy::AssumePresent => Err(DriverError::ImageUnavailable {
                image: image.to_string(),
                reason: "not present locally and fetching is disabled".to_string(),
            }),
            FetchPolicy::FetchIfMissing => {
                tracing::info!(%image, "pulling image");
                self.runtime
                    .fetch(image)
                    .await
                    .map_err(|e| match e {
                        DriverError::ImageUnavailable { .. } => e,
                        other => DriverError::ImageUnavailable {
                            image: image.to_string(),
                            reason: other.to_string(),
                        },
                    })
            }
        }
    }

    async fn start_one(
        &self,
        image: &str,
        index: usize,
        verification: VerificationPolicy,
    ) -> Result<InstanceHandle, DriverError> {
        let started = self.runtime.start(image).await?;
        tracing::debug!(%image, container = %started.id, address = %started.address, "container started");

        if let Err(e) = self.wait_ready(&started.address, verification).await {
            if let Err(stop_err) = self.runtime.stop(&started.id).await {
                tracing::warn!(container = %started.id, error = %stop_err, "failed to stop unready container");
            }
            return Err(e);
        }

        Ok(
            InstanceHandle::new(TransportClass::ContainerManaged, index, started.address)
                .with_container(started.id),
        )
    }

    /// Poll until the service answers; `Skip` accepts any HTTP reply,
    /// `Verify` requires decodable documentation
    async fn wait_ready(
        &self,
        address: &str,
        verification: VerificationPolicy,
    ) -> Result<(), DriverError> {
        let deadline = tokio::time::Instant::now() + self.ready_timeout;
        loop {
            let answered = match verification {
                VerificationPolicy::Verify => self.client.documentation(address).await.map(|_| ()),
                VerificationPolicy::Skip => self.client.ping(address).await,
            };
            match answered {
                Ok(_) => return Ok(()),
                Err(e) if tokio::time::Instant::now() >= deadline => return Err(e),
                Err(_) => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    async fn stop_all(&self, handles: &[InstanceHandle]) {
        let stops = handles
            .iter()
            .filter_map(|h| h.container_id.as_deref())
            .map(|id| self.runtime.stop(id));
        for result in futures::future::join_all(stops).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to stop container during rollback");
            }
        }
    }
}

#[async_trait::async_trait]
impl Driver for ContainerDriver {
    fn transport(&self) -> TransportClass {
        TransportClass::ContainerManaged
    }

    async fn resolve(
        &self,
        descriptor: &ComponentDescriptor,
        verification: VerificationPolicy,
    ) -> Result<Vec<InstanceHandle>, DriverError> {
        ensure_transport(TransportClass::ContainerManaged, descriptor)?;
        let ComponentTarget::Container(image) = &descriptor.target else {
            return Err(DriverError::Runtime("descriptor has no image".to_string()));
        };

        self.ensure_image(image, descriptor.fetch_policy).await?;

        let mut handles = Vec::with_capacity(descriptor.scale());
        for index in 0..descriptor.scale() {
            match self.start_one(image, index, verification).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.stop_all(&handles).await;
                    return Err(e);
                }
            }
        }

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
        let Some((_, handle)) = self.live.remove(&handle.id) else {
            return Ok(());
        };
        match handle.container_id.as_deref() {
            Some(id) => self.runtime.stop(id).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warp::Filter;

    /// Service whose documentation endpoint answers 200 with `body`
    fn spawn_service(body: &'static str) -> String {
        let route = warp::path!("v1" / "documentation").map(move || body);
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{addr}")
    }

    fn quick(driver: ContainerDriver) -> ContainerDriver {
        driver
            .with_ready_timeout(Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(10))
    }

    fn numbered_starts(mock: &mut MockContainerRuntime, address: String) {
        let address = spawn_service("{}");
        let counter = AtomicUsize::new(0);
        mock.expect_start().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(StartedContainer {
                id: format!("c{n}"),
                address: address.clone(),
            })
        });
    }

    #[tokio::test]
    async fn starts_one_container_per_scale() {
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(true));
        mock.expect_fetch().never();
        numbered_starts(&mut mock, spawn_service("{}"));

        let driver = ContainerDriver::new(Arc::new(mock));
        let handles = driver
            .resolve(
                &ComponentDescriptor::container("img").with_scale(2),
                VerificationPolicy::Skip,
            )
            .await
            .unwrap();

        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].container_id.as_deref(), Some("c0"));
        assert_eq!(handles[1].container_id.as_deref(), Some("c1"));
        assert_eq!(driver.live_count(), 2);
    }

    #[tokio::test]
    async fn missing_image_without_fetch_is_unavailable() {
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(false));
        mock.expect_fetch().never();
        mock.expect_start().never();

        let driver = ContainerDriver::new(Arc::new(mock));
        let err = driver
            .resolve(&ComponentDescriptor::container("img"), VerificationPolicy::Skip)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ImageUnavailable { .. }));
    }

    #[tokio::test]
    async fn missing_image_is_fetched_when_allowed() {
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(false));
        mock.expect_fetch().times(1).returning(|_| Ok(()));
        numbered_starts(&mut mock, spawn_service("{}"));

        let driver = ContainerDriver::new(Arc::new(mock));
        let handles = driver
            .resolve(
                &ComponentDescriptor::container("img").with_image_fetching(),
                VerificationPolicy::Skip,
            )
            .await
            .unwrap();
        assert_eq!(handles.len(), 1);
    }

    #[tokio::test]
    async fn failed_pull_is_image_unavailable() {
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(false));
        mock.expect_fetch()
            .returning(|_| Err(DriverError::Runtime("registry down".to_string())));

        let driver = ContainerDriver::new(Arc::new(mock));
        let err = driver
            .resolve(
                &ComponentDescriptor::container("img").with_image_fetching(),
                VerificationPolicy::Skip,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ImageUnavailable { ref reason, .. } if reason.contains("registry down")));
    }

    #[tokio::test]
    async fn unready_containers_are_stopped() {
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(true));
        numbered_starts(&mut mock, "http://127.0.0.1:1".to_string());
        mock.expect_stop().times(1).returning(|_| Ok(()));

        let driver = quick(ContainerDriver::new(Arc::new(mock)));
        let err = driver
            .resolve(&ComponentDescriptor::container("img"), VerificationPolicy::Verify)
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::EndpointUnreachable { .. }));
        assert_eq!(driver.live_count(), 0);
    }

    #[tokio::test]
    async fn start_failure_rolls_back_started_containers() {
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(true));
        let address = spawn_service("{}");
        let counter = AtomicUsize::new(0);
        mock.expect_start().returning(move |_| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(StartedContainer {
                    id: "c0".to_string(),
                    address: address.clone(),
                }),
                _ => Err(DriverError::Runtime("out of ports".to_string())),
            }
        });
        mock.expect_stop().times(1).returning(|_| Ok(()));

        let driver = ContainerDriver::new(Arc::new(mock));
        let err = driver
            .resolve(
                &ComponentDescriptor::container("img").with_scale(2),
                VerificationPolicy::Skip,
            )
            .await
            .unwrap_err();
        assert_eq!(err, DriverError::Runtime("out of ports".to_string()));
    }

    #[tokio::test]
    async fn skip_still_waits_for_readiness() {
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(true));
        numbered_starts(&mut mock, "http://127.0.0.1:1".to_string());
        mock.expect_stop().times(1).returning(|_| Ok(()));

        let driver = quick(ContainerDriver::new(Arc::new(mock)));
        let err = driver
            .resolve(&ComponentDescriptor::container("img"), VerificationPolicy::Skip)
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::EndpointUnreachable { .. }));
        assert_eq!(driver.live_count(), 0);
    }

    #[tokio::test]
    async fn skip_accepts_undocumented_service() {
        let address = spawn_service("not documentation");
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(true));
        numbered_starts(&mut mock, address.clone());
        mock.expect_stop().never();

        let driver = quick(ContainerDriver::new(Arc::new(mock)));
        let handles = driver
            .resolve(&ComponentDescriptor::container("img"), VerificationPolicy::Skip)
            .await
            .unwrap();
        assert_eq!(handles[0].address, address);
    }

    #[tokio::test]
    async fn verify_rejects_undocumented_service() {
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(true));
        numbered_starts(&mut mock, spawn_service("not documentation"));
        mock.expect_stop().times(1).returning(|_| Ok(()));

        let driver = quick(ContainerDriver::new(Arc::new(mock)));
        let err = driver
            .resolve(&ComponentDescriptor::container("img"), VerificationPolicy::Verify)
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::EndpointUnreachable { .. }));
    }

    #[tokio::test]
    async fn release_stops_once() {
        let mut mock = MockContainerRuntime::new();
        mock.expect_image_present().returning(|_| Ok(true));
        numbered_starts(&mut mock, spawn_service("{}"));
        mock.expect_stop().times(1).returning(|_| Ok(()));

        let driver = ContainerDriver::new(Arc::new(mock));
        let handles = driver
            .resolve(&ComponentDescriptor::container("img"), VerificationPolicy::Skip)
            .await
            .unwrap();

        driver.release(&handles[0]).await.unwrap();
        driver.release(&handles[0]).await.unwrap();
        assert_eq!(driver.live_count(), 0);
    }
}
