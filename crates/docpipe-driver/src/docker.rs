//! Docker CLI container runtime
//!
//! Shells out to the `docker` binary. Each service listens on
//! [`DEFAULT_SERVICE_PORT`] inside its container; the runtime publishes it
//! on an ephemeral loopback port and reads the mapping back.

use crate::container::{ContainerRuntime, StartedContainer};
use crate::error::DriverError;
use std::process::Output;
use tokio::process::Command;

/// Port annotator services listen on inside their container
pub const DEFAULT_SERVICE_PORT: u16 = 9714;

/// [`ContainerRuntime`] backed by the docker command line
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    service_port: u16,
}

impl DockerCli {
    /// Use `docker` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
            service_port: DEFAULT_SERVICE_PORT,
        }
    }

    /// Use a different CLI binary (e.g. `podman`)
    #[inline]
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Port the service listens on inside the container
    #[inline]
    #[must_use]
    pub fn with_service_port(mut self, port: u16) -> Self {
        self.service_port = port;
        self
    }

    async fn exec(&self, args: &[&str]) -> Result<Output, DriverError> {
        tracing::trace!(binary = %self.binary, ?args, "running container command");
        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| DriverError::Runtime(format!("failed to run {}: {e}", self.binary)))
    }

    async fn exec_ok(&self, args: &[&str]) -> Result<String, DriverError> {
        let output = self.exec(args).await?;
        if !output.status.success() {
            return Err(DriverError::Runtime(format!(
                "{} {} failed: {}",
                self.binary,
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Stop a container that failed to come up; failures are only logged
    async fn discard(&self, container_id: &str) {
        if let Err(e) = self.stop(container_id).await {
            tracing::warn!(container = %container_id, error = %e, "failed to stop half-started container");
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerCli {
    async fn image_present(&self, image: &str) -> Result<bool, DriverError> {
        let output = self.exec(&["image", "inspect", image]).await?;
        Ok(output.status.success())
    }

    async fn fetch(&self, image: &str) -> Result<(), DriverError> {
        self.exec_ok(&["pull", image])
            .await
            .map(|_| ())
            .map_err(|e| DriverError::ImageUnavailable {
                image: image.to_string(),
                reason: e.to_string(),
            })
    }

    async fn start(&self, image: &str) -> Result<StartedContainer, DriverError> {
        let publish = format!("127.0.0.1::{}", self.service_port);
        let id = self
            .exec_ok(&["run", "-d", "--rm", "-p", &publish, image])
            .await?;

        let port = self.service_port.to_string();
        let mapping = match self.exec_ok(&["port", &id, &port]).await {
            Ok(mapping) => mapping,
            Err(e) => {
                self.discard(&id).await;
                return Err(e);
            }
        };

        let Some(host) = parse_port_mapping(&mapping) else {
            self.discard(&id).await;
            return Err(DriverError::Runtime(format!(
                "no published port for container {id}: {mapping:?}"
            )));
        };

        Ok(StartedContainer {
            id,
            address: format!("http://{host}"),
        })
    }

    async fn stop(&self, container_id: &str) -> Result<(), DriverError> {
        let output = self.exec(&["stop", container_id]).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || stderr.contains("No such container") {
            Ok(())
        } else {
            Err(DriverError::Runtime(format!(
                "failed to stop {container_id}: {}",
                stderr.trim()
            )))
        }
    }
}

/// First IPv4 `host:port` line of `docker port` output
fn parse_port_mapping(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('['))
        .map(|line| line.rsplit(" -> ").next().unwrap_or(line))
}
