//! # docpipe Driver
//!
//! Component descriptors and the transports that turn them into live
//! annotator instances.
//!
//! ## Transports
//!
//! - [`RemoteDriver`]: services already running at known base URLs
//! - [`ContainerDriver`]: services started from container images through a
//!   [`ContainerRuntime`] ([`DockerCli`] by default)
//!
//! Both speak the same HTTP contract: `POST /v1/process` with an encoded
//! document snapshot, plus `GET /v1/documentation` for verification.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod container;
mod descriptor;
mod docker;
mod documentation;
mod driver;
mod error;
mod http;
mod remote;

pub use container::{ContainerDriver, ContainerRuntime, StartedContainer};
pub use descriptor::{
    ComponentDescriptor, ComponentTarget, DispatchPolicy, FetchPolicy, TransportClass,
    VerificationPolicy,
};
pub use docker::{DockerCli, DEFAULT_SERVICE_PORT};
pub use documentation::{InputOutput, ServiceCapability, ServiceDocumentation};
pub use driver::{ensure_transport, Driver, InstanceHandle, InstanceId, WireRequest, WireResponse};
pub use error::DriverError;
pub use http::{ServiceClient, DOCUMENTATION_PATH, INPUT_OUTPUT_PATH, PROCESS_PATH};
pub use remote::RemoteDriver;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
