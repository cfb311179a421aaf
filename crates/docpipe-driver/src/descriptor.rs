//! Component descriptors
//!
//! A [`ComponentDescriptor`] declares one pipeline stage: where the
//! annotator lives, how many instances to run, and how strictly to
//! provision it. Descriptors are plain data; drivers interpret them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

/// Transport class a driver serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportClass {
    /// Service already running at a known address
    DirectRemote,
    /// Service started from a container image
    ContainerManaged,
}

impl fmt::Display for TransportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportClass::DirectRemote => f.write_str("direct-remote"),
            TransportClass::ContainerManaged => f.write_str("container-managed"),
        }
    }
}

/// What to do when a container image is not present locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    /// Fail with `ImageUnavailable`
    #[default]
    AssumePresent,
    /// Pull the image first
    FetchIfMissing,
}

/// Whether to pre-flight check a service before use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    /// Check reachability and documentation
    #[default]
    Verify,
    /// Trust the address
    Skip,
}

/// How a stage with several instances is fed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Whole snapshot to one instance, rotating per run
    #[default]
    RoundRobin,
    /// Attachments dealt across instances, all called concurrently
    PartitionAttachments,
}

/// Where the annotator service comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentTarget {
    /// One or more base URLs of running services
    Remote(Vec<String>),
    /// Container image reference
    Container(String),
}

/// Declarative description of one pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Display name, defaults to the endpoint or image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Service location
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub target: ComponentTarget,
    /// Number of live instances
    #[serde(default = "default_scale")]
    pub scale: NonZeroUsize,
    /// Image fetch behaviour (container targets only)
    #[serde(default)]
    pub fetch_policy: FetchPolicy,
    /// Pre-flight check behaviour
    #[serde(default)]
    pub verification: VerificationPolicy,
    /// Multi-instance dispatch; unset follows the composer default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchPolicy>,
}

fn default_scale() -> NonZeroUsize {
    NonZeroUsize::MIN
}

impl ComponentDescriptor {
    /// Describe a running service at `endpoint`
    #[must_use]
    pub fn remote(endpoint: impl Into<String>) -> Self {
        Self::new(ComponentTarget::Remote(vec![endpoint.into()]))
    }

    /// Describe running services spread over several endpoints
    #[must_use]
    pub fn remote_many<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ComponentTarget::Remote(
            endpoints.into_iter().map(Into::into).collect(),
        ))
    }

    /// Describe a service started from a container image
    #[must_use]
    pub fn container(image: impl Into<String>) -> Self {
        Self::new(ComponentTarget::Container(image.into()))
    }

    fn new(target: ComponentTarget) -> Self {
        Self {
            name: None,
            target,
            scale: default_scale(),
            fetch_policy: FetchPolicy::default(),
            verification: VerificationPolicy::default(),
            dispatch: None,
        }
    }

    /// With display name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// With instance count; zero is raised to one
    #[inline]
    #[must_use]
    pub fn with_scale(mut self, scale: usize) -> Self {
        self.scale = NonZeroUsize::new(scale).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Pull the image if it is missing
    #[inline]
    #[must_use]
    pub fn with_image_fetching(mut self) -> Self {
        self.fetch_policy = FetchPolicy::FetchIfMissing;
        self
    }

    /// Skip the pre-flight check
    #[inline]
    #[must_use]
    pub fn without_verification(mut self) -> Self {
        self.verification = VerificationPolicy::Skip;
        self
    }

    /// Feed this stage's instances with `dispatch` whatever the composer default
    #[inline]
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchPolicy) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Transport class needed to serve this descriptor
    #[inline]
    #[must_use]
    pub fn transport(&self) -> TransportClass {
        match self.target {
            ComponentTarget::Remote(_) => TransportClass::DirectRemote,
            ComponentTarget::Container(_) => TransportClass::ContainerManaged,
        }
    }

    /// Instance count as `usize`
    #[inline]
    #[must_use]
    pub fn scale(&self) -> usize {
        self.scale.get()
    }

    /// Name used in logs and provenance
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.target {
            ComponentTarget::Remote(endpoints) => endpoints.join(","),
            ComponentTarget::Container(image) => image.clone(),
        }
    }
}
