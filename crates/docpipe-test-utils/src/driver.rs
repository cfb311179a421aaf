//! Scripted in-memory driver
//!
//! Answers calls from a per-address script instead of the network and
//! records everything it sees.

use crate::wire::{self, DeltaBody};
use async_trait::async_trait;
use docpipe_document::Annotation;
use docpipe_driver::{
    ComponentDescriptor, ComponentTarget, Driver, DriverError, InstanceHandle, InstanceId,
    TransportClass, VerificationPolicy, WireRequest, WireResponse,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How a scripted address answers `call`
#[derive(Debug, Clone)]
pub enum Reply {
    /// Delta with these annotations, encoded like the request
    Annotations(Vec<Annotation>),
    /// Raw body, sent as is
    Body(Vec<u8>),
    /// Transport failure
    Unreachable(String),
    /// Block until notified, then answer with an empty delta
    Wait(Arc<Notify>),
    /// Sleep, then answer with an empty delta
    Delay(Duration),
}

/// One observed call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub address: String,
    pub index: usize,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// [`Driver`] whose behaviour is set up front
#[derive(Debug)]
pub struct ScriptedDriver {
    transport: TransportClass,
    replies: HashMap<String, Reply>,
    unreachable: HashSet<String>,
    missing_images: HashSet<String>,
    calls: Mutex<Vec<RecordedCall>>,
    live: Mutex<HashSet<InstanceId>>,
    resolved: AtomicUsize,
    released: AtomicUsize,
}

impl ScriptedDriver {
    /// Direct-remote driver answering every address with an empty delta
    pub fn new() -> Self {
        Self::for_transport(TransportClass::DirectRemote)
    }

    /// Driver serving the given transport class
    pub fn for_transport(transport: TransportClass) -> Self {
        Self {
            transport,
            replies: HashMap::new(),
            unreachable: HashSet::new(),
            missing_images: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            live: Mutex::new(HashSet::new()),
            resolved: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Script the reply of an endpoint (or image, for container targets)
    #[must_use]
    pub fn reply(mut self, address: &str, reply: Reply) -> Self {
        self.replies.insert(address.to_string(), reply);
        self
    }

    /// Fail verification of an endpoint
    #[must_use]
    pub fn unreachable(mut self, address: &str) -> Self {
        self.unreachable.insert(address.to_string());
        self
    }

    /// Report an image as absent
    #[must_use]
    pub fn missing_image(mut self, image: &str) -> Self {
        self.missing_images.insert(image.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Instances handed out by `resolve`
    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }

    /// Instances released (each counted once)
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Poll until at least `n` calls have started
    ///
    /// # Panics
    /// If that does not happen within five seconds
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..1000 {
            if self.call_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} calls, saw {}", self.call_count());
    }

    fn empty_delta(content_type: &str) -> Result<WireResponse, DriverError> {
        Self::delta(content_type, Vec::new())
    }

    fn delta(content_type: &str, annotations: Vec<Annotation>) -> Result<WireResponse, DriverError> {
        wire::encode(content_type, &DeltaBody::new(annotations))
            .map(|body| WireResponse { body })
            .map_err(|e| DriverError::Runtime(e.to_string()))
    }
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    fn transport(&self) -> TransportClass {
        self.transport
    }

    async fn resolve(
        &self,
        descriptor: &ComponentDescriptor,
        verification: VerificationPolicy,
    ) -> Result<Vec<InstanceHandle>, DriverError> {
        let addresses = match &descriptor.target {
            ComponentTarget::Remote(endpoints) => endpoints.clone(),
            ComponentTarget::Container(image) => {
                if self.missing_images.contains(image) {
                    return Err(DriverError::ImageUnavailable {
                        image: image.clone(),
                        reason: "scripted as missing".to_string(),
                    });
                }
                vec![image.clone()]
            }
        };

        if addresses.is_empty() {
            return Err(DriverError::verification("<none>", "no endpoints configured"));
        }

        if verification == VerificationPolicy::Verify {
            if let Some(bad) = addresses.iter().find(|a| self.unreachable.contains(*a)) {
                return Err(DriverError::verification(bad.as_str(), "scripted as unreachable"));
            }
        }

        let handles: Vec<_> = (0..descriptor.scale())
            .map(|index| {
                InstanceHandle::new(self.transport, index, addresses[index % addresses.len()].clone())
            })
            .collect();

        self.resolved.fetch_add(handles.len(), Ordering::SeqCst);
        self.live.lock().extend(handles.iter().map(|h| h.id));
        Ok(handles)
    }

    async fn call(
        &self,
        handle: &InstanceHandle,
        request: &WireRequest,
    ) -> Result<WireResponse, DriverError> {
        self.calls.lock().push(RecordedCall {
            address: handle.address.clone(),
            index: handle.index,
            content_type: request.content_type,
            body: request.body.clone(),
        });

        match self.replies.get(&handle.address).cloned() {
            None => Self::empty_delta(request.content_type),
            Some(Reply::Annotations(annotations)) => Self::delta(request.content_type, annotations),
            Some(Reply::Body(body)) => Ok(WireResponse { body }),
            Some(Reply::Unreachable(reason)) => Err(DriverError::unreachable(&handle.address, reason)),
            Some(Reply::Wait(gate)) => {
                gate.notified().await;
                Self::empty_delta(request.content_type)
            }
            Some(Reply::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Self::empty_delta(request.content_type)
            }
        }
    }

    async fn release(&self, handle: &InstanceHandle) -> Result<(), DriverError> {
        if self.live.lock().remove(&handle.id) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
