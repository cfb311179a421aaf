//! Pipeline composer
//!
//! The [`Composer`] owns an ordered list of stages, each bound to the driver
//! serving its transport class, and runs a [`Document`] through them one
//! after another.
//!
//! # Run semantics
//! 1. Every stage is provisioned before any is dispatched, so provisioning
//!    failures leave the document untouched.
//! 2. Stages execute strictly in registration order; stage `i + 1` starts
//!    only after stage `i` has merged.
//! 3. A stage's replies are validated as a whole and merged under the
//!    document's single writer, followed by exactly one
//!    [`DocumentModification`].
//! 4. The first failing stage aborts the run. Earlier stages stay merged,
//!    the failing stage leaves no trace.

use crate::config::{ComposerConfig, PipelineDefinition};
use crate::dispatch;
use crate::error::{CodecError, ComposerError, ConfigurationError, ErrorKind, StageError};
use crate::pool::{InstancePool, PoolStats, StageId, StageInstances};
use crate::protocol::AnnotationDelta;
use crate::telemetry;
use docpipe_document::{Annotation, AnnotationKind, Document, DocumentModification, Origin};
use docpipe_driver::{
    ComponentDescriptor, Driver, InstanceHandle, TransportClass, VerificationPolicy, WireRequest,
    WireResponse,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Outcome of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Stages that executed and merged
    pub stages_executed: usize,
    /// Annotations merged, modification records included
    pub annotations_added: usize,
    /// Wall time of the run
    pub elapsed: Duration,
}

#[derive(Debug)]
struct Stage {
    id: StageId,
    name: String,
    descriptor: ComponentDescriptor,
    driver: Arc<dyn Driver>,
}

/// Sequential annotation pipeline
#[derive(Debug)]
pub struct Composer {
    config: ComposerConfig,
    drivers: RwLock<IndexMap<TransportClass, Arc<dyn Driver>>>,
    stages: RwLock<Vec<Arc<Stage>>>,
    pool: InstancePool,
    run_lock: tokio::sync::Mutex<()>,
    shutdown: AtomicBool,
    next_stage: AtomicU64,
}

impl Composer {
    /// Create composer with the given configuration
    #[must_use]
    pub fn new(config: ComposerConfig) -> Self {
        Self {
            config,
            drivers: RwLock::new(IndexMap::new()),
            stages: RwLock::new(Vec::new()),
            pool: InstancePool::new(),
            run_lock: tokio::sync::Mutex::new(()),
            shutdown: AtomicBool::new(false),
            next_stage: AtomicU64::new(0),
        }
    }

    /// Configuration fixed at construction
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Register the driver for its transport class
    ///
    /// # Errors
    /// - `DuplicateDriver` if the class already has a driver
    /// - `ComposerShutdown` after [`Composer::shutdown`]
    pub fn add_driver(&self, driver: Arc<dyn Driver>) -> Result<(), ConfigurationError> {
        self.ensure_open()?;
        let transport = driver.transport();
        let mut drivers = self.drivers.write();
        if drivers.contains_key(&transport) {
            return Err(ConfigurationError::DuplicateDriver(transport));
        }
        drivers.insert(transport, driver);
        tracing::debug!(%transport, "driver registered");
        Ok(())
    }

    /// Append a stage
    ///
    /// # Errors
    /// - `UnknownTransport` if no driver serves the descriptor
    /// - `RunInProgress` while a run holds the composer
    /// - `ComposerShutdown` after [`Composer::shutdown`]
    pub fn add(&self, descriptor: ComponentDescriptor) -> Result<StageId, ConfigurationError> {
        self.ensure_open()?;
        let _idle = self
            .run_lock
            .try_lock()
            .map_err(|_| ConfigurationError::RunInProgress)?;
        self.push_stage(descriptor)
    }

    /// Append every stage of a pipeline definition
    ///
    /// Either all stages are added or none.
    ///
    /// # Errors
    /// As [`Composer::add`]
    pub fn add_all(&self, pipeline: PipelineDefinition) -> Result<Vec<StageId>, ConfigurationError> {
        self.ensure_open()?;
        let _idle = self
            .run_lock
            .try_lock()
            .map_err(|_| ConfigurationError::RunInProgress)?;

        {
            let drivers = self.drivers.read();
            if let Some(missing) = pipeline
                .stages
                .iter()
                .map(ComponentDescriptor::transport)
                .find(|transport| !drivers.contains_key(transport))
            {
                return Err(ConfigurationError::UnknownTransport(missing));
            }
        }

        pipeline
            .stages
            .into_iter()
            .map(|descriptor| self.push_stage(descriptor))
            .collect()
    }

    fn push_stage(&self, descriptor: ComponentDescriptor) -> Result<StageId, ConfigurationError> {
        let transport = descriptor.transport();
        let driver = self
            .drivers
            .read()
            .get(&transport)
            .cloned()
            .ok_or(ConfigurationError::UnknownTransport(transport))?;

        let id = StageId(self.next_stage.fetch_add(1, Ordering::Relaxed));
        let stage = Stage {
            id,
            name: descriptor.display_name(),
            descriptor,
            driver,
        };
        tracing::info!(stage = id.0, component = %stage.name, %transport, "stage added");
        self.stages.write().push(Arc::new(stage));
        Ok(id)
    }

    /// Run `document` through every stage in order
    ///
    /// # Errors
    /// - `Configuration` (`RunInProgress`, `ComposerShutdown`) before anything runs
    /// - `Provisioning` before any stage is dispatched; the document is untouched
    /// - `StageExecution` / `InvariantViolation` for the first failing stage;
    ///   earlier stages remain merged
    pub async fn run(&self, document: &mut Document) -> Result<RunSummary, ComposerError> {
        self.ensure_open()?;
        let _running = self
            .run_lock
            .try_lock()
            .map_err(|_| ConfigurationError::RunInProgress)?;
        self.ensure_open()?;

        let stages: Vec<Arc<Stage>> = self.stages.read().clone();
        let started = Instant::now();
        tracing::info!(
            stages = stages.len(),
            chars = document.char_len(),
            language = %document.language(),
            "pipeline run started"
        );

        let mut provisioned = Vec::with_capacity(stages.len());
        for (index, stage) in stages.iter().enumerate() {
            provisioned.push(self.provision(index, stage).await?);
        }

        let mut summary = RunSummary {
            stages_executed: 0,
            annotations_added: 0,
            elapsed: Duration::ZERO,
        };

        for (index, (stage, instances)) in stages.iter().zip(&provisioned).enumerate() {
            if self.is_shutdown() {
                tracing::warn!(stage = index, "shutdown requested, abandoning run");
                return Err(ConfigurationError::ComposerShutdown.into());
            }

            let span = tracing::info_span!("stage", index, component = %stage.name);
            let added = self
                .execute_stage(index, stage, instances, document)
                .instrument(span)
                .await?;

            summary.stages_executed += 1;
            summary.annotations_added += added;
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            stages = summary.stages_executed,
            annotations = summary.annotations_added,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "pipeline run completed"
        );
        Ok(summary)
    }

    async fn provision(
        &self,
        index: usize,
        stage: &Stage,
    ) -> Result<Arc<StageInstances>, ComposerError> {
        let verification = if self.config.skip_verification {
            VerificationPolicy::Skip
        } else {
            stage.descriptor.verification
        };

        self.pool
            .acquire(stage.id, &stage.driver, &stage.descriptor, verification)
            .await
            .map_err(|source| {
                tracing::warn!(stage = index, component = %stage.name, error = %source, "provisioning failed");
                ComposerError::Provisioning {
                    stage: index,
                    component: stage.name.clone(),
                    source,
                }
            })
    }

    async fn execute_stage(
        &self,
        index: usize,
        stage: &Stage,
        instances: &StageInstances,
        document: &mut Document,
    ) -> Result<usize, ComposerError> {
        let started = Instant::now();
        let result = self.process_stage(index, stage, instances, document).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) if e.kind() == ErrorKind::InvariantViolation => "rejected",
            Err(_) => "failed",
        };
        telemetry::record_stage(&stage.name, outcome, started.elapsed());
        result
    }

    async fn process_stage(
        &self,
        index: usize,
        stage: &Stage,
        instances: &StageInstances,
        document: &mut Document,
    ) -> Result<usize, ComposerError> {
        let format = self.config.scripting.format();

        let policy = stage.descriptor.dispatch.unwrap_or(self.config.dispatch);
        let requests = dispatch::plan(policy, instances, document)
            .into_iter()
            .map(|call| {
                let body = format.encode(&call.snapshot)?;
                Ok((
                    call.handle,
                    WireRequest {
                        content_type: format.content_type(),
                        body,
                    },
                ))
            })
            .collect::<Result<Vec<_>, CodecError>>()
            .map_err(|e| stage_failure(index, stage, StageError::Encoding(e)))?;

        tracing::debug!(
            calls = requests.len(),
            bytes = requests.iter().map(|(_, r)| r.body.len()).sum::<usize>(),
            "dispatching snapshot"
        );

        let replies = futures::future::try_join_all(
            requests
                .iter()
                .map(|(handle, request)| self.call(stage, handle, request)),
        )
        .await
        .map_err(|e| stage_failure(index, stage, e))?;

        let mut annotations = Vec::new();
        let mut reported = None;
        for reply in replies {
            let delta: AnnotationDelta = format
                .decode(&reply.body)
                .map_err(|e| stage_failure(index, stage, StageError::MalformedDelta(e.to_string())))?;
            if reported.is_none() {
                reported = delta.first_modification().cloned();
            }
            annotations.extend(delta.annotations);
        }

        check_delta(&annotations).map_err(|e| stage_failure(index, stage, e))?;

        let produced = annotations.len();
        document
            .add_batch(annotations, Origin::Stage(index))
            .map_err(|source| {
                tracing::error!(error = %source, "stage broke document invariants");
                ComposerError::InvariantViolation {
                    stage: index,
                    component: stage.name.clone(),
                    source,
                }
            })?;

        let modification = match reported {
            Some(meta) => {
                let mut record = DocumentModification::now(meta.user, meta.comment);
                if let Some(timestamp) = meta.timestamp {
                    record.timestamp = timestamp;
                }
                record
            }
            None => DocumentModification::now(&stage.name, format!("processed by {}", stage.name)),
        };
        document
            .add_annotation_from(modification.into(), Origin::Stage(index))
            .map_err(|source| ComposerError::InvariantViolation {
                stage: index,
                component: stage.name.clone(),
                source,
            })?;

        telemetry::record_merged(&stage.name, produced + 1);
        tracing::info!(annotations = produced, "stage completed");
        Ok(produced + 1)
    }

    async fn call(
        &self,
        stage: &Stage,
        handle: &InstanceHandle,
        request: &WireRequest,
    ) -> Result<WireResponse, StageError> {
        let call = stage.driver.call(handle, request);
        match self.config.call_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| StageError::StageTimeout { timeout })?
                .map_err(StageError::StageUnreachable),
            None => call.await.map_err(StageError::StageUnreachable),
        }
    }

    /// Clear all stages and release their instances
    ///
    /// Driver registrations are kept; documents are not touched.
    ///
    /// # Errors
    /// Returns `RunInProgress` while a run holds the composer
    pub async fn reset_pipeline(&self) -> Result<(), ConfigurationError> {
        let _idle = self
            .run_lock
            .try_lock()
            .map_err(|_| ConfigurationError::RunInProgress)?;

        let cleared = std::mem::take(&mut *self.stages.write());
        let mut released = 0;
        for stage in &cleared {
            released += self.pool.release_stage(stage.id).await;
        }
        tracing::info!(stages = cleared.len(), released, "pipeline reset");
        Ok(())
    }

    /// Release every live instance and refuse further work
    ///
    /// A run in flight stops at its next stage boundary; this waits for it
    /// before releasing. Calling twice is harmless.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _idle = self.run_lock.lock().await;
        let released = self.pool.release_all().await;
        tracing::info!(released, "composer shut down");
    }

    /// Check whether [`Composer::shutdown`] has been called
    #[inline]
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Number of registered stages
    #[inline]
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.read().len()
    }

    /// Stage descriptors in execution order
    #[must_use]
    pub fn descriptors(&self) -> Vec<ComponentDescriptor> {
        self.stages
            .read()
            .iter()
            .map(|stage| stage.descriptor.clone())
            .collect()
    }

    /// Transport classes with a registered driver
    #[must_use]
    pub fn transports(&self) -> Vec<TransportClass> {
        self.drivers.read().keys().copied().collect()
    }

    /// Get instance pool statistics
    #[inline]
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn ensure_open(&self) -> Result<(), ConfigurationError> {
        if self.is_shutdown() {
            Err(ConfigurationError::ComposerShutdown)
        } else {
            Ok(())
        }
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(ComposerConfig::default())
    }
}

fn stage_failure(index: usize, stage: &Stage, source: StageError) -> ComposerError {
    tracing::warn!(stage = index, component = %stage.name, error = %source, "stage failed");
    ComposerError::StageExecution {
        stage: index,
        component: stage.name.clone(),
        source,
    }
}

/// Structural checks on a stage's combined reply
fn check_delta(annotations: &[Annotation]) -> Result<(), StageError> {
    let mut segments = 0usize;
    let mut metadata = 0usize;
    for annotation in annotations {
        match annotation.kind() {
            AnnotationKind::Segment => segments += 1,
            AnnotationKind::AnnotatorMetaData => metadata += 1,
            AnnotationKind::DocumentModification => {
                return Err(StageError::MalformedDelta(
                    "document modifications are recorded by the composer".to_string(),
                ))
            }
            AnnotationKind::Transcription | AnnotationKind::SpeakerTurn => {}
        }
    }

    if segments == metadata {
        Ok(())
    } else {
        Err(StageError::MalformedDelta(format!(
            "{metadata} annotator metadata records for {segments} segments"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_document::{AnnotatorMetaData, SegmentSpan};
    use docpipe_driver::RemoteDriver;
    use docpipe_test_utils::{Reply, ScriptedDriver};
    use tokio::sync::Notify;

    fn meta() -> Annotation {
        AnnotatorMetaData::now("seg", "1").into()
    }

    fn composer_with(driver: Arc<dyn Driver>) -> Composer {
        let composer = Composer::default();
        composer.add_driver(driver).unwrap();
        composer
    }

    #[test]
    fn duplicate_driver_rejected() {
        let composer = composer_with(Arc::new(RemoteDriver::new()));
        let err = composer.add_driver(Arc::new(RemoteDriver::new())).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DuplicateDriver(TransportClass::DirectRemote)
        );
    }

    #[test]
    fn unknown_transport_rejected() {
        let composer = composer_with(Arc::new(RemoteDriver::new()));
        let err = composer
            .add(ComponentDescriptor::container("img"))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownTransport(TransportClass::ContainerManaged)
        );
        assert_eq!(composer.stage_count(), 0);
    }

    #[test]
    fn add_all_is_all_or_nothing() {
        let composer = composer_with(Arc::new(RemoteDriver::new()));
        let pipeline = PipelineDefinition {
            stages: vec![
                ComponentDescriptor::remote("http://a"),
                ComponentDescriptor::container("img"),
            ],
        };
        assert!(composer.add_all(pipeline).is_err());
        assert_eq!(composer.stage_count(), 0);
    }

    #[test]
    fn check_delta_rules() {
        assert!(check_delta(&[SegmentSpan::new(0, 1).into(), meta()]).is_ok());
        assert!(matches!(
            check_delta(&[SegmentSpan::new(0, 1).into()]),
            Err(StageError::MalformedDelta(_))
        ));
        assert!(matches!(
            check_delta(&[DocumentModification::now("x", "y").into()]),
            Err(StageError::MalformedDelta(_))
        ));
        assert!(check_delta(&[]).is_ok());
    }

    #[tokio::test]
    async fn empty_pipeline_runs() {
        let composer = Composer::default();
        let mut doc = Document::with_text("text", "en");
        let summary = composer.run(&mut doc).await.unwrap();
        assert_eq!(summary.stages_executed, 0);
        assert_eq!(doc.index().len(), 0);
    }

    #[tokio::test]
    async fn records_reported_modification() {
        let driver = ScriptedDriver::new().reply(
            "http://seg",
            Reply::Body(
                serde_json::to_vec(
                    &AnnotationDelta::new(vec![]).with_modification("spacy", "sentences"),
                )
                .unwrap(),
            ),
        );
        let composer = composer_with(Arc::new(driver));
        composer.add(ComponentDescriptor::remote("http://seg")).unwrap();

        let mut doc = Document::with_text("", "en");
        composer.run(&mut doc).await.unwrap();

        let records: Vec<_> = doc.select_typed::<DocumentModification>().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user, "spacy");
        assert_eq!(records[0].description, "sentences");
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected() {
        let gate = Arc::new(Notify::new());
        let driver = Arc::new(ScriptedDriver::new().reply("http://slow", Reply::Wait(gate.clone())));
        let composer = Arc::new(composer_with(driver.clone()));
        composer.add(ComponentDescriptor::remote("http://slow")).unwrap();

        let background = {
            let composer = Arc::clone(&composer);
            tokio::spawn(async move {
                let mut doc = Document::with_text("a", "en");
                composer.run(&mut doc).await.map(|_| doc)
            })
        };
        driver.wait_for_calls(1).await;

        let mut other = Document::with_text("b", "en");
        let err = composer.run(&mut other).await.unwrap_err();
        assert!(matches!(
            err,
            ComposerError::Configuration(ConfigurationError::RunInProgress)
        ));
        assert_eq!(
            composer.add(ComponentDescriptor::remote("http://x")).unwrap_err(),
            ConfigurationError::RunInProgress
        );

        gate.notify_one();
        let doc = background.await.unwrap().unwrap();
        assert_eq!(doc.count(AnnotationKind::DocumentModification), 1);
    }

    #[tokio::test]
    async fn shutdown_releases_and_is_terminal() {
        let driver = Arc::new(ScriptedDriver::new());
        let composer = composer_with(driver.clone());
        composer
            .add(ComponentDescriptor::remote("http://seg").with_scale(2))
            .unwrap();
        composer
            .run(&mut Document::with_text("x", "en"))
            .await
            .unwrap();
        assert_eq!(composer.pool_stats().live, 2);

        composer.shutdown().await;
        composer.shutdown().await;

        assert!(composer.is_shutdown());
        assert_eq!(driver.released(), 2);
        assert_eq!(composer.pool_stats().live, 0);
        assert!(matches!(
            composer.run(&mut Document::new()).await,
            Err(ComposerError::Configuration(ConfigurationError::ComposerShutdown))
        ));
        assert_eq!(
            composer.add(ComponentDescriptor::remote("http://seg")).unwrap_err(),
            ConfigurationError::ComposerShutdown
        );
    }

    #[tokio::test]
    async fn shutdown_stops_run_at_stage_boundary() {
        let gate = Arc::new(Notify::new());
        let driver = Arc::new(
            ScriptedDriver::new().reply("http://first", Reply::Wait(gate.clone())),
        );
        let composer = Arc::new(composer_with(driver.clone()));
        composer.add(ComponentDescriptor::remote("http://first")).unwrap();
        composer.add(ComponentDescriptor::remote("http://second")).unwrap();

        let background = {
            let composer = Arc::clone(&composer);
            tokio::spawn(async move {
                let mut doc = Document::with_text("a", "en");
                let result = composer.run(&mut doc).await;
                (result, doc)
            })
        };
        driver.wait_for_calls(1).await;

        let stopper = {
            let composer = Arc::clone(&composer);
            tokio::spawn(async move { composer.shutdown().await })
        };
        while !composer.is_shutdown() {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        let (result, doc) = background.await.unwrap();
        stopper.await.unwrap();

        assert!(matches!(
            result,
            Err(ComposerError::Configuration(ConfigurationError::ComposerShutdown))
        ));
        assert_eq!(doc.count(AnnotationKind::DocumentModification), 1);
        assert_eq!(driver.call_count(), 1);
        assert_eq!(driver.released(), 2);
    }

    #[tokio::test]
    async fn reset_pipeline_releases_stage_instances() {
        let driver = Arc::new(ScriptedDriver::new());
        let composer = composer_with(driver.clone());
        composer.add(ComponentDescriptor::remote("http://seg")).unwrap();
        composer
            .run(&mut Document::with_text("x", "en"))
            .await
            .unwrap();

        composer.reset_pipeline().await.unwrap();
        assert_eq!(composer.stage_count(), 0);
        assert_eq!(driver.released(), 1);
        assert_eq!(composer.transports(), vec![TransportClass::DirectRemote]);

        composer.add(ComponentDescriptor::remote("http://seg")).unwrap();
        assert_eq!(composer.stage_count(), 1);
    }

    #[tokio::test]
    async fn instances_are_reused_across_runs() {
        let driver = Arc::new(ScriptedDriver::new());
        let composer = composer_with(driver.clone());
        composer.add(ComponentDescriptor::remote("http://seg")).unwrap();

        for _ in 0..3 {
            composer
                .run(&mut Document::with_text("x", "en"))
                .await
                .unwrap();
        }

        assert_eq!(driver.resolved(), 1);
        assert_eq!(composer.pool_stats().reused, 2);
    }
}
