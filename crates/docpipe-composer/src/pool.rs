//! Live instance pool
//!
//! Keeps the instances resolved for each stage so repeated runs reuse them.
//! Instances are released when their stage is cleared or the composer shuts
//! down.

use docpipe_driver::{ComponentDescriptor, Driver, DriverError, InstanceHandle, VerificationPolicy};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Identity of a registered stage, unique for the composer's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u64);

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances resolved over the pool's lifetime
    pub provisioned: usize,
    /// Instances released over the pool's lifetime
    pub released: usize,
    /// Instances currently live
    pub live: usize,
    /// Acquisitions answered from cache
    pub reused: usize,
}

/// The instances serving one stage
#[derive(Debug)]
pub struct StageInstances {
    driver: Arc<dyn Driver>,
    handles: Vec<InstanceHandle>,
    cursor: AtomicUsize,
}

impl StageInstances {
    pub(crate) fn new(driver: Arc<dyn Driver>, handles: Vec<InstanceHandle>) -> Self {
        Self {
            driver,
            handles,
            cursor: AtomicUsize::new(0),
        }
    }

    /// All handles, in instance order
    #[inline]
    #[must_use]
    pub fn handles(&self) -> &[InstanceHandle] {
        &self.handles
    }

    /// Number of instances (never zero)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether there are no instances
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Next instance in round-robin order
    #[must_use]
    pub fn next_round_robin(&self) -> &InstanceHandle {
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.handles[n % self.handles.len()]
    }

    /// Driver owning these instances
    #[inline]
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }
}

/// Cache of live instances keyed by stage
#[derive(Debug, Default)]
pub struct InstancePool {
    stages: DashMap<StageId, Arc<StageInstances>>,
    stats: Mutex<PoolStats>,
}

impl InstancePool {
    /// Create empty pool
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances for a stage, resolving them on first use
    ///
    /// # Errors
    /// Propagates the driver's provisioning failure
    pub async fn acquire(
        &self,
        stage: StageId,
        driver: &Arc<dyn Driver>,
        descriptor: &ComponentDescriptor,
        verification: VerificationPolicy,
    ) -> Result<Arc<StageInstances>, DriverError> {
        let cached = self.stages.get(&stage).map(|entry| Arc::clone(entry.value()));
        if let Some(instances) = cached {
            self.stats.lock().reused += 1;
            return Ok(instances);
        }

        let handles = driver.resolve(descriptor, verification).await?;
        if handles.is_empty() {
            return Err(DriverError::Runtime(format!(
                "driver returned no instances for {}",
                descriptor.display_name()
            )));
        }
        tracing::debug!(
            stage = stage.0,
            instances = handles.len(),
            transport = %driver.transport(),
            "instances resolved"
        );

        let instances = Arc::new(StageInstances::new(Arc::clone(driver), handles));

        {
            let mut stats = self.stats.lock();
            stats.provisioned += instances.len();
            stats.live += instances.len();
        }
        self.stages.insert(stage, Arc::clone(&instances));

        Ok(instances)
    }

    /// Release one stage's instances; failures are logged, not returned
    pub async fn release_stage(&self, stage: StageId) -> usize {
        let Some((_, instances)) = self.stages.remove(&stage) else {
            return 0;
        };

        for handle in instances.handles() {
            if let Err(e) = instances.driver.release(handle).await {
                tracing::warn!(stage = stage.0, instance = %handle.id, error = %e, "instance release failed");
            }
        }

        let mut stats = self.stats.lock();
        stats.released += instances.len();
        stats.live = stats.live.saturating_sub(instances.len());
        instances.len()
    }

    /// Release every stage's instances
    pub async fn release_all(&self) -> usize {
        let stages: Vec<StageId> = self.stages.iter().map(|entry| *entry.key()).collect();
        let mut released = 0;
        for stage in stages {
            released += self.release_stage(stage).await;
        }
        released
    }

    /// Whether a stage currently has live instances
    #[inline]
    #[must_use]
    pub fn contains(&self, stage: StageId) -> bool {
        self.stages.contains_key(&stage)
    }

    /// Get pool statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_driver::{RemoteDriver, TransportClass};

    fn remote_driver() -> Arc<dyn Driver> {
        Arc::new(RemoteDriver::new())
    }

    #[tokio::test]
    async fn acquire_caches_per_stage() {
        let pool = InstancePool::new();
        let driver = remote_driver();
        let descriptor = ComponentDescriptor::remote("http://h").with_scale(2);

        let first = pool
            .acquire(StageId(0), &driver, &descriptor, VerificationPolicy::Skip)
            .await
            .unwrap();
        let second = pool
            .acquire(StageId(0), &driver, &descriptor, VerificationPolicy::Skip)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.handles()[0].transport, TransportClass::DirectRemote);
        assert_eq!(
            pool.stats(),
            PoolStats {
                provisioned: 2,
                released: 0,
                live: 2,
                reused: 1,
            }
        );
    }

    #[tokio::test]
    async fn round_robin_cycles_instances() {
        let pool = InstancePool::new();
        let driver = remote_driver();
        let instances = pool
            .acquire(
                StageId(3),
                &driver,
                &ComponentDescriptor::remote_many(["http://a", "http://b"]).with_scale(2),
                VerificationPolicy::Skip,
            )
            .await
            .unwrap();

        let picked: Vec<_> = (0..4)
            .map(|_| instances.next_round_robin().address.clone())
            .collect();
        assert_eq!(picked, vec!["http://a", "http://b", "http://a", "http://b"]);
    }

    #[tokio::test]
    async fn release_all_empties_pool() {
        let pool = InstancePool::new();
        let driver = remote_driver();
        for id in 0..3 {
            pool.acquire(
                StageId(id),
                &driver,
                &ComponentDescriptor::remote("http://h"),
                VerificationPolicy::Skip,
            )
            .await
            .unwrap();
        }

        assert_eq!(pool.release_all().await, 3);
        assert_eq!(pool.release_stage(StageId(0)).await, 0);
        assert!(!pool.contains(StageId(1)));

        let stats = pool.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.released, 3);
    }
}
