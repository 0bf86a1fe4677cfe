//! Coordination store backed by a shared clusterstore directory

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clusterstore::{ClusterStore, StoreResult, Update};
use tokio::time::Instant;
use tracing::{debug, info};

use super::{Cluster, CoordinationStore, DcsError};
use crate::config::{Config, DynamicConfig};

/// [`CoordinationStore`] over a [`ClusterStore`]
///
/// Watches are implemented by polling the store version. Versions produced
/// by this member's own writes are remembered so they never wake it.
#[derive(Debug)]
pub struct FileDcs {
    store: ClusterStore,
    name: String,
    watch_poll: Duration,
    cluster: Mutex<Option<Cluster>>,
    seen_version: AtomicU64,
    loop_wait_secs: AtomicU64,
    ttl_secs: AtomicU64,
}

impl FileDcs {
    pub fn new(store: ClusterStore, name: impl Into<String>, watch_poll: Duration) -> Self {
        let defaults = DynamicConfig::default();
        Self {
            store,
            name: name.into(),
            watch_poll,
            cluster: Mutex::new(None),
            seen_version: AtomicU64::new(0),
            loop_wait_secs: AtomicU64::new(defaults.loop_wait),
            ttl_secs: AtomicU64::new(defaults.ttl),
        }
    }

    /// Open the store named by the `dcs` section
    ///
    /// Timing starts from the dynamic configuration already in effect
    /// (usually the cache), or the defaults.
    pub fn from_config(config: &Config) -> Result<Self, DcsError> {
        let store = ClusterStore::open(&config.dcs().path, config.scope())?;
        info!(path = %store.path().display(), member = config.name(), "Using file coordination store");
        let dcs = Self::new(store, config.name(), config.dcs().watch_poll());
        if let Some(dynamic) = config.dynamic_configuration() {
            dcs.adopt_timing(dynamic);
        }
        Ok(dcs)
    }

    fn adopt_timing(&self, config: &DynamicConfig) {
        self.loop_wait_secs.store(config.loop_wait, Ordering::Release);
        self.ttl_secs.store(config.ttl, Ordering::Release);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.load(Ordering::Acquire))
    }

    /// Run a store operation off the async threads
    async fn blocking<T, F>(&self, f: F) -> Result<T, DcsError>
    where
        F: FnOnce(ClusterStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store))
            .await
            .map_err(|e| DcsError::StoreUnavailable(format!("store task failed: {}", e)))?
            .map_err(DcsError::from)
    }

    fn note_own_write(&self, update: Update) {
        if update.applied {
            self.seen_version.fetch_max(update.version, Ordering::AcqRel);
        }
    }

    fn set_cached(&self, cluster: Option<Cluster>) {
        if let Ok(mut cached) = self.cluster.lock() {
            *cached = cluster;
        }
    }
}

#[async_trait]
impl CoordinationStore for FileDcs {
    async fn fetch_cluster(&self) -> Result<Cluster, DcsError> {
        let state = self.blocking(|store| store.load()).await?;
        let cluster = Cluster::from_state(state)?;
        self.seen_version.store(cluster.version, Ordering::Release);
        self.set_cached(Some(cluster.clone()));
        debug!(version = cluster.version, "Fetched cluster");
        Ok(cluster)
    }

    fn cached_cluster(&self) -> Option<Cluster> {
        self.cluster.lock().ok().and_then(|cached| cached.clone())
    }

    async fn watch(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep((deadline - now).min(self.watch_poll)).await;

            match self.blocking(|store| store.version()).await {
                Ok(version) if version != self.seen_version.load(Ordering::Acquire) => {
                    debug!(version, "Cluster changed by another member");
                    return true;
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "watch: failed to read store version"),
            }
        }
    }

    async fn push_config(&self, config: &DynamicConfig) -> Result<(), DcsError> {
        self.adopt_timing(config);

        let value = serde_json::to_value(config)?;
        let expected = self.cached_cluster().map(|c| c.config_version).unwrap_or(0);
        let update = self
            .blocking(move |store| store.set_config(value, Some(expected)))
            .await?;
        self.note_own_write(update);

        if update.applied {
            info!(loop_wait = config.loop_wait, ttl = config.ttl, "Published cluster config");
            if let Ok(mut cached) = self.cluster.lock() {
                let cluster = cached.get_or_insert_with(Cluster::default);
                cluster.config = Some(config.clone());
                cluster.config_version = expected + 1;
                cluster.version = update.version;
            }
        }
        Ok(())
    }

    async fn delete_leadership_record(&self) -> Result<bool, DcsError> {
        let name = self.name.clone();
        let update = self.blocking(move |store| store.delete_leader(&name)).await?;
        self.note_own_write(update);
        Ok(update.applied)
    }

    async fn attempt_to_acquire_leader(&self) -> Result<bool, DcsError> {
        let name = self.name.clone();
        let ttl = self.ttl();
        let update = self.blocking(move |store| store.acquire_leader(&name, ttl)).await?;
        self.note_own_write(update);
        Ok(update.applied)
    }

    async fn update_leader(&self) -> Result<bool, DcsError> {
        let name = self.name.clone();
        let ttl = self.ttl();
        let update = self.blocking(move |store| store.update_leader(&name, ttl)).await?;
        self.note_own_write(update);
        Ok(update.applied)
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.loop_wait_secs.load(Ordering::Acquire))
    }
}
