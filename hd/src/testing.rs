//! In-memory collaborators for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use tokio::sync::Notify;

use crate::api::StatusApi;
use crate::config::{DynamicConfig, PostgresqlConfig, RestApiConfig};
use crate::daemon::{Collaborators, Tags};
use crate::dcs::{Cluster, CoordinationStore, DcsError};
use crate::ha::HaCycle;
use crate::postgresql::Datastore;

/// Ordered record of collaborator calls shared by the mocks
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// Formatted log output collected while the returned guard is held
#[derive(Debug, Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    /// Number of lines containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).lines().filter(|l| l.contains(needle)).count()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Coordination store held in memory
#[derive(Debug, Default)]
pub struct MockDcs {
    pub journal: Journal,
    stored: Mutex<Cluster>,
    cached: Mutex<Option<Cluster>>,
    interval: Mutex<Option<Duration>>,
    fetch_failures: AtomicUsize,
    push_failures: AtomicUsize,
    invalid_config: AtomicBool,
    fetches: AtomicUsize,
    acquires: AtomicUsize,
    updates: AtomicUsize,
    pushed: Mutex<Vec<DynamicConfig>>,
    change: Notify,
}

impl MockDcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(cluster: Cluster) -> Self {
        let dcs = Self::new();
        *dcs.stored.lock().unwrap() = cluster;
        dcs
    }

    /// The next `n` fetches fail as if the store were unreachable
    pub fn fail_fetches(&self, n: usize) {
        self.fetch_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` pushes fail as if the store were unreachable
    pub fn fail_pushes(&self, n: usize) {
        self.push_failures.store(n, Ordering::SeqCst);
    }

    /// Every fetch reports an undecodable cluster config
    pub fn serve_invalid_config(&self) {
        self.invalid_config.store(true, Ordering::SeqCst);
    }

    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock().unwrap() = Some(interval);
    }

    /// Replace the snapshot as if a fetch had just observed another member's write
    pub fn set_cached(&self, cluster: Cluster) {
        *self.stored.lock().unwrap() = cluster.clone();
        *self.cached.lock().unwrap() = Some(cluster);
    }

    /// Wake a pending `watch`
    pub fn notify_change(&self) {
        self.change.notify_one();
    }

    pub fn pushed(&self) -> Vec<DynamicConfig> {
        self.pushed.lock().unwrap().clone()
    }

    /// Cluster config as held by the store
    pub fn stored_config(&self) -> Option<DynamicConfig> {
        self.stored.lock().unwrap().config.clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn update_leader_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoordinationStore for MockDcs {
    async fn fetch_cluster(&self) -> Result<Cluster, DcsError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DcsError::StoreUnavailable("connection refused".to_string()));
        }
        if self.invalid_config.load(Ordering::SeqCst) {
            let err = serde_json::from_str::<DynamicConfig>("{\"ttl\": \"soon\"}").unwrap_err();
            return Err(DcsError::InvalidConfig(err));
        }
        let cluster = self.stored.lock().unwrap().clone();
        *self.cached.lock().unwrap() = Some(cluster.clone());
        Ok(cluster)
    }

    fn cached_cluster(&self) -> Option<Cluster> {
        self.cached.lock().unwrap().clone()
    }

    async fn watch(&self, timeout: Duration) -> bool {
        tokio::select! {
            _ = self.change.notified() => true,
            _ = tokio::time::sleep(timeout) => false,
        }
    }

    async fn push_config(&self, config: &DynamicConfig) -> Result<(), DcsError> {
        self.journal.record("dcs.push_config");
        let failing = self
            .push_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DcsError::StoreUnavailable("blip".to_string()));
        }
        *self.interval.lock().unwrap() = Some(config.loop_wait());
        self.pushed.lock().unwrap().push(config.clone());
        let mut stored = self.stored.lock().unwrap();
        stored.config = Some(config.clone());
        stored.config_version += 1;
        *self.cached.lock().unwrap() = Some(stored.clone());
        Ok(())
    }

    async fn delete_leadership_record(&self) -> Result<bool, DcsError> {
        self.journal.record("dcs.delete_leadership_record");
        Ok(self.stored.lock().unwrap().leader.take().is_some())
    }

    async fn attempt_to_acquire_leader(&self) -> Result<bool, DcsError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn update_leader(&self) -> Result<bool, DcsError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn tick_interval(&self) -> Duration {
        self.interval.lock().unwrap().unwrap_or(Duration::from_secs(10))
    }
}

/// Datastore that only records what it was asked to do
#[derive(Debug, Default)]
pub struct MockDatastore {
    pub journal: Journal,
    pub initialized: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_reload: AtomicBool,
    stops: Mutex<Vec<bool>>,
}

impl MockDatastore {
    pub fn stops(&self) -> Vec<bool> {
        self.stops.lock().unwrap().clone()
    }
}

#[async_trait]
impl Datastore for MockDatastore {
    async fn reload_config(&self, _config: &PostgresqlConfig) -> Result<()> {
        self.journal.record("postgresql.reload_config");
        if self.fail_reload.load(Ordering::SeqCst) {
            eyre::bail!("pg_ctl reload failed");
        }
        Ok(())
    }

    fn is_data_directory_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn stop(&self, checkpoint: bool) -> Result<bool> {
        self.journal.record("postgresql.stop");
        self.stops.lock().unwrap().push(checkpoint);
        if self.fail_stop.load(Ordering::SeqCst) {
            eyre::bail!("pg_ctl stop failed");
        }
        Ok(true)
    }
}

/// Status API that only records calls
#[derive(Debug, Default)]
pub struct MockApi {
    pub journal: Journal,
    pub fail_shutdown: AtomicBool,
}

#[async_trait]
impl StatusApi for MockApi {
    async fn start(&self) -> Result<()> {
        self.journal.record("api.start");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.journal.record("api.shutdown");
        if self.fail_shutdown.load(Ordering::SeqCst) {
            eyre::bail!("socket already gone");
        }
        Ok(())
    }

    async fn reload_config(&self, _config: &RestApiConfig) -> Result<()> {
        self.journal.record("api.reload_config");
        Ok(())
    }
}

/// HA cycle with scripted duration and pause state
#[derive(Debug, Default)]
pub struct MockHa {
    pub journal: Journal,
    pub paused: AtomicBool,
    pub panic_on_cycle: AtomicBool,
    cycle_time: Mutex<Duration>,
    tags_seen: Mutex<Vec<Tags>>,
}

impl MockHa {
    /// Make every cycle take `duration` of (tokio) time
    pub fn set_cycle_time(&self, duration: Duration) {
        *self.cycle_time.lock().unwrap() = duration;
    }

    pub fn tags_seen(&self) -> Vec<Tags> {
        self.tags_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HaCycle for MockHa {
    async fn run_cycle(&self, tags: &Tags) -> String {
        self.journal.record("ha.run_cycle");
        self.tags_seen.lock().unwrap().push(tags.clone());
        if self.panic_on_cycle.load(Ordering::SeqCst) {
            panic!("HA cycle exploded");
        }
        let cycle_time = *self.cycle_time.lock().unwrap();
        if !cycle_time.is_zero() {
            tokio::time::sleep(cycle_time).await;
        }
        "no action. I am (mock), the leader with the lock".to_string()
    }

    async fn is_paused(&self) -> bool {
        self.journal.record("ha.is_paused");
        self.paused.load(Ordering::SeqCst)
    }
}

/// One of each mock, sharing a journal
pub struct Mocks {
    pub journal: Journal,
    pub dcs: Arc<MockDcs>,
    pub postgresql: Arc<MockDatastore>,
    pub api: Arc<MockApi>,
    pub ha: Arc<MockHa>,
}

impl Mocks {
    pub fn new() -> Self {
        let journal = Journal::default();
        Self {
            dcs: Arc::new(MockDcs {
                journal: journal.clone(),
                ..Default::default()
            }),
            postgresql: Arc::new(MockDatastore {
                journal: journal.clone(),
                ..Default::default()
            }),
            api: Arc::new(MockApi {
                journal: journal.clone(),
                ..Default::default()
            }),
            ha: Arc::new(MockHa {
                journal: journal.clone(),
                ..Default::default()
            }),
            journal,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            dcs: self.dcs.clone(),
            postgresql: self.postgresql.clone(),
            api: self.api.clone(),
            ha: self.ha.clone(),
        }
    }
}
