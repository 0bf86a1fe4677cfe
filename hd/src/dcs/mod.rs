//! Coordination store (DCS) contract
//!
//! The daemon never talks to a store directly; it goes through
//! [`CoordinationStore`]. [`FileDcs`] is the implementation backed by the
//! `clusterstore` crate.

mod error;
mod file;

use async_trait::async_trait;
use std::time::Duration;

pub use clusterstore::LeaderRecord;
pub use error::DcsError;
pub use file::FileDcs;

use crate::config::DynamicConfig;

/// Snapshot of cluster state as last read from the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cluster {
    /// Store version the snapshot was read at
    pub version: u64,
    /// Cluster-wide configuration, absent until the cluster is seeded
    pub config: Option<DynamicConfig>,
    /// Version of `config`, used for compare-and-set writes
    pub config_version: u64,
    /// Leader lease, possibly expired
    pub leader: Option<LeaderRecord>,
}

impl Cluster {
    pub fn from_state(state: clusterstore::ClusterState) -> Result<Self, DcsError> {
        let config = state.config.map(serde_json::from_value).transpose()?;
        Ok(Self {
            version: state.version,
            config,
            config_version: state.config_version,
            leader: state.leader,
        })
    }

    /// Leader whose lease has not lapsed
    pub fn live_leader(&self) -> Option<&LeaderRecord> {
        let now = clusterstore::now_ms();
        self.leader.as_ref().filter(|l| !l.is_expired_at(now))
    }

    pub fn is_paused(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.pause)
    }
}

/// What the control loop needs from the coordination store
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read the cluster from the store and remember it as the cached snapshot
    async fn fetch_cluster(&self) -> Result<Cluster, DcsError>;

    /// Last snapshot read, without touching the store
    fn cached_cluster(&self) -> Option<Cluster>;

    /// Wait up to `timeout` for another member to change the cluster
    ///
    /// Returns true if woken by a change.
    async fn watch(&self, timeout: Duration) -> bool;

    /// Adopt `config`'s timing locally and publish it as the cluster config
    async fn push_config(&self, config: &DynamicConfig) -> Result<(), DcsError>;

    /// Release this member's leader lease; false if it held none
    async fn delete_leadership_record(&self) -> Result<bool, DcsError>;

    /// Claim the leader lease for this member
    async fn attempt_to_acquire_leader(&self) -> Result<bool, DcsError>;

    /// Renew this member's leader lease; false if it no longer holds it
    async fn update_leader(&self) -> Result<bool, DcsError>;

    /// Interval between ticks
    fn tick_interval(&self) -> Duration;
}
