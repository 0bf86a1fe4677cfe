//! Minimal lease-based HA cycle

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::HaCycle;
use crate::daemon::Tags;
use crate::dcs::CoordinationStore;

/// Holds the leader lease while it can and follows whoever holds it otherwise
pub struct LeaseHa {
    dcs: Arc<dyn CoordinationStore>,
    name: String,
}

impl LeaseHa {
    pub fn new(dcs: Arc<dyn CoordinationStore>, name: impl Into<String>) -> Self {
        Self { dcs, name: name.into() }
    }

    async fn renew(&self) -> String {
        match self.dcs.update_leader().await {
            Ok(true) => format!("no action. I am ({}), the leader with the lock", self.name),
            Ok(false) => {
                warn!(member = %self.name, "Leader lock was taken over while renewing it");
                format!("demoted self because ({}) lost the leader lock", self.name)
            }
            Err(e) => {
                warn!(error = %e, "Failed to renew the leader lock");
                format!("failed to update leader lock: {}", e)
            }
        }
    }

    async fn acquire(&self) -> String {
        match self.dcs.attempt_to_acquire_leader().await {
            Ok(true) => "acquired session lock as a leader".to_string(),
            Ok(false) => "failed to acquire the leader lock, another member was faster".to_string(),
            Err(e) => {
                warn!(error = %e, "Failed to acquire the leader lock");
                format!("failed to acquire leader lock: {}", e)
            }
        }
    }
}

#[async_trait]
impl HaCycle for LeaseHa {
    async fn run_cycle(&self, tags: &Tags) -> String {
        debug!(member = %self.name, "run_cycle: called");
        let cluster = match self.dcs.fetch_cluster().await {
            Ok(cluster) => cluster,
            Err(e) => {
                warn!(error = %e, "Failed to fetch cluster");
                return "DCS is not accessible".to_string();
            }
        };
        let leader = cluster.live_leader().map(|l| l.name.clone());

        if cluster.is_paused() {
            return match leader {
                Some(name) if name == self.name => {
                    format!("PAUSE: no action. I am ({}), the leader with the lock", self.name)
                }
                Some(name) => format!("PAUSE: no action. I am ({}), a secondary, following ({})", self.name, name),
                None => format!("PAUSE: no action. I am ({}), there is no leader", self.name),
            };
        }

        match leader {
            Some(name) if name == self.name => self.renew().await,
            Some(name) => format!("no action. I am ({}), a secondary, and following a leader ({})", self.name, name),
            None if tags.nofailover() => {
                format!("no action. I am ({}), a secondary with nofailover set, and there is no leader", self.name)
            }
            None => self.acquire().await,
        }
    }

    async fn is_paused(&self) -> bool {
        self.dcs.cached_cluster().is_some_and(|cluster| cluster.is_paused())
    }
}
