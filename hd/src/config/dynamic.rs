//! Cluster-wide dynamic configuration record

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration shared by every node through the coordination store
///
/// Unknown keys are kept in `extra` so a record written by a newer node
/// survives a round-trip through an older one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicConfig {
    /// Seconds between HA decisions
    pub loop_wait: u64,

    /// Leader lease lifetime in seconds
    pub ttl: u64,

    /// Seconds to keep retrying store and datastore operations
    pub retry_timeout: u64,

    /// Replica lag (bytes) beyond which a node is not promoted
    pub maximum_lag_on_failover: u64,

    /// Automatic management suspended for operator control
    pub pause: bool,

    /// Datastore settings shared by all nodes
    pub postgresql: DynamicPostgresql,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            loop_wait: 10,
            ttl: 30,
            retry_timeout: 10,
            maximum_lag_on_failover: 1_048_576,
            pause: false,
            postgresql: DynamicPostgresql::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl DynamicConfig {
    pub fn loop_wait(&self) -> Duration {
        Duration::from_secs(self.loop_wait)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

/// Shared datastore settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicPostgresql {
    pub parameters: BTreeMap<String, Value>,
}
