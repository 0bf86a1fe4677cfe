//! Local (per-node) configuration sections

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::DynamicConfig;

fn runtime_base() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("hadaemon")
}

fn default_name() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "node1".to_string())
}

/// Everything a node reads from its own config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Member name, unique within the cluster
    pub name: String,

    /// Cluster scope in the coordination store
    pub scope: String,

    /// Coordination store connection
    pub dcs: DcsConfig,

    /// Status endpoint
    pub restapi: RestApiConfig,

    /// Managed datastore
    pub postgresql: PostgresqlConfig,

    /// Settings used only to seed a new cluster
    pub bootstrap: BootstrapConfig,

    /// Member tags (nofailover, noloadbalance, clonefrom, replicatefrom, ...)
    pub tags: BTreeMap<String, Value>,

    /// Main loop tuning
    pub scheduler: SchedulerConfig,

    /// Logging
    pub log: LogConfig,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            scope: clusterstore::DEFAULT_SCOPE.to_string(),
            dcs: DcsConfig::default(),
            restapi: RestApiConfig::default(),
            postgresql: PostgresqlConfig::default(),
            bootstrap: BootstrapConfig::default(),
            tags: BTreeMap::new(),
            scheduler: SchedulerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Coordination store connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcsConfig {
    /// Directory shared by every member of the cluster
    pub path: PathBuf,

    /// How often a watch re-reads the store version
    #[serde(rename = "watch-poll-ms")]
    pub watch_poll_ms: u64,
}

impl Default for DcsConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("clusterstore"),
            watch_poll_ms: 250,
        }
    }
}

impl DcsConfig {
    pub fn watch_poll(&self) -> Duration {
        Duration::from_millis(self.watch_poll_ms.max(1))
    }
}

/// Status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestApiConfig {
    /// Unix socket path
    pub listen: PathBuf,
}

impl Default for RestApiConfig {
    fn default() -> Self {
        Self {
            listen: runtime_base().join("api.sock"),
        }
    }
}

/// Managed datastore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresqlConfig {
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Directory holding pg_ctl/psql; PATH lookup when unset
    #[serde(rename = "bin-dir")]
    pub bin_dir: Option<PathBuf>,

    pub port: u16,

    /// pg_ctl stop mode (smart, fast, immediate)
    #[serde(rename = "stop-mode")]
    pub stop_mode: String,

    #[serde(rename = "pg-ctl-timeout-secs")]
    pub pg_ctl_timeout_secs: u64,

    /// Server parameters; local values win over cluster-wide ones
    pub parameters: BTreeMap<String, Value>,
}

impl Default for PostgresqlConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/postgresql/data"),
            bin_dir: None,
            port: 5432,
            stop_mode: "fast".to_string(),
            pg_ctl_timeout_secs: 60,
            parameters: BTreeMap::new(),
        }
    }
}

impl PostgresqlConfig {
    /// Path to a PostgreSQL client binary
    pub fn binary(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    pub fn pg_ctl_timeout(&self) -> Duration {
        Duration::from_secs(self.pg_ctl_timeout_secs)
    }
}

/// Settings used only to seed a new cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Initial cluster-wide configuration
    pub dcs: Option<DynamicConfig>,
}

/// Main loop tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause after an overrun tick; 0 only yields to the runtime
    #[serde(rename = "overrun-yield-ms")]
    pub overrun_yield_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { overrun_yield_ms: 1 }
    }
}

impl SchedulerConfig {
    pub fn overrun_yield(&self) -> Duration {
        Duration::from_millis(self.overrun_yield_ms)
    }
}

/// Logging
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// TRACE, DEBUG, INFO, WARN or ERROR
    pub level: Option<String>,

    /// Log file; stderr when unset
    pub file: Option<PathBuf>,
}
