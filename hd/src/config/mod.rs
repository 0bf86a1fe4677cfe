//! hadaemon configuration types and loading
//!
//! A node's configuration has two layers: the local file it was started
//! with, and the cluster-wide dynamic configuration adopted from the
//! coordination store. The dynamic layer is cached in the data directory so
//! a restarted node comes up with the last known cluster settings.

mod dynamic;
mod sections;

use eyre::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use dynamic::{DynamicConfig, DynamicPostgresql};
pub use sections::{
    BootstrapConfig, DcsConfig, LocalConfig, LogConfig, PostgresqlConfig, RestApiConfig, SchedulerConfig,
};

/// Name of the dynamic configuration cache inside the data directory
pub const CACHE_FILE: &str = "hd.dynamic.json";

/// Local plus dynamic configuration for one node
#[derive(Debug, Clone)]
pub struct Config {
    /// File the local layer came from, used by reloads
    config_file: Option<PathBuf>,

    local: LocalConfig,

    dynamic: Option<DynamicConfig>,

    cache_needs_saving: bool,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            let local = Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?;
            return Ok(Self::from_local(local, Some(path.clone())));
        }

        // Try project-local config: ./hd.yml
        let local_config = PathBuf::from("hd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(local) => return Ok(Self::from_local(local, Some(local_config))),
                Err(e) => {
                    warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/hadaemon/hd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("hadaemon").join("hd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(local) => return Ok(Self::from_local(local, Some(user_config))),
                    Err(e) => {
                        warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::from_local(LocalConfig::default(), None))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<LocalConfig> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: LocalConfig = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Build from an already parsed local layer, picking up the cache if present
    pub fn from_local(local: LocalConfig, config_file: Option<PathBuf>) -> Self {
        let mut config = Self {
            config_file,
            local,
            dynamic: None,
            cache_needs_saving: false,
        };
        config.dynamic = config.load_cache();
        config
    }

    fn cache_path(&self) -> PathBuf {
        self.local.postgresql.data_dir.join(CACHE_FILE)
    }

    fn load_cache(&self) -> Option<DynamicConfig> {
        let path = self.cache_path();
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(dynamic) => {
                info!(path = %path.display(), "Loaded cached dynamic configuration");
                Some(dynamic)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable dynamic configuration cache");
                None
            }
        }
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    pub fn local(&self) -> &LocalConfig {
        &self.local
    }

    pub fn name(&self) -> &str {
        &self.local.name
    }

    pub fn scope(&self) -> &str {
        &self.local.scope
    }

    pub fn dcs(&self) -> &DcsConfig {
        &self.local.dcs
    }

    pub fn restapi(&self) -> &RestApiConfig {
        &self.local.restapi
    }

    pub fn tags(&self) -> &BTreeMap<String, Value> {
        &self.local.tags
    }

    pub fn scheduler(&self) -> &SchedulerConfig {
        &self.local.scheduler
    }

    pub fn log(&self) -> &LogConfig {
        &self.local.log
    }

    /// The `bootstrap.dcs` section, if the local file has one
    pub fn bootstrap_dcs(&self) -> Option<&DynamicConfig> {
        self.local.bootstrap.dcs.as_ref()
    }

    /// Cluster-wide configuration currently in effect, if any was adopted
    pub fn dynamic_configuration(&self) -> Option<&DynamicConfig> {
        self.dynamic.as_ref()
    }

    /// Effective datastore settings: local parameters layered over cluster-wide ones
    pub fn postgresql(&self) -> PostgresqlConfig {
        let mut postgresql = self.local.postgresql.clone();
        if let Some(dynamic) = &self.dynamic {
            let mut parameters = dynamic.postgresql.parameters.clone();
            parameters.append(&mut postgresql.parameters);
            postgresql.parameters = parameters;
        }
        postgresql
    }

    /// Adopt a cluster-wide configuration
    ///
    /// Returns true if it differs from the one in effect.
    pub fn set_dynamic_configuration(&mut self, dynamic: &DynamicConfig) -> bool {
        if self.dynamic.as_ref() == Some(dynamic) {
            debug!("set_dynamic_configuration: unchanged");
            return false;
        }
        info!("Dynamic configuration changed");
        self.dynamic = Some(dynamic.clone());
        self.cache_needs_saving = true;
        true
    }

    /// Re-read the local config file
    ///
    /// Returns true if its contents changed. Without a backing file nothing
    /// can change.
    pub fn reload_local_configuration(&mut self) -> Result<bool> {
        let Some(path) = self.config_file.clone() else {
            debug!("reload_local_configuration: no config file");
            return Ok(false);
        };
        let local = Self::load_from_file(&path).context(format!("Failed to reload config from {}", path.display()))?;
        if local == self.local {
            return Ok(false);
        }

        let data_dir_moved = local.postgresql.data_dir != self.local.postgresql.data_dir;
        self.local = local;
        if data_dir_moved {
            self.cache_needs_saving = self.dynamic.is_some();
        }
        info!(path = %path.display(), "Local configuration changed");
        Ok(true)
    }

    /// Write the dynamic configuration cache if it changed since the last write
    pub fn save_cache(&mut self) -> Result<()> {
        if !self.cache_needs_saving {
            return Ok(());
        }
        let Some(dynamic) = &self.dynamic else {
            return Ok(());
        };

        let path = self.cache_path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(dynamic).context("Failed to serialize dynamic configuration")?;
        fs::write(&tmp, json).context(format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).context(format!("Failed to move cache into place at {}", path.display()))?;

        self.cache_needs_saving = false;
        debug!(path = %path.display(), "Saved dynamic configuration cache");
        Ok(())
    }
}
