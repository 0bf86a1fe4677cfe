//! PostgreSQL controller driven through `pg_ctl`

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::process::Output;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::Datastore;
use crate::config::PostgresqlConfig;
use crate::signals::track_subprocess;

/// File in the data directory holding the parameters managed by hd
pub const PARAMETERS_FILE: &str = "hd.parameters.conf";

/// Extra time granted on top of pg_ctl's own `-t` before giving up on it
const PG_CTL_GRACE: Duration = Duration::from_secs(5);

/// Render a parameter value in postgresql.conf syntax
fn quote(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bool(true) => "on".to_string(),
        Value::Bool(false) => "off".to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "''".to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

fn render_parameters(parameters: &BTreeMap<String, Value>) -> String {
    let mut out = String::from("# Managed by hadaemon, changes are overwritten\n");
    for (name, value) in parameters {
        let _ = writeln!(out, "{} = {}", name, quote(value));
    }
    out
}

/// Controls a local PostgreSQL server
#[derive(Debug)]
pub struct Postgresql {
    config: Mutex<PostgresqlConfig>,
}

impl Postgresql {
    pub fn new(config: PostgresqlConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    fn current(&self) -> PostgresqlConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// A postmaster pid file is present
    pub fn is_running(&self) -> bool {
        self.current().data_dir.join("postmaster.pid").exists()
    }

    async fn run(&self, config: &PostgresqlConfig, program: &str, args: &[&str]) -> Result<Output> {
        let _guard = track_subprocess().await;
        let binary = config.binary(program);
        debug!(?binary, ?args, "run: called");

        let output = Command::new(&binary)
            .args(args)
            .kill_on_drop(true)
            .output();
        tokio::time::timeout(config.pg_ctl_timeout() + PG_CTL_GRACE, output)
            .await
            .context(format!("{} timed out", program))?
            .context(format!("Failed to run {}", binary.display()))
    }

    async fn pg_ctl(&self, config: &PostgresqlConfig, args: &[&str]) -> Result<Output> {
        let data_dir = config.data_dir.to_string_lossy().into_owned();
        let mut full = args.to_vec();
        full.extend(["-D", data_dir.as_str()]);
        self.run(config, "pg_ctl", &full).await
    }

    async fn checkpoint(&self, config: &PostgresqlConfig) {
        let port = config.port.to_string();
        match self
            .run(config, "psql", &["-X", "-p", &port, "-d", "postgres", "-c", "CHECKPOINT"])
            .await
        {
            Ok(output) if output.status.success() => debug!("checkpoint: done"),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(%stderr, "CHECKPOINT before shutdown failed");
            }
            Err(e) => warn!(error = %e, "CHECKPOINT before shutdown failed"),
        }
    }
}

#[async_trait]
impl Datastore for Postgresql {
    async fn reload_config(&self, config: &PostgresqlConfig) -> Result<()> {
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = config.clone();

        if !self.is_data_directory_initialized() {
            debug!("reload_config: data directory not initialized, nothing to write");
            return Ok(());
        }

        let path = config.data_dir.join(PARAMETERS_FILE);
        let tmp = path.with_extension("conf.tmp");
        fs::write(&tmp, render_parameters(&config.parameters)).context(format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).context(format!("Failed to move parameters into place at {}", path.display()))?;
        debug!(path = %path.display(), count = config.parameters.len(), "Wrote server parameters");

        if !self.is_running() {
            return Ok(());
        }
        let output = self.pg_ctl(config, &["reload"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            eyre::bail!("pg_ctl reload failed: {}", stderr.trim());
        }
        info!("PostgreSQL configuration reloaded");
        Ok(())
    }

    fn is_data_directory_initialized(&self) -> bool {
        fs::read_dir(self.current().data_dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    async fn stop(&self, checkpoint: bool) -> Result<bool> {
        let config = self.current();
        if !self.is_running() {
            info!("PostgreSQL is not running");
            return Ok(true);
        }

        if checkpoint {
            self.checkpoint(&config).await;
        }

        let timeout = config.pg_ctl_timeout_secs.to_string();
        let output = self
            .pg_ctl(&config, &["stop", "-m", &config.stop_mode, "-w", "-t", &timeout])
            .await?;
        if output.status.success() {
            info!(mode = %config.stop_mode, "PostgreSQL stopped");
            Ok(true)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(%stderr, "pg_ctl stop failed");
            Ok(false)
        }
    }
}
