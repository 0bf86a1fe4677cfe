//! Managed datastore contract and the `pg_ctl` based controller

mod controller;

use async_trait::async_trait;
use eyre::Result;

pub use controller::{PARAMETERS_FILE, Postgresql};

use crate::config::PostgresqlConfig;

/// What the control loop needs from the managed datastore
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Apply new effective settings
    async fn reload_config(&self, config: &PostgresqlConfig) -> Result<()>;

    /// Data directory exists and is non-empty
    fn is_data_directory_initialized(&self) -> bool;

    /// Stop the server, optionally after a checkpoint
    ///
    /// Returns false if the server refused to stop.
    async fn stop(&self, checkpoint: bool) -> Result<bool>;
}
