//! Status API
//!
//! A running daemon answers [`ApiRequest`]s on a Unix socket (`restapi.listen`).
//! The control loop only starts, reconfigures, and stops it through
//! [`StatusApi`].

mod client;
mod messages;
mod server;

use async_trait::async_trait;
use eyre::Result;

pub use client::ApiClient;
pub use messages::{ApiRequest, ApiResponse, NodeStatus};
pub use server::RestApiServer;

use crate::config::RestApiConfig;

/// Lifecycle of the status endpoint as seen by the control loop
#[async_trait]
pub trait StatusApi: Send + Sync {
    async fn start(&self) -> Result<()>;

    /// Stop serving and release the endpoint
    async fn shutdown(&self) -> Result<()>;

    /// Apply a changed `restapi` section
    async fn reload_config(&self, config: &RestApiConfig) -> Result<()>;
}
