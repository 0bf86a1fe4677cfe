//! hadaemon - HA control loop for replicated PostgreSQL clusters
//!
//! Every node of a cluster runs one daemon. Each daemon ticks on a fixed
//! schedule, runs one HA decision cycle per tick, and keeps its local
//! configuration in line with the cluster-wide configuration held in a
//! coordination store. On SIGTERM/SIGINT it releases its leadership and
//! stops PostgreSQL, unless the cluster is paused.
//!
//! # Architecture
//!
//! ```text
//! signals ──flags──▶ scheduler ──▶ ha / dcs / postgresql / api
//!                        │
//!                        └──on exit──▶ shutdown
//! ```
//!
//! # Modules
//!
//! - [`signals`] - OS signals turned into loop flags, child reaping
//! - [`bootstrap`] - startup reconciliation with the coordination store
//! - [`scheduler`] - the main cycle
//! - [`shutdown`] - ordered, pause-aware shutdown
//! - [`daemon`] - the context tying collaborators together
//! - [`dcs`], [`ha`], [`postgresql`], [`api`] - collaborator contracts and
//!   their reference implementations
//! - [`config`] - local and dynamic configuration

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod dcs;
pub mod ha;
pub mod postgresql;
pub mod scheduler;
pub mod shutdown;
pub mod signals;

#[cfg(test)]
pub(crate) mod testing;

/// Version reported by `--version` and the status API
pub const VERSION: &str = env!("GIT_DESCRIBE");

pub use api::{ApiClient, NodeStatus, RestApiServer, StatusApi};
pub use bootstrap::{BootstrapOutcome, load_dynamic_configuration};
pub use config::{Config, DynamicConfig};
pub use daemon::{Collaborators, Daemon, DaemonState, NextTick, Tags};
pub use dcs::{Cluster, CoordinationStore, DcsError, FileDcs};
pub use ha::{HaCycle, LeaseHa};
pub use postgresql::{Datastore, Postgresql};
pub use shutdown::ShutdownOutcome;
pub use signals::SignalController;
