//! Daemon context
//!
//! [`Daemon`] owns the configuration, the loop state and one handle to each
//! collaborator. The scheduler drives it (`run`), and the shutdown sequencer
//! consumes it, so shutdown can only happen once.

mod state;
mod tags;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use futures::FutureExt;
use tracing::error;

pub use state::{DaemonState, NextTick};
pub use tags::{Tags, is_truthy};

use crate::api::StatusApi;
use crate::config::Config;
use crate::dcs::CoordinationStore;
use crate::ha::HaCycle;
use crate::postgresql::Datastore;
use crate::shutdown::ShutdownOutcome;
use crate::signals::SignalController;

/// Collaborators injected into the daemon
#[derive(Clone)]
pub struct Collaborators {
    pub dcs: Arc<dyn CoordinationStore>,
    pub postgresql: Arc<dyn Datastore>,
    pub api: Arc<dyn StatusApi>,
    pub ha: Arc<dyn HaCycle>,
}

/// The running daemon
pub struct Daemon {
    pub(crate) config: Config,
    pub(crate) dcs: Arc<dyn CoordinationStore>,
    pub(crate) postgresql: Arc<dyn Datastore>,
    pub(crate) api: Arc<dyn StatusApi>,
    pub(crate) ha: Arc<dyn HaCycle>,
    pub(crate) signals: Arc<SignalController>,
    pub(crate) state: DaemonState,
    pub(crate) overrun_yield: Duration,
}

impl Daemon {
    pub fn new(config: Config, collaborators: Collaborators, signals: Arc<SignalController>) -> Self {
        let tags = Tags::from_config(config.tags());
        let overrun_yield = config.scheduler().overrun_yield();
        Self {
            config,
            dcs: collaborators.dcs,
            postgresql: collaborators.postgresql,
            api: collaborators.api,
            ha: collaborators.ha,
            signals,
            state: DaemonState::new(tags),
            overrun_yield,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &DaemonState {
        &self.state
    }

    /// Run the main loop until terminated, then shut down
    ///
    /// Shutdown also runs when the loop fails or panics; a panic is resumed
    /// once shutdown is done.
    pub async fn run_until_shutdown(mut self) -> Result<ShutdownOutcome> {
        let result = AssertUnwindSafe(self.run()).catch_unwind().await;
        if let Ok(Err(e)) = &result {
            error!(error = %e, "Main loop failed");
        }

        let outcome = self.shutdown().await;

        match result {
            Ok(Ok(())) => Ok(outcome),
            Ok(Err(e)) => Err(e),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
