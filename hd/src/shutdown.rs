//! Shutdown sequencer

use tracing::{error, info, warn};

use crate::daemon::Daemon;

/// What shutdown did with the datastore and the leader lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Cluster paused: datastore left running, leader lease kept
    Paused,
    /// Datastore stopped (or attempted) and leader lease released
    Released,
}

impl Daemon {
    /// Stop the status API, then stop the datastore and release leadership
    /// unless the cluster is paused
    ///
    /// Consumes the daemon. Failures are logged and never skip later steps.
    pub async fn shutdown(self) -> ShutdownOutcome {
        info!("Shutting down");

        if let Err(e) = self.api.shutdown().await {
            error!(error = %e, "Failed to stop the status API");
        }

        if self.ha.is_paused().await {
            info!("Leader key is not deleted and PostgreSQL is not stopped due to paused state");
            return ShutdownOutcome::Paused;
        }

        match self.postgresql.stop(false).await {
            Ok(true) => {}
            Ok(false) => warn!("PostgreSQL did not stop cleanly"),
            Err(e) => error!(error = %e, "Failed to stop PostgreSQL"),
        }

        match self.dcs.delete_leadership_record().await {
            Ok(true) => info!("Leader key deleted"),
            Ok(false) => info!("No leader key held, nothing to delete"),
            Err(e) => error!(error = %e, "Failed to delete the leader key"),
        }

        ShutdownOutcome::Released
    }
}
