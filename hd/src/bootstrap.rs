//! Startup reconciliation of local and cluster-wide configuration

use eyre::{Result, WrapErr};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dcs::{CoordinationStore, DcsError};
use crate::signals::SignalController;

/// Repeat a warning for the same failure this often
const WARN_EVERY: u64 = 100;

/// How the dynamic configuration was settled at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Adopted the cluster's configuration; `pushed` if it changed ours and
    /// was written back normalized
    Merged { pushed: bool },
    /// The cluster had no configuration; seeded it from `bootstrap.dcs`
    Seeded,
    /// Kept the local (cached) configuration
    Unchanged,
    /// Termination was requested before the store could be reached
    Interrupted,
}

/// Local config only changes once the store holds what it was changed to,
/// so a failed write is retried in full rather than forgotten.
async fn try_load(config: &mut Config, dcs: &dyn CoordinationStore) -> Result<BootstrapOutcome, DcsError> {
    let cluster = dcs.fetch_cluster().await?;

    if let Some(dynamic) = cluster.config {
        if config.dynamic_configuration() == Some(&dynamic) {
            return Ok(BootstrapOutcome::Merged { pushed: false });
        }
        dcs.push_config(&dynamic).await?;
        config.set_dynamic_configuration(&dynamic);
        return Ok(BootstrapOutcome::Merged { pushed: true });
    }

    if config.dynamic_configuration().is_none()
        && let Some(seed) = config.bootstrap_dcs().cloned()
    {
        dcs.push_config(&seed).await?;
        config.set_dynamic_configuration(&seed);
        return Ok(BootstrapOutcome::Seeded);
    }

    Ok(BootstrapOutcome::Unchanged)
}

/// Bring the local dynamic configuration in line with the coordination store
///
/// Store failures are retried without limit or backoff. Only termination
/// stops the retries, in which case nothing was changed in the store.
pub async fn load_dynamic_configuration(
    config: &mut Config,
    dcs: &dyn CoordinationStore,
    signals: &SignalController,
) -> Result<BootstrapOutcome> {
    let mut failures: u64 = 0;
    let mut last_error: Option<String> = None;

    loop {
        let attempt = tokio::select! {
            biased;
            _ = signals.terminated() => {
                info!("Terminated while loading dynamic configuration");
                return Ok(BootstrapOutcome::Interrupted);
            }
            attempt = try_load(config, dcs) => attempt,
        };

        match attempt {
            Ok(outcome) => {
                if failures > 0 {
                    info!(failures, "Coordination store reachable again");
                }
                info!(?outcome, "Dynamic configuration loaded");
                return Ok(outcome);
            }
            Err(e) if e.is_retryable() => {
                failures += 1;
                let message = e.to_string();
                if last_error.as_deref() != Some(message.as_str()) {
                    warn!(error = %e, "Can not load dynamic configuration from the coordination store, retrying");
                    last_error = Some(message);
                } else if failures % WARN_EVERY == 0 {
                    warn!(error = %e, failures, "Still unable to load dynamic configuration, retrying");
                } else {
                    debug!(error = %e, failures, "load_dynamic_configuration: retrying");
                }
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e).wrap_err("Coordination store holds an unusable cluster config"),
        }
    }
}
