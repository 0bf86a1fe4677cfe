//! Main cycle
//!
//! One tick: consume a pending reload, run the HA cycle, adopt a changed
//! cluster config, persist the config cache, reap children. Ticks are
//! anchored to a fixed schedule that only moves when a tick overruns or
//! another member changes the cluster.

use eyre::{Result, WrapErr};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::daemon::{Daemon, NextTick, Tags};
use crate::signals::reap_children;

impl Daemon {
    /// Tick until termination is requested
    pub(crate) async fn run(&mut self) -> Result<()> {
        self.api.start().await.wrap_err("Failed to start the status API")?;
        self.state.reset(Instant::now());
        info!(interval = ?self.dcs.tick_interval(), "Main loop started");

        while !self.signals.is_terminated() {
            self.run_tick().await;
            if self.signals.is_terminated() {
                break;
            }
            self.schedule_next_tick().await;
        }

        info!("Main loop stopped");
        Ok(())
    }

    pub(crate) async fn run_tick(&mut self) {
        if self.signals.take_reload() {
            info!("Reload requested");
            match self.config.reload_local_configuration() {
                Ok(true) => self.reload_config(true).await,
                Ok(false) => debug!("run_tick: local configuration unchanged"),
                Err(e) => error!(error = %e, "Failed to reload local configuration"),
            }
        }

        let status = self.ha.run_cycle(&self.state.tags).await;
        info!("{}", status);

        if let Some(dynamic) = self.dcs.cached_cluster().and_then(|cluster| cluster.config)
            && self.config.set_dynamic_configuration(&dynamic)
        {
            info!("Cluster configuration changed");
            self.reload_config(false).await;
        }

        if self.postgresql.is_data_directory_initialized()
            && let Err(e) = self.config.save_cache()
        {
            warn!(error = %e, "Failed to save dynamic configuration cache");
        }

        reap_children();
    }

    /// Push the configuration now in effect to every collaborator
    ///
    /// `local` means the config file changed, which also moves tags, loop
    /// tuning and the status endpoint. Every step runs even if an earlier
    /// one failed.
    async fn reload_config(&mut self, local: bool) {
        if local {
            self.state.tags = Tags::from_config(self.config.tags());
            self.overrun_yield = self.config.scheduler().overrun_yield();
            debug!(tags = ?self.state.tags, "reload_config: tags re-derived");
        }

        if let Some(dynamic) = self.config.dynamic_configuration().cloned()
            && let Err(e) = self.dcs.push_config(&dynamic).await
        {
            error!(error = %e, "Failed to push dynamic configuration to the coordination store");
        }

        if local && let Err(e) = self.api.reload_config(self.config.restapi()).await {
            error!(error = %e, "Failed to reload the status API");
        }

        if let Err(e) = self.postgresql.reload_config(&self.config.postgresql()).await {
            error!(error = %e, config_file = ?self.config.config_file(), "Failed to reload PostgreSQL configuration");
        }
    }

    /// Advance the anchor and wait for the next tick
    ///
    /// The wait ends early when another member changes the cluster (the
    /// anchor then restarts from that moment) or when termination is
    /// requested.
    pub(crate) async fn schedule_next_tick(&mut self) -> NextTick {
        let interval = self.dcs.tick_interval();
        let next = self.state.advance(interval, Instant::now());

        match next {
            NextTick::Overrun => {
                warn!("Loop time exceeded, rescheduling immediately.");
                if self.overrun_yield.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::select! {
                        biased;
                        _ = self.signals.terminated() => {}
                        _ = tokio::time::sleep(self.overrun_yield) => {}
                    }
                }
            }
            NextTick::Wait(timeout) => {
                let changed = tokio::select! {
                    biased;
                    _ = self.signals.terminated() => false,
                    changed = self.dcs.watch(timeout) => changed,
                };
                if changed {
                    debug!("schedule_next_tick: woken by cluster change");
                    self.state.reset(Instant::now());
                }
            }
        }
        next
    }
}
