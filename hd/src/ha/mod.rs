//! HA decision cycle contract
//!
//! The control loop runs one HA cycle per tick and only logs what it
//! returns. [`LeaseHa`] is the reference cycle built on the coordination
//! store's leader lease.

mod lease;

use async_trait::async_trait;

pub use lease::LeaseHa;

use crate::daemon::Tags;

/// One-shot HA decision cycle
#[async_trait]
pub trait HaCycle: Send + Sync {
    /// Evaluate the cluster once and act on it
    ///
    /// Never fails; problems are reported in the returned status line.
    async fn run_cycle(&self, tags: &Tags) -> String;

    /// Whether the cluster is in maintenance mode
    async fn is_paused(&self) -> bool;
}
