//! Loop-owned daemon state and tick arithmetic

use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

use super::Tags;

/// What the scheduler should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextTick {
    /// The tick ran past its slot; start the next one now
    Overrun,
    /// Wait this long (or until woken) before the next tick
    Wait(Duration),
}

/// State owned by the control loop for the daemon's lifetime
#[derive(Debug, Clone)]
pub struct DaemonState {
    /// Anchor of the next tick
    pub next_tick: Instant,

    /// Tags derived from local configuration
    pub tags: Tags,

    /// Restart requests keyed by member; not interpreted by the loop
    pub scheduled_restart: BTreeMap<String, Value>,
}

impl DaemonState {
    pub fn new(tags: Tags) -> Self {
        Self {
            next_tick: Instant::now(),
            tags,
            scheduled_restart: BTreeMap::new(),
        }
    }

    /// Move the anchor one interval forward and decide how to wait for it
    ///
    /// An anchor already reached by `now` is pulled to `now`, never left in
    /// the past.
    pub fn advance(&mut self, interval: Duration, now: Instant) -> NextTick {
        self.next_tick += interval;
        if now >= self.next_tick {
            self.next_tick = now;
            NextTick::Overrun
        } else {
            NextTick::Wait(self.next_tick - now)
        }
    }

    /// Restart the schedule from `now`
    pub fn reset(&mut self, now: Instant) {
        self.next_tick = now;
    }
}
