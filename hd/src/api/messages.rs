//! Status socket message types
//!
//! JSON-over-newline: each message is one line of JSON followed by `\n`.

use serde::{Deserialize, Serialize};

use crate::config::DynamicConfig;

/// Requests from `hd status` / `hd ping` to a running daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ApiRequest {
    /// Check the daemon is alive
    Ping,

    /// Member and cluster summary
    Status,
}

/// What a member knows about itself and its cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStatus {
    pub name: String,

    /// `leader`, `replica`, or `unknown` before the first fetch
    pub role: String,

    /// Holder of a live leader lease
    pub leader: Option<String>,

    pub paused: bool,

    /// Cluster-wide configuration as last read from the store
    pub config: Option<DynamicConfig>,
}

/// Daemon responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ApiResponse {
    Pong { version: String },

    Status(NodeStatus),

    Error { message: String },
}
