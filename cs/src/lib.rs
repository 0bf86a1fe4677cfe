//! ClusterStore - file-backed coordination store for HA clusters
//!
//! Holds the cluster-wide dynamic configuration and the leader lease for a
//! cluster scope. Every node of a cluster opens the same directory (local
//! disk for single-host test clusters, a shared mount otherwise); writes are
//! serialized through an advisory file lock and replace the state atomically.
//!
//! # Architecture
//!
//! ```text
//! <store_path>/
//! └── {scope}/
//!     ├── .lock        # exclusive for writes, shared for reads
//!     └── state.json   # version, config, config_version, leader
//! ```
//!
//! # Example
//!
//! ```ignore
//! use clusterstore::ClusterStore;
//!
//! let store = ClusterStore::open("/var/lib/clusterstore", "batman")?;
//! let update = store.acquire_leader("node1", Duration::from_secs(30))?;
//! assert!(update.applied);
//! ```

pub mod cli;
pub mod config;
pub mod edit;
mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::{ClusterState, ClusterStore, LeaderRecord, Update, now_ms};

/// Default cluster scope
pub const DEFAULT_SCOPE: &str = "main";
