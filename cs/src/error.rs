//! ClusterStore error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cluster state in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this is a compare-and-set conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Check if the store itself could not be reached or read
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Io { .. } | StoreError::Corrupt { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
