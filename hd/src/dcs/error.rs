//! Coordination store error types

use thiserror::Error;

/// Errors surfaced by a coordination store
#[derive(Debug, Error)]
pub enum DcsError {
    #[error("Coordination store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Cluster config changed concurrently (expected version {expected}, found {actual})")]
    Conflict { expected: u64, actual: u64 },

    #[error("Invalid cluster config in store: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

impl DcsError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DcsError::StoreUnavailable(_))
    }

    /// Worth retrying from a fresh fetch
    pub fn is_retryable(&self) -> bool {
        match self {
            DcsError::StoreUnavailable(_) => true,
            DcsError::Conflict { .. } => true,
            DcsError::InvalidConfig(_) => false,
        }
    }
}

impl From<clusterstore::StoreError> for DcsError {
    fn from(err: clusterstore::StoreError) -> Self {
        match err {
            clusterstore::StoreError::Conflict { expected, actual } => DcsError::Conflict { expected, actual },
            other => DcsError::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: DcsError = clusterstore::StoreError::Conflict { expected: 1, actual: 3 }.into();
        assert!(matches!(err, DcsError::Conflict { expected: 1, actual: 3 }));
        assert!(err.is_retryable());
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_invalid_config_not_retryable() {
        let json_err = serde_json::from_str::<u64>("\"x\"").unwrap_err();
        let err = DcsError::InvalidConfig(json_err);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unavailable_is_retryable() {
        let err = DcsError::StoreUnavailable("disk gone".to_string());
        assert!(err.is_unavailable());
        assert!(err.is_retryable());
    }
}
