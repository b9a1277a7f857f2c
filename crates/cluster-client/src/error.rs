//! Cluster client errors

use thiserror::Error;

/// Errors returned by [`ClusterClientTrait`](crate::ClusterClientTrait) operations
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API error not covered by a more specific variant
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic-concurrency check failed (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Map a raw kube error onto the typed variants, keyed by HTTP status
    pub(crate) fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(what.to_string()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists(what.to_string())
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(format!("{}: {}", what, ae.message)),
            other => Self::Kube(other),
        }
    }
}
