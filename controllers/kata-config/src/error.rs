//! Controller-specific error types.
//!
//! Cluster API failures arrive as [`ClusterError`]; everything else the
//! controller can fail on is listed here.

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the KataConfig controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error raised through the cluster client
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Invalid operator configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Feature gate parameters could not be applied
    #[error("Feature {feature}: {message}")]
    Feature {
        feature: &'static str,
        message: String,
    },

    /// Peer-pod provider is not supported or not configured
    #[error("Peer pods unavailable: {0}")]
    PeerPods(String),

    /// Image job template could not be loaded or parsed
    #[error("Job template error: {0}")]
    Template(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether this is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Cluster(e) if e.is_conflict())
    }
}
