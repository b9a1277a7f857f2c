//! Kubernetes access layer for the Kata Operator
//!
//! Every API call the operator makes goes through [`ClusterClientTrait`].
//! [`KubeClusterClient`] implements it with kube-rs; with the `test-util`
//! feature, [`MockClusterClient`] implements it in memory for unit tests.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::try_default().await?;
//! let workers = client.list_nodes("node-role.kubernetes.io/worker").await?;
//! println!("{} worker nodes", workers.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(feature = "test-util")]
pub use mock::MockClusterClient;
