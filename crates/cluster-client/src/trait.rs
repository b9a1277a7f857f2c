//! ClusterClient trait for mocking
//!
//! This trait abstracts every control-plane call the operator makes so that
//! reconcilers can be exercised against an in-memory cluster in unit tests.
//! The concrete [`KubeClusterClient`](crate::KubeClusterClient) implements it on top of kube-rs.

use crate::error::ClusterError;
use crds::{
    ContainerRuntimeConfig, KataConfig, KataConfigStatus, MachineConfig, MachineConfigPool,
};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Secret};
use k8s_openapi::api::node::v1::RuntimeClass;

/// Trait for Kubernetes API operations used by the operator
///
/// Lookups return `Ok(None)` for missing objects. Creates fail with
/// [`ClusterError::AlreadyExists`] and deletes with [`ClusterError::NotFound`]
/// so callers decide what is tolerable.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // KataConfig
    async fn get_kata_config(&self, name: &str) -> Result<Option<KataConfig>, ClusterError>;
    /// Replace the status, failing with [`ClusterError::Conflict`] if the object changed since
    /// `resource_version` was read.
    async fn patch_kata_config_status(&self, name: &str, resource_version: Option<&str>, status: &KataConfigStatus) -> Result<KataConfig, ClusterError>;
    async fn patch_kata_config_finalizers(&self, name: &str, resource_version: Option<&str>, finalizers: &[String]) -> Result<KataConfig, ClusterError>;

    // Nodes and workloads
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ClusterError>;
    /// Set (`Some`) or remove (`None`) a single node label
    async fn set_node_label(&self, node: &str, key: &str, value: Option<&str>) -> Result<(), ClusterError>;
    async fn list_pods(&self) -> Result<Vec<Pod>, ClusterError>;

    // Machine configuration
    async fn get_machine_config_pool(&self, name: &str) -> Result<Option<MachineConfigPool>, ClusterError>;
    async fn create_machine_config_pool(&self, pool: &MachineConfigPool) -> Result<MachineConfigPool, ClusterError>;
    async fn delete_machine_config_pool(&self, name: &str) -> Result<(), ClusterError>;
    async fn get_machine_config(&self, name: &str) -> Result<Option<MachineConfig>, ClusterError>;
    async fn create_machine_config(&self, config: &MachineConfig) -> Result<MachineConfig, ClusterError>;
    async fn delete_machine_config(&self, name: &str) -> Result<(), ClusterError>;
    async fn get_container_runtime_config(&self, name: &str) -> Result<Option<ContainerRuntimeConfig>, ClusterError>;
    async fn create_container_runtime_config(&self, config: &ContainerRuntimeConfig) -> Result<ContainerRuntimeConfig, ClusterError>;
    async fn delete_container_runtime_config(&self, name: &str) -> Result<(), ClusterError>;

    // Runtime classes
    async fn create_runtime_class(&self, runtime_class: &RuntimeClass) -> Result<RuntimeClass, ClusterError>;
    async fn delete_runtime_class(&self, name: &str) -> Result<(), ClusterError>;

    // Namespaced objects
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, ClusterError>;
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ClusterError>;
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError>;
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ClusterError>;
    /// Delete a job together with its pods
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>, ClusterError>;
    async fn create_daemon_set(&self, namespace: &str, daemon_set: &DaemonSet) -> Result<DaemonSet, ClusterError>;
    async fn delete_daemon_set(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    // Platform
    /// Lower-cased platform type of the cluster infrastructure (e.g. "aws"), if known
    async fn get_platform_type(&self) -> Result<Option<String>, ClusterError>;
}
