//! Workload operations for MockClusterClient
//!
//! Handles runtime classes, config maps, secrets, jobs and daemon sets

use super::{ns_name, MockClusterClient};
use crate::error::ClusterError;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::node::v1::RuntimeClass;

pub async fn create_runtime_class(client: &MockClusterClient, runtime_class: &RuntimeClass) -> Result<RuntimeClass, ClusterError> {
    client.admit(&client.runtime_classes, "RuntimeClass", runtime_class)
}

pub async fn delete_runtime_class(client: &MockClusterClient, name: &str) -> Result<(), ClusterError> {
    client.remove(&client.runtime_classes, "RuntimeClass", name)
}

pub async fn get_config_map(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Option<ConfigMap>, ClusterError> {
    Ok(client.config_maps.lock().unwrap().get(&ns_name(namespace, name)).cloned())
}

pub async fn get_secret(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Option<Secret>, ClusterError> {
    Ok(client.secrets.lock().unwrap().get(&ns_name(namespace, name)).cloned())
}

pub async fn get_job(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError> {
    Ok(client.jobs.lock().unwrap().get(&ns_name(namespace, name)).cloned())
}

pub async fn create_job(client: &MockClusterClient, namespace: &str, job: &Job) -> Result<Job, ClusterError> {
    client.admit_namespaced(&client.jobs, "Job", namespace, job)
}

pub async fn delete_job(client: &MockClusterClient, namespace: &str, name: &str) -> Result<(), ClusterError> {
    client.remove_namespaced(&client.jobs, "Job", namespace, name)
}

pub async fn get_daemon_set(client: &MockClusterClient, namespace: &str, name: &str) -> Result<Option<DaemonSet>, ClusterError> {
    Ok(client.daemon_sets.lock().unwrap().get(&ns_name(namespace, name)).cloned())
}

pub async fn create_daemon_set(client: &MockClusterClient, namespace: &str, daemon_set: &DaemonSet) -> Result<DaemonSet, ClusterError> {
    client.admit_namespaced(&client.daemon_sets, "DaemonSet", namespace, daemon_set)
}

pub async fn delete_daemon_set(client: &MockClusterClient, namespace: &str, name: &str) -> Result<(), ClusterError> {
    client.remove_namespaced(&client.daemon_sets, "DaemonSet", namespace, name)
}
