//! Machine configuration operations for MockClusterClient
//!
//! Handles pools, machine configs and CRI-O runtime configs

use super::MockClusterClient;
use crate::error::ClusterError;
use crds::{ContainerRuntimeConfig, MachineConfig, MachineConfigPool};

pub async fn get_machine_config_pool(client: &MockClusterClient, name: &str) -> Result<Option<MachineConfigPool>, ClusterError> {
    Ok(client.pools.lock().unwrap().get(name).cloned())
}

pub async fn create_machine_config_pool(client: &MockClusterClient, pool: &MachineConfigPool) -> Result<MachineConfigPool, ClusterError> {
    client.admit(&client.pools, "MachineConfigPool", pool)
}

pub async fn delete_machine_config_pool(client: &MockClusterClient, name: &str) -> Result<(), ClusterError> {
    client.remove(&client.pools, "MachineConfigPool", name)
}

pub async fn get_machine_config(client: &MockClusterClient, name: &str) -> Result<Option<MachineConfig>, ClusterError> {
    Ok(client.machine_configs.lock().unwrap().get(name).cloned())
}

pub async fn create_machine_config(client: &MockClusterClient, config: &MachineConfig) -> Result<MachineConfig, ClusterError> {
    client.admit(&client.machine_configs, "MachineConfig", config)
}

pub async fn delete_machine_config(client: &MockClusterClient, name: &str) -> Result<(), ClusterError> {
    client.remove(&client.machine_configs, "MachineConfig", name)
}

pub async fn get_container_runtime_config(client: &MockClusterClient, name: &str) -> Result<Option<ContainerRuntimeConfig>, ClusterError> {
    Ok(client.container_runtime_configs.lock().unwrap().get(name).cloned())
}

pub async fn create_container_runtime_config(client: &MockClusterClient, config: &ContainerRuntimeConfig) -> Result<ContainerRuntimeConfig, ClusterError> {
    client.admit(&client.container_runtime_configs, "ContainerRuntimeConfig", config)
}

pub async fn delete_container_runtime_config(client: &MockClusterClient, name: &str) -> Result<(), ClusterError> {
    client.remove(&client.container_runtime_configs, "ContainerRuntimeConfig", name)
}
