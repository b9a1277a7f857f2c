//! KataConfig operations for MockClusterClient
//!
//! Status and finalizer patches honour the caller's resource version the
//! same way the API server does for a conditional merge patch.

use super::MockClusterClient;
use crate::error::ClusterError;
use crds::{KataConfig, KataConfigStatus};

fn check_version(current: &KataConfig, expected: Option<&str>) -> Result<(), ClusterError> {
    match expected {
        Some(expected) if current.metadata.resource_version.as_deref() != Some(expected) => {
            Err(ClusterError::Conflict(format!(
                "KataConfig {} was modified (have {}, current {})",
                current.metadata.name.as_deref().unwrap_or_default(),
                expected,
                current.metadata.resource_version.as_deref().unwrap_or_default(),
            )))
        }
        _ => Ok(()),
    }
}

pub async fn get_kata_config(client: &MockClusterClient, name: &str) -> Result<Option<KataConfig>, ClusterError> {
    Ok(client.kata_configs.lock().unwrap().get(name).cloned())
}

pub async fn patch_kata_config_status(client: &MockClusterClient, name: &str, resource_version: Option<&str>, status: &KataConfigStatus) -> Result<KataConfig, ClusterError> {
    let mut store = client.kata_configs.lock().unwrap();
    let kata_config = store
        .get_mut(name)
        .ok_or_else(|| ClusterError::NotFound(format!("KataConfig {}", name)))?;
    check_version(kata_config, resource_version)?;

    kata_config.status = Some(status.clone());
    kata_config.metadata.resource_version = Some(client.next_version());
    let updated = kata_config.clone();
    drop(store);

    client.record("patch", "KataConfig/status", name);
    Ok(updated)
}

pub async fn patch_kata_config_finalizers(client: &MockClusterClient, name: &str, resource_version: Option<&str>, finalizers: &[String]) -> Result<KataConfig, ClusterError> {
    let mut store = client.kata_configs.lock().unwrap();
    let kata_config = store
        .get_mut(name)
        .ok_or_else(|| ClusterError::NotFound(format!("KataConfig {}", name)))?;
    check_version(kata_config, resource_version)?;

    kata_config.metadata.finalizers = Some(finalizers.to_vec());
    kata_config.metadata.resource_version = Some(client.next_version());
    let updated = kata_config.clone();

    // Deletion completes once nothing holds the object
    if finalizers.is_empty() && updated.metadata.deletion_timestamp.is_some() {
        store.remove(name);
    }
    drop(store);

    client.record("patch", "KataConfig/finalizers", name);
    Ok(updated)
}
