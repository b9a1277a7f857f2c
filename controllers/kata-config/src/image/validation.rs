//! Provider configuration checks run before any image job is started

use super::{CloudProvider, PEER_PODS_CONFIG_MAP, PEER_PODS_SECRET};
use crate::error::ControllerError;
use cluster_client::ClusterClientTrait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};

/// Keys that must be present and non-empty: (config map keys, secret keys)
pub fn required_keys(provider: &CloudProvider) -> (&'static [&'static str], &'static [&'static str]) {
    match provider {
        CloudProvider::Aws => (
            &["AWS_REGION", "AWS_SUBNET_ID", "AWS_VPC_ID"],
            &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"],
        ),
        CloudProvider::Azure => (
            &["AZURE_REGION", "AZURE_RESOURCE_GROUP", "AZURE_SUBNET_ID"],
            &["AZURE_CLIENT_ID", "AZURE_CLIENT_SECRET", "AZURE_TENANT_ID", "AZURE_SUBSCRIPTION_ID"],
        ),
        CloudProvider::Gcp => (&["GCP_PROJECT_ID", "GCP_ZONE"], &["GCP_CREDENTIALS"]),
        CloudProvider::Libvirt => (&["LIBVIRT_POOL", "LIBVIRT_VOL_NAME"], &["LIBVIRT_URI"]),
        CloudProvider::Unsupported(_) => (&[], &[]),
    }
}

/// Required keys missing or empty in the provider config map and secret
pub fn missing_keys(
    provider: &CloudProvider,
    config_map: Option<&ConfigMap>,
    secret: Option<&Secret>,
) -> Vec<String> {
    let (cm_keys, secret_keys) = required_keys(provider);
    let cm_data = config_map.and_then(|cm| cm.data.as_ref());
    let secret_data = secret.and_then(|s| s.data.as_ref());
    let secret_string_data = secret.and_then(|s| s.string_data.as_ref());

    let mut missing: Vec<String> = cm_keys
        .iter()
        .filter(|k| cm_data.and_then(|d| d.get(**k)).is_none_or(|v| v.trim().is_empty()))
        .map(|k| format!("{}/{}", PEER_PODS_CONFIG_MAP, k))
        .collect();

    missing.extend(
        secret_keys
            .iter()
            .filter(|k| {
                let in_data = secret_data.and_then(|d| d.get(**k)).is_some_and(|v| !v.0.is_empty());
                let in_string_data = secret_string_data
                    .and_then(|d| d.get(**k))
                    .is_some_and(|v| !v.is_empty());
                !in_data && !in_string_data
            })
            .map(|k| format!("{}/{}", PEER_PODS_SECRET, k)),
    );
    missing
}

/// Fail unless the provider is supported and fully configured
pub async fn validate_peer_pods_config(
    client: &dyn ClusterClientTrait,
    namespace: &str,
    provider: &CloudProvider,
) -> Result<(), ControllerError> {
    if !provider.is_supported() {
        return Err(ControllerError::PeerPods(format!(
            "cloud provider {} is not supported",
            provider
        )));
    }

    let config_map = client.get_config_map(namespace, PEER_PODS_CONFIG_MAP).await?;
    let secret = client.get_secret(namespace, PEER_PODS_SECRET).await?;
    let missing = missing_keys(provider, config_map.as_ref(), secret.as_ref());
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ControllerError::PeerPods(format!(
            "missing {} configuration: {}",
            provider,
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockClusterClient;

    const NS: &str = "openshift-sandboxed-containers-operator";

    #[tokio::test]
    async fn test_complete_config_passes() {
        let client = MockClusterClient::new();
        client.add_config_map(NS, PEER_PODS_CONFIG_MAP, &[("GCP_PROJECT_ID", "p"), ("GCP_ZONE", "z")]);
        client.add_secret(NS, PEER_PODS_SECRET, &[("GCP_CREDENTIALS", "{}")]);

        validate_peer_pods_config(&client, NS, &CloudProvider::Gcp).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_and_absent_keys_are_reported() {
        let client = MockClusterClient::new();
        client.add_config_map(NS, PEER_PODS_CONFIG_MAP, &[("AWS_REGION", "us-east-1"), ("AWS_SUBNET_ID", " ")]);

        let err = validate_peer_pods_config(&client, NS, &CloudProvider::Aws).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("peer-pods-cm/AWS_SUBNET_ID"));
        assert!(message.contains("peer-pods-cm/AWS_VPC_ID"));
        assert!(message.contains("peer-pods-secret/AWS_ACCESS_KEY_ID"));
        assert!(!message.contains("AWS_REGION"));
    }

    #[tokio::test]
    async fn test_unsupported_provider_is_rejected() {
        let client = MockClusterClient::new();
        let err = validate_peer_pods_config(&client, NS, &CloudProvider::Unsupported("vsphere".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::PeerPods(_)));
    }
}
