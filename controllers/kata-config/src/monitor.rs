//! Per-node runtime monitor daemon

use crate::error::ControllerError;
use cluster_client::ClusterClientTrait;
use crds::well_known::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HostPathVolumeSource, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use tracing::info;

pub const MONITOR_DAEMON_SET: &str = "openshift-sandboxed-containers-monitor";
const MONITOR_PORT: i32 = 8090;
const RUNTIME_STATE_DIR: &str = "/run/vc";

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("name".to_string(), MONITOR_DAEMON_SET.to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
    ])
}

/// Monitor daemon set running `image` on the pool's nodes
pub fn monitor_daemon_set(
    namespace: &str,
    image: &str,
    node_selector: &BTreeMap<String, String>,
    owner: Option<OwnerReference>,
) -> DaemonSet {
    let volume = "runtime-state";
    DaemonSet {
        metadata: ObjectMeta {
            name: Some(MONITOR_DAEMON_SET.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels()),
            owner_references: owner.map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([("name".to_string(), MONITOR_DAEMON_SET.to_string())])),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    node_selector: Some(node_selector.clone()),
                    containers: vec![Container {
                        name: "kata-monitor".to_string(),
                        image: Some(image.to_string()),
                        args: Some(vec![format!("--listen-address=0.0.0.0:{}", MONITOR_PORT)]),
                        ports: Some(vec![ContainerPort {
                            name: Some("metrics".to_string()),
                            container_port: MONITOR_PORT,
                            ..Default::default()
                        }]),
                        volume_mounts: Some(vec![VolumeMount {
                            name: volume.to_string(),
                            mount_path: RUNTIME_STATE_DIR.to_string(),
                            read_only: Some(true),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: volume.to_string(),
                        host_path: Some(HostPathVolumeSource {
                            path: RUNTIME_STATE_DIR.to_string(),
                            type_: None,
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Whether a deployed monitor runs `image` on the nodes of `node_selector`
fn deployed_as(daemon_set: &DaemonSet, image: &str, node_selector: &BTreeMap<String, String>) -> bool {
    let Some(pod) = daemon_set.spec.as_ref().and_then(|s| s.template.spec.as_ref()) else {
        return false;
    };
    let images_match = pod
        .containers
        .iter()
        .all(|c| c.image.as_deref() == Some(image));
    !pod.containers.is_empty() && images_match && pod.node_selector.as_ref() == Some(node_selector)
}

/// Deploy the monitor when an image is configured, remove it otherwise
pub async fn ensure_monitor(
    client: &dyn ClusterClientTrait,
    namespace: &str,
    image: Option<&str>,
    node_selector: &BTreeMap<String, String>,
    owner: Option<OwnerReference>,
) -> Result<(), ControllerError> {
    let Some(image) = image.filter(|i| !i.is_empty()) else {
        return delete_monitor(client, namespace).await;
    };
    if let Some(existing) = client.get_daemon_set(namespace, MONITOR_DAEMON_SET).await? {
        if deployed_as(&existing, image, node_selector) {
            return Ok(());
        }
        info!("Monitor settings changed, redeploying");
        delete_monitor(client, namespace).await?;
    }
    match client
        .create_daemon_set(namespace, &monitor_daemon_set(namespace, image, node_selector, owner))
        .await
    {
        Ok(_) => {
            info!("Deployed monitor daemon set with image {}", image);
            Ok(())
        }
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_monitor(client: &dyn ClusterClientTrait, namespace: &str) -> Result<(), ControllerError> {
    match client.delete_daemon_set(namespace, MONITOR_DAEMON_SET).await {
        Ok(()) => {
            info!("Deleted monitor daemon set");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockClusterClient;

    const NS: &str = "openshift-sandboxed-containers-operator";

    #[tokio::test]
    async fn test_monitor_follows_image_setting() {
        let client = MockClusterClient::new();
        let selector = BTreeMap::from([("node-role.kubernetes.io/kata-oc".to_string(), String::new())]);

        ensure_monitor(&client, NS, Some("quay.io/example/monitor:1"), &selector, None).await.unwrap();
        ensure_monitor(&client, NS, Some("quay.io/example/monitor:1"), &selector, None).await.unwrap();
        let ds = client.daemon_set(NS, MONITOR_DAEMON_SET).unwrap();
        let pod = ds.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.node_selector, Some(selector.clone()));
        assert_eq!(client.writes_matching("create DaemonSet").len(), 1);

        ensure_monitor(&client, NS, Some("quay.io/example/monitor:2"), &selector, None).await.unwrap();
        let ds = client.daemon_set(NS, MONITOR_DAEMON_SET).unwrap();
        let pod = ds.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("quay.io/example/monitor:2"));
        assert_eq!(client.writes_matching("delete DaemonSet").len(), 1);
        assert_eq!(client.writes_matching("create DaemonSet").len(), 2);

        ensure_monitor(&client, NS, None, &selector, None).await.unwrap();
        assert!(client.daemon_set(NS, MONITOR_DAEMON_SET).is_none());
    }

    #[tokio::test]
    async fn test_monitor_follows_pool_selector() {
        let client = MockClusterClient::new();
        let master = BTreeMap::from([("node-role.kubernetes.io/master".to_string(), String::new())]);
        let dedicated = BTreeMap::from([("node-role.kubernetes.io/kata-oc".to_string(), String::new())]);

        ensure_monitor(&client, NS, Some("quay.io/example/monitor:1"), &master, None).await.unwrap();
        ensure_monitor(&client, NS, Some("quay.io/example/monitor:1"), &dedicated, None).await.unwrap();
        let pod = client
            .daemon_set(NS, MONITOR_DAEMON_SET)
            .unwrap()
            .spec
            .unwrap()
            .template
            .spec
            .unwrap();
        assert_eq!(pod.node_selector, Some(dedicated));
    }
}
