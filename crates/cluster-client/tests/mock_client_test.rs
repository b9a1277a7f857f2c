//! Behaviour of the in-memory cluster that reconciler tests rely on

use cluster_client::mock::helpers::{node, pod};
use cluster_client::{ClusterClientTrait, MockClusterClient};
use crds::{KataConfig, KataConfigSpec, KataConfigStatus, MachineConfig, MachineConfigSpec};

fn kata_config(name: &str) -> KataConfig {
    KataConfig::new(name, KataConfigSpec::default())
}

#[tokio::test]
async fn test_stale_status_patch_conflicts() {
    let client = MockClusterClient::new();
    client.add_kata_config(kata_config("example"));

    let read = client.get_kata_config("example").await.unwrap().unwrap();
    let rv = read.metadata.resource_version.clone();
    client.touch_kata_config("example");

    let err = client
        .patch_kata_config_status("example", rv.as_deref(), &KataConfigStatus::default())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_status_patch_advances_resource_version() {
    let client = MockClusterClient::new();
    client.add_kata_config(kata_config("example"));

    let read = client.get_kata_config("example").await.unwrap().unwrap();
    let status = KataConfigStatus {
        total_nodes_count: 2,
        ..Default::default()
    };
    let updated = client
        .patch_kata_config_status("example", read.metadata.resource_version.as_deref(), &status)
        .await
        .unwrap();

    assert_ne!(updated.metadata.resource_version, read.metadata.resource_version);
    assert_eq!(updated.status.unwrap().total_nodes_count, 2);
}

#[tokio::test]
async fn test_removing_last_finalizer_completes_deletion() {
    let client = MockClusterClient::new();
    let mut kc = kata_config("example");
    kc.metadata.finalizers = Some(vec!["kataconfiguration.openshift.io/finalizer".to_string()]);
    client.add_kata_config(kc);
    client.mark_kata_config_deleting("example");
    assert!(client.kata_config("example").unwrap().is_deleting());

    client
        .patch_kata_config_finalizers("example", None, &[])
        .await
        .unwrap();
    assert!(client.kata_config("example").is_none());
}

#[tokio::test]
async fn test_create_twice_reports_already_exists() {
    let client = MockClusterClient::new();
    let mc = MachineConfig::new("50-enable-sandboxed-containers-extension", MachineConfigSpec::default());

    client.create_machine_config(&mc).await.unwrap();
    let err = client.create_machine_config(&mc).await.unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(client.writes_matching("create MachineConfig").len(), 1);
}

#[tokio::test]
async fn test_delete_missing_reports_not_found() {
    let client = MockClusterClient::new();
    let err = client.delete_runtime_class("kata").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_node_selection_and_labels() {
    let client = MockClusterClient::new();
    client.add_node(node("worker-0", &[("node-role.kubernetes.io/worker", "")]));
    client.add_node(node("worker-1", &[("node-role.kubernetes.io/worker", "")]));
    client.add_node(node("master-0", &[("node-role.kubernetes.io/master", "")]));

    let workers = client.list_nodes("node-role.kubernetes.io/worker").await.unwrap();
    assert_eq!(workers.len(), 2);

    client
        .set_node_label("worker-0", "node-role.kubernetes.io/kata-oc", Some(""))
        .await
        .unwrap();
    let labelled = client.list_nodes("node-role.kubernetes.io/kata-oc").await.unwrap();
    assert_eq!(labelled.len(), 1);

    client
        .set_node_label("worker-0", "node-role.kubernetes.io/kata-oc", None)
        .await
        .unwrap();
    assert!(client.list_nodes("node-role.kubernetes.io/kata-oc").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pods_are_listed_across_namespaces() {
    let client = MockClusterClient::new();
    client.add_pod(pod("a", "p1", Some("kata")));
    client.add_pod(pod("b", "p2", None));

    assert_eq!(client.list_pods().await.unwrap().len(), 2);
    client.remove_pod("a", "p1");
    assert_eq!(client.list_pods().await.unwrap().len(), 1);
}
