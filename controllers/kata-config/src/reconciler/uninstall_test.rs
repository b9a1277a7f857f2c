use super::*;
use crate::events::reasons;
use crate::image::job::{CREATE_JOB_NAME, DELETE_JOB_NAME};
use crate::image::{PEER_PODS_CONFIG_MAP, PEER_PODS_SECRET};
use crate::machine_config::EXTENSION_MACHINE_CONFIG;
use crate::monitor::MONITOR_DAEMON_SET;
use crate::test_utils::{kata_config, pool_status, Harness, KATA_CONFIG_NAME, NAMESPACE};
use cluster_client::mock::helpers::{node, pod};
use cluster_client::ClusterClientTrait;
use crds::well_known::{DEDICATED_POOL, DEDICATED_POOL_ROLE_LABEL, MASTER_POOL, WORKER_POOL, WORKER_ROLE_LABEL};
use crds::{KataConfigSpec, MachineConfigPool, MachineConfigPoolSpec};
use k8s_openapi::api::batch::v1::JobStatus;

const PEER_PODS_CONFIG: [(&str, &str); 4] = [
    ("AWS_REGION", "us-east-1"),
    ("AWS_SUBNET_ID", "subnet-1"),
    ("AWS_VPC_ID", "vpc-1"),
    ("PODVM_AMI_ID", "ami-123"),
];

/// Install onto `nodes` through the dedicated pool, then request deletion
async fn installed_and_deleting(nodes: &[&str], spec: KataConfigSpec) -> Harness {
    let h = Harness::with_workers(nodes, spec);
    h.roll_out(nodes).await;
    assert_eq!(h.reconcile().await, Outcome::AwaitChange);
    assert!(h.status().installed);
    h.client.mark_kata_config_deleting(KATA_CONFIG_NAME);
    h.client.clear_writes();
    h
}

#[tokio::test]
async fn test_deleting_without_finalizer_is_left_alone() {
    let h = Harness::with_workers(&["w1"], KataConfigSpec::default());
    let mut kc = kata_config(KataConfigSpec::default());
    kc.metadata.finalizers = Some(vec!["example.com/other".to_string()]);
    h.client.add_kata_config(kc);
    h.client.mark_kata_config_deleting(KATA_CONFIG_NAME);

    assert_eq!(h.reconcile().await, Outcome::AwaitChange);
    assert!(h.client.writes().is_empty());
    assert!(h.kata_config().is_some());
}

#[tokio::test]
async fn test_pods_using_the_runtime_block_uninstall() {
    let h = installed_and_deleting(&["w1"], KataConfigSpec::default()).await;
    h.client.add_pod(pod("apps", "web-0", Some("kata")));
    h.client.add_pod(pod("apps", "plain", None));

    assert_eq!(h.reconcile().await, Outcome::Requeue);
    let kc = h.kata_config().unwrap();
    assert!(kc.has_finalizer(KATA_CONFIG_FINALIZER));
    let message = h.status().uninstallation_status.error_message.unwrap();
    assert!(message.contains("apps/web-0"));
    assert!(!message.contains("apps/plain"));
    assert!(h.client.runtime_class("kata").is_some());
    assert!(h.client.machine_config(EXTENSION_MACHINE_CONFIG).is_some());
    assert_eq!(h.events.warnings(), vec![reasons::UNINSTALL_BLOCKED.to_string()]);

    // Still blocked: the event is not repeated
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert_eq!(h.events.warnings().len(), 1);

    h.client.remove_pod("apps", "web-0");
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    let status = h.status();
    assert_eq!(status.uninstallation_status.error_message, None);
    assert!(!status.installed);
    assert!(status.runtime_classes.is_empty());
    assert!(h.client.runtime_class("kata").is_none());
    assert!(h.client.machine_config(EXTENSION_MACHINE_CONFIG).is_none());
}

#[tokio::test]
async fn test_dedicated_pool_teardown() {
    let h = installed_and_deleting(
        &["w1", "w2"],
        KataConfigSpec {
            kata_monitor_image: Some("quay.io/example/monitor:1".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert!(h.client.daemon_set(NAMESPACE, MONITOR_DAEMON_SET).is_some());
    let generation = h.client.machine_config_pool(DEDICATED_POOL).unwrap().generation();

    // Runtime classes and the machine config go first
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert!(h.client.daemon_set(NAMESPACE, MONITOR_DAEMON_SET).is_none());
    assert!(h.client.runtime_class("kata").is_none());
    assert!(h.client.machine_config(EXTENSION_MACHINE_CONFIG).is_none());
    let status = h.status();
    assert_eq!(status.base_mcp_generation, Some(generation));
    assert!(!status.installed);
    let writes = h.client.writes();
    let stored = writes.iter().position(|w| w.starts_with("patch KataConfig/status"));
    let deleted = writes.iter().position(|w| w.starts_with("delete MachineConfig"));
    assert!(stored.unwrap() < deleted.unwrap());
    assert_eq!(h.client.writes_matching("patch KataConfig/status").len(), 1);

    // The pool rolls the nodes back
    h.pool_renders(DEDICATED_POOL, "rendered-kata-oc-3", &[]);
    for name in ["w1", "w2"] {
        h.node_state(name, "Working", "rendered-kata-oc-2", "rendered-kata-oc-3");
    }
    h.pool_progress(DEDICATED_POOL, 2, 0);
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    let uninstall = h.status().uninstallation_status;
    assert_eq!(uninstall.in_progress.in_progress_nodes_count, 2);
    assert!(h.client.writes_matching("unlabel Node").is_empty());

    for name in ["w1", "w2"] {
        h.node_state(name, "Done", "rendered-kata-oc-3", "rendered-kata-oc-3");
    }
    h.pool_progress(DEDICATED_POOL, 2, 2);
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    let uninstall = h.status().uninstallation_status;
    assert_eq!(uninstall.completed.completed_nodes_count, 2);
    assert_eq!(h.client.writes_matching("unlabel Node").len(), 2);
    let labels = h.client.node("w1").unwrap().metadata.labels.unwrap();
    assert!(!labels.contains_key(DEDICATED_POOL_ROLE_LABEL));

    // Nodes left: the pool is drained and removed, then the finalizer
    h.pool_progress(DEDICATED_POOL, 0, 0);
    assert_eq!(h.reconcile().await, Outcome::Released);
    assert!(h.client.machine_config_pool(DEDICATED_POOL).is_none());
    assert!(h.kata_config().is_none());
    assert!(h
        .events
        .reasons()
        .contains(&reasons::UNINSTALLATION_COMPLETE.to_string()));
}

#[tokio::test]
async fn test_rollback_waits_when_config_vanished_before_watermark_was_stored() {
    let h = installed_and_deleting(&["w1", "w2"], KataConfigSpec::default()).await;
    let install_watermark = h.status().base_mcp_generation;
    h.client.delete_machine_config(EXTENSION_MACHINE_CONFIG).await.unwrap();

    // The pool is still on the install render and already past the old watermark
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert!(h.client.writes_matching("unlabel Node").is_empty());
    assert!(h.client.machine_config_pool(DEDICATED_POOL).is_some());
    assert_eq!(h.status().base_mcp_generation, install_watermark);

    h.pool_renders(DEDICATED_POOL, "rendered-kata-oc-3", &[]);
    for name in ["w1", "w2"] {
        h.node_state(name, "Done", "rendered-kata-oc-3", "rendered-kata-oc-3");
    }
    h.pool_progress(DEDICATED_POOL, 2, 2);
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert_eq!(h.client.writes_matching("unlabel Node").len(), 2);
}

#[tokio::test]
async fn test_undrained_pool_is_kept() {
    let h = installed_and_deleting(&["w1"], KataConfigSpec::default()).await;
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    h.pool_renders(DEDICATED_POOL, "rendered-kata-oc-3", &[]);
    h.node_state("w1", "Done", "rendered-kata-oc-3", "rendered-kata-oc-3");
    h.pool_progress(DEDICATED_POOL, 1, 1);
    assert_eq!(h.reconcile().await, Outcome::Requeue);

    // The pool still counts the node
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert!(h.client.machine_config_pool(DEDICATED_POOL).is_some());
    assert!(h.kata_config().is_some());
}

#[tokio::test]
async fn test_converged_cluster_keeps_master_pool() {
    let h = Harness::new();
    for name in ["m1", "m2", "m3"] {
        h.client
            .add_node(node(name, &[(WORKER_ROLE_LABEL, ""), ("node-role.kubernetes.io/master", "")]));
    }
    let mut worker = MachineConfigPool::new(WORKER_POOL, MachineConfigPoolSpec::default());
    worker.status = Some(pool_status(1, 0, 0));
    h.client.add_machine_config_pool(worker);
    let mut master = MachineConfigPool::new(MASTER_POOL, MachineConfigPoolSpec::default());
    master.status = Some(pool_status(1, 3, 3));
    h.client.add_machine_config_pool(master);
    h.client.add_kata_config(kata_config(KataConfigSpec::default()));

    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert_eq!(h.machine_config_role(EXTENSION_MACHINE_CONFIG).as_deref(), Some(MASTER_POOL));

    h.client.mark_kata_config_deleting(KATA_CONFIG_NAME);
    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert!(h.client.machine_config(EXTENSION_MACHINE_CONFIG).is_none());

    h.pool_renders(MASTER_POOL, "rendered-master-2", &[]);
    for name in ["m1", "m2", "m3"] {
        h.node_state(name, "Done", "rendered-master-2", "rendered-master-2");
    }
    h.pool_progress(MASTER_POOL, 3, 3);
    assert_eq!(h.reconcile().await, Outcome::Released);
    assert!(h.client.machine_config_pool(MASTER_POOL).is_some());
    assert!(h.client.writes_matching("unlabel Node").is_empty());
    assert!(h.kata_config().is_none());
}

fn configure_peer_pods(h: &Harness) {
    h.client.add_config_map(NAMESPACE, PEER_PODS_CONFIG_MAP, &PEER_PODS_CONFIG);
    h.client.add_secret(
        NAMESPACE,
        PEER_PODS_SECRET,
        &[("AWS_ACCESS_KEY_ID", "id"), ("AWS_SECRET_ACCESS_KEY", "secret")],
    );
}

async fn peer_pods_installed_and_deleting() -> Harness {
    let h = Harness::with_workers(
        &["w1"],
        KataConfigSpec {
            enable_peer_pods: true,
            ..Default::default()
        },
    );
    configure_peer_pods(&h);
    h.roll_out(&["w1"]).await;
    assert_eq!(h.reconcile().await, Outcome::AwaitChange);
    assert_eq!(h.status().runtime_classes, vec!["kata", "kata-remote"]);
    assert!(h.client.job(NAMESPACE, CREATE_JOB_NAME).is_none());

    h.client.mark_kata_config_deleting(KATA_CONFIG_NAME);
    h.client.clear_writes();
    h
}

#[tokio::test]
async fn test_peer_pods_image_is_deleted_before_machine_config() {
    let h = peer_pods_installed_and_deleting().await;

    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert!(h.client.runtime_class("kata-remote").is_none());
    assert!(h.client.job(NAMESPACE, DELETE_JOB_NAME).is_some());
    assert!(h.client.machine_config(EXTENSION_MACHINE_CONFIG).is_some());

    // The job clears the recorded image id and completes
    let without_image: Vec<_> = PEER_PODS_CONFIG
        .iter()
        .copied()
        .filter(|(k, _)| *k != "PODVM_AMI_ID")
        .collect();
    h.client.add_config_map(NAMESPACE, PEER_PODS_CONFIG_MAP, &without_image);
    let status: JobStatus = serde_json::from_value(serde_json::json!({
        "succeeded": 1,
        "conditions": [{"type": "Complete", "status": "True"}]
    }))
    .unwrap();
    h.client.set_job_status(NAMESPACE, DELETE_JOB_NAME, status);

    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert!(h.client.job(NAMESPACE, DELETE_JOB_NAME).is_none());
    assert!(h.client.machine_config(EXTENSION_MACHINE_CONFIG).is_none());
    assert!(h.events.reasons().contains(&reasons::IMAGE_DELETED.to_string()));
}

#[tokio::test]
async fn test_failed_image_deletion_does_not_block_uninstall() {
    let h = peer_pods_installed_and_deleting().await;
    assert_eq!(h.reconcile().await, Outcome::Requeue);

    let status: JobStatus = serde_json::from_value(serde_json::json!({
        "failed": 1,
        "conditions": [{"type": "Failed", "status": "True"}]
    }))
    .unwrap();
    h.client.set_job_status(NAMESPACE, DELETE_JOB_NAME, status);

    assert_eq!(h.reconcile().await, Outcome::Requeue);
    assert!(h.client.job(NAMESPACE, DELETE_JOB_NAME).is_none());
    assert!(h.client.machine_config(EXTENSION_MACHINE_CONFIG).is_none());
    assert!(h
        .events
        .warnings()
        .contains(&reasons::IMAGE_DELETION_FAILED.to_string()));
}
