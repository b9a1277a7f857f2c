//! KataConfig CRD
//!
//! Cluster-scoped resource declaring that the sandboxed container runtime
//! should be rolled out to a pool of worker nodes.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "kataconfiguration.openshift.io",
    version = "v1",
    kind = "KataConfig",
    plural = "kataconfigs",
    status = "KataConfigStatus",
    printcolumn = r#"{"name":"InProgress", "type":"integer", "jsonPath":".status.installationStatus.inProgress.inProgressNodesCount"}"#,
    printcolumn = r#"{"name":"Completed", "type":"integer", "jsonPath":".status.installationStatus.completed.completedNodesCount"}"#,
    printcolumn = r#"{"name":"Total", "type":"integer", "jsonPath":".status.totalNodesCount"}"#,
    printcolumn = r#"{"name":"RuntimeClasses", "type":"string", "jsonPath":".status.runtimeClass"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KataConfigSpec {
    /// Label query selecting the worker nodes that receive the runtime.
    /// Defaults to every node carrying the worker role label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::preserve_unknown_fields")]
    pub kata_config_pool_selector: Option<LabelSelector>,

    /// Also register the peer-pod runtime class and build its pod VM image
    #[serde(default)]
    pub enable_peer_pods: bool,

    /// CRI-O log level on the selected nodes (defaults to "info")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Image for the per-node monitor daemon. No daemon is deployed when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kata_monitor_image: Option<String>,

    /// Restrict the pool to nodes labelled as able to run the runtime
    #[serde(default)]
    pub check_node_eligibility: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KataConfigStatus {
    /// Number of nodes targeted by the rollout
    #[serde(default)]
    pub total_nodes_count: i32,

    /// Pool generation observed when the current rollout started.
    /// Pool progress at or below this generation belongs to an earlier rollout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_mcp_generation: Option<i64>,

    /// Installation progress
    #[serde(default)]
    pub installation_status: RolloutStatus,

    /// Uninstallation progress
    #[serde(default, rename = "unInstallationStatus")]
    #[schemars(rename = "unInstallationStatus")]
    pub uninstallation_status: RolloutStatus,

    /// Names of the runtime classes this resource registered
    #[serde(default)]
    pub runtime_classes: Vec<String>,

    /// Comma-joined `runtime_classes`, for printer columns
    #[serde(default)]
    pub runtime_class: String,

    /// Set once the pool converged and the runtime classes are registered
    #[serde(default)]
    pub installed: bool,
}

/// Per-node progress of an install or uninstall rollout
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStatus {
    #[serde(default)]
    pub in_progress: InProgressStatus,

    #[serde(default)]
    pub completed: CompletedStatus,

    #[serde(default)]
    pub failed: FailedStatus,

    /// Operator-facing diagnostic. Serialized as null when cleared so that a
    /// merge patch removes a stale message.
    #[serde(default)]
    pub error_message: Option<String>,

    /// Last time the node counts changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InProgressStatus {
    #[serde(default)]
    pub in_progress_nodes_count: i32,

    #[serde(default)]
    pub nodes_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedStatus {
    #[serde(default)]
    pub completed_nodes_count: i32,

    #[serde(default)]
    pub completed_nodes_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedStatus {
    #[serde(default)]
    pub failed_nodes_count: i32,

    #[serde(default)]
    pub failed_nodes_list: Vec<FailedNode>,
}

/// A node whose configuration rollout reported an error
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedNode {
    pub name: String,
    pub error: String,
}

impl RolloutStatus {
    /// Same node classification, ignoring the diagnostic and timestamp
    pub fn same_progress(&self, other: &Self) -> bool {
        self.in_progress == other.in_progress
            && self.completed == other.completed
            && self.failed == other.failed
    }
}

impl KataConfig {
    /// Whether the resource is being deleted
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the given finalizer is registered
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|s| s == finalizer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_deserializes_uninstallation_key() {
        let status: KataConfigStatus = serde_json::from_value(serde_json::json!({
            "totalNodesCount": 3,
            "unInstallationStatus": {
                "errorMessage": "pods still running"
            }
        }))
        .unwrap();

        assert_eq!(status.total_nodes_count, 3);
        assert_eq!(
            status.uninstallation_status.error_message.as_deref(),
            Some("pods still running")
        );
        assert!(status.runtime_classes.is_empty());
    }

    #[test]
    fn test_cleared_error_message_serializes_as_null() {
        let status = RolloutStatus::default();
        let value = serde_json::to_value(&status).unwrap();
        assert!(value.get("errorMessage").is_some_and(|v| v.is_null()));
    }

    #[test]
    fn test_same_progress_ignores_message() {
        let a = RolloutStatus::default();
        let b = RolloutStatus {
            error_message: Some("no nodes".to_string()),
            ..Default::default()
        };
        assert!(a.same_progress(&b));
    }
}
