//! Builders for objects tests commonly seed into the mock cluster

use crds::well_known::{
    NODE_CURRENT_CONFIG_ANNOTATION, NODE_DESIRED_CONFIG_ANNOTATION, NODE_REASON_ANNOTATION,
    NODE_STATE_ANNOTATION,
};
use k8s_openapi::api::core::v1::{Node, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// A node carrying the given labels and no rollout annotations
pub fn node(name: &str, labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Rollout annotations as the machine config daemon writes them
pub fn node_state_annotations(
    state: &str,
    current_config: &str,
    desired_config: &str,
    reason: Option<&str>,
) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(NODE_STATE_ANNOTATION.to_string(), state.to_string());
    annotations.insert(NODE_CURRENT_CONFIG_ANNOTATION.to_string(), current_config.to_string());
    annotations.insert(NODE_DESIRED_CONFIG_ANNOTATION.to_string(), desired_config.to_string());
    if let Some(reason) = reason {
        annotations.insert(NODE_REASON_ANNOTATION.to_string(), reason.to_string());
    }
    annotations
}

/// A pod requesting the given runtime class
pub fn pod(namespace: &str, name: &str, runtime_class: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            runtime_class_name: runtime_class.map(str::to_string),
            ..Default::default()
        }),
        ..Default::default()
    }
}
