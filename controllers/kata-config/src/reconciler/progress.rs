//! Per-node rollout progress

use crate::status::NodeProgress;
use crds::well_known::{
    NODE_CURRENT_CONFIG_ANNOTATION, NODE_REASON_ANNOTATION, NODE_STATE_ANNOTATION,
    NODE_STATE_DEGRADED, NODE_STATE_DONE,
};
use crds::{FailedNode, MachineConfigPool};
use k8s_openapi::api::core::v1::Node;

/// Classify nodes against the pool's rendered configuration.
///
/// A node is completed only when it reports `Done` on the pool's desired
/// configuration and the pool has observed a generation past `watermark`.
/// A `Done` left over from an earlier rollout stays in progress.
pub fn classify_nodes(nodes: &[Node], pool: &MachineConfigPool, watermark: i64) -> NodeProgress {
    let desired = pool.desired_configuration();
    let advanced = pool.observed_generation() > watermark;
    let mut progress = NodeProgress::default();

    for node in nodes {
        let name = node.metadata.name.clone().unwrap_or_default();
        let annotation = |key: &str| {
            node.metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(key))
                .map(String::as_str)
        };

        match annotation(NODE_STATE_ANNOTATION) {
            Some(NODE_STATE_DEGRADED) => progress.failed.push(FailedNode {
                name,
                error: annotation(NODE_REASON_ANNOTATION)
                    .filter(|r| !r.is_empty())
                    .unwrap_or("node failed to apply its configuration")
                    .to_string(),
            }),
            Some(NODE_STATE_DONE)
                if advanced && desired.is_some() && annotation(NODE_CURRENT_CONFIG_ANNOTATION) == desired =>
            {
                progress.completed.push(name);
            }
            _ => progress.in_progress.push(name),
        }
    }
    progress
}
