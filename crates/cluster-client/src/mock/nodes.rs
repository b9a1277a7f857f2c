//! Node and pod operations for MockClusterClient

use super::selector;
use super::MockClusterClient;
use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{Node, Pod};

pub async fn list_nodes(client: &MockClusterClient, label_selector: &str) -> Result<Vec<Node>, ClusterError> {
    let nodes = client.nodes.lock().unwrap();
    let mut matching: Vec<Node> = nodes
        .values()
        .filter(|n| selector::matches(label_selector, n.metadata.labels.as_ref().unwrap_or(&Default::default())))
        .cloned()
        .collect();
    matching.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    Ok(matching)
}

pub async fn set_node_label(client: &MockClusterClient, node: &str, key: &str, value: Option<&str>) -> Result<(), ClusterError> {
    let mut nodes = client.nodes.lock().unwrap();
    let target = nodes
        .get_mut(node)
        .ok_or_else(|| ClusterError::NotFound(format!("Node {}", node)))?;

    let labels = target.metadata.labels.get_or_insert_with(Default::default);
    match value {
        Some(value) => {
            labels.insert(key.to_string(), value.to_string());
        }
        None => {
            labels.remove(key);
        }
    }
    target.metadata.resource_version = Some(client.next_version());
    drop(nodes);

    let verb = if value.is_some() { "label" } else { "unlabel" };
    client.record(verb, "Node", node);
    Ok(())
}

pub async fn list_pods(client: &MockClusterClient) -> Result<Vec<Pod>, ClusterError> {
    Ok(client.pods.lock().unwrap().values().cloned().collect())
}
