//! Configuration pool selection and lifecycle

use crate::error::ControllerError;
use cluster_client::ClusterClientTrait;
use crds::well_known::{
    DEDICATED_POOL, DEDICATED_POOL_ROLE_LABEL, MACHINE_CONFIG_ROLE_LABEL, MANAGED_BY_LABEL,
    MANAGED_BY_VALUE, MASTER_POOL, POOL_SELECTOR_LABEL_PREFIX, WORKER_POOL,
};
use crds::{MachineConfigPool, MachineConfigPoolSpec};
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    LabelSelector, LabelSelectorRequirement, OwnerReference,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Which pool carries the rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolChoice {
    /// `kata-oc`, created for the rollout and deleted on uninstall
    Dedicated,
    /// Control-plane-only cluster: every node is in `master`, which is never deleted
    Converged,
}

impl PoolChoice {
    pub fn name(self) -> &'static str {
        match self {
            Self::Dedicated => DEDICATED_POOL,
            Self::Converged => MASTER_POOL,
        }
    }
}

/// Pick the pool for the rollout.
///
/// Once `kata-oc` exists it always wins, so the choice cannot flip mid-rollout.
pub async fn select_pool(client: &dyn ClusterClientTrait) -> Result<PoolChoice, ControllerError> {
    if client.get_machine_config_pool(DEDICATED_POOL).await?.is_some() {
        return Ok(PoolChoice::Dedicated);
    }

    let worker_machines = client
        .get_machine_config_pool(WORKER_POOL)
        .await?
        .map(|p| p.machine_count())
        .unwrap_or_default();
    let has_master = client.get_machine_config_pool(MASTER_POOL).await?.is_some();

    if worker_machines == 0 && has_master {
        debug!("Worker pool is empty, using the converged master pool");
        Ok(PoolChoice::Converged)
    } else {
        Ok(PoolChoice::Dedicated)
    }
}

/// The dedicated pool: renders worker and kata-oc configs onto nodes carrying the kata-oc role
pub fn dedicated_pool(owner: Option<OwnerReference>) -> MachineConfigPool {
    let mut pool = MachineConfigPool::new(
        DEDICATED_POOL,
        MachineConfigPoolSpec {
            machine_config_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: MACHINE_CONFIG_ROLE_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![WORKER_POOL.to_string(), DEDICATED_POOL.to_string()]),
                }]),
                ..Default::default()
            }),
            node_selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([(DEDICATED_POOL_ROLE_LABEL.to_string(), String::new())])),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    pool.metadata.labels = Some(BTreeMap::from([
        (format!("{}{}", POOL_SELECTOR_LABEL_PREFIX, DEDICATED_POOL), String::new()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
    ]));
    pool.metadata.owner_references = owner.map(|o| vec![o]);
    pool
}

/// Create the dedicated pool if it does not exist yet
pub async fn ensure_dedicated_pool(
    client: &dyn ClusterClientTrait,
    owner: Option<OwnerReference>,
) -> Result<(), ControllerError> {
    if client.get_machine_config_pool(DEDICATED_POOL).await?.is_some() {
        return Ok(());
    }
    match client.create_machine_config_pool(&dedicated_pool(owner)).await {
        Ok(_) => {
            info!("Created machine config pool {}", DEDICATED_POOL);
            Ok(())
        }
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Delete the dedicated pool; a missing one counts as deleted
pub async fn delete_dedicated_pool(client: &dyn ClusterClientTrait) -> Result<(), ControllerError> {
    match client.delete_machine_config_pool(DEDICATED_POOL).await {
        Ok(()) => {
            info!("Deleted machine config pool {}", DEDICATED_POOL);
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn has_label(node: &Node, key: &str) -> bool {
    node.metadata
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(key))
}

/// Add the kata-oc role to the nodes missing it. Returns how many were labelled.
pub async fn label_nodes(client: &dyn ClusterClientTrait, nodes: &[Node]) -> Result<usize, ControllerError> {
    let mut labelled = 0;
    for node in nodes.iter().filter(|n| !has_label(n, DEDICATED_POOL_ROLE_LABEL)) {
        let name = node.metadata.name.as_deref().unwrap_or_default();
        client.set_node_label(name, DEDICATED_POOL_ROLE_LABEL, Some("")).await?;
        debug!("Labelled node {} for pool {}", name, DEDICATED_POOL);
        labelled += 1;
    }
    Ok(labelled)
}

/// Remove the kata-oc role from the nodes carrying it. Returns how many were unlabelled.
pub async fn unlabel_nodes(client: &dyn ClusterClientTrait, nodes: &[Node]) -> Result<usize, ControllerError> {
    let mut unlabelled = 0;
    for node in nodes.iter().filter(|n| has_label(n, DEDICATED_POOL_ROLE_LABEL)) {
        let name = node.metadata.name.as_deref().unwrap_or_default();
        match client.set_node_label(name, DEDICATED_POOL_ROLE_LABEL, None).await {
            Ok(()) => unlabelled += 1,
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(unlabelled)
}

/// Remove the kata-oc role from pool members that are no longer in `selected`.
/// Returns how many were released.
pub async fn release_unselected_nodes(
    client: &dyn ClusterClientTrait,
    selected: &[Node],
) -> Result<usize, ControllerError> {
    let members = client.list_nodes(DEDICATED_POOL_ROLE_LABEL).await?;
    let stale: Vec<Node> = members
        .into_iter()
        .filter(|member| !selected.iter().any(|n| n.metadata.name == member.metadata.name))
        .collect();
    for node in &stale {
        debug!(
            "Node {} no longer matches the selector, leaving pool {}",
            node.metadata.name.as_deref().unwrap_or_default(),
            DEDICATED_POOL
        );
    }
    unlabel_nodes(client, &stale).await
}

/// Labels of the pool's node selector, mirrored onto runtime classes and the monitor
pub fn node_selector_labels(pool: &MachineConfigPool) -> BTreeMap<String, String> {
    pool.spec
        .node_selector
        .as_ref()
        .and_then(|s| s.match_labels.clone())
        .unwrap_or_default()
}
