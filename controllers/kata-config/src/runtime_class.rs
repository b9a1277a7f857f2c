//! Runtime class registrations
//!
//! The desired set is rebuilt on every reconcile and diffed against the
//! names recorded in status: missing ones are created, recorded ones that
//! are no longer desired are deleted.

use crate::error::ControllerError;
use cluster_client::ClusterClientTrait;
use crds::well_known::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use k8s_openapi::api::node::v1::{Overhead, RuntimeClass, Scheduling};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use tracing::info;

pub const DEFAULT_RUNTIME_CLASS: &str = "kata";
pub const PEER_PODS_RUNTIME_CLASS: &str = "kata-remote";
const DEFAULT_CPU_OVERHEAD: &str = "250m";
const DEFAULT_MEMORY_OVERHEAD: &str = "350Mi";
const PEER_PODS_MEMORY_OVERHEAD: &str = "120Mi";

/// One runtime class to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeClassEntry {
    pub name: String,
    pub cpu: String,
    pub memory: String,
}

impl RuntimeClassEntry {
    pub fn new(name: &str, cpu: &str, memory: &str) -> Self {
        Self {
            name: name.to_string(),
            cpu: cpu.to_string(),
            memory: memory.to_string(),
        }
    }

    pub fn with_default_overhead(name: &str) -> Self {
        Self::new(name, DEFAULT_CPU_OVERHEAD, DEFAULT_MEMORY_OVERHEAD)
    }

    /// RuntimeClass object; the handler name equals the class name
    pub fn runtime_class(
        &self,
        node_selector: &BTreeMap<String, String>,
        owner: Option<OwnerReference>,
    ) -> RuntimeClass {
        RuntimeClass {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                labels: Some(BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])),
                owner_references: owner.map(|o| vec![o]),
                ..Default::default()
            },
            handler: self.name.clone(),
            overhead: Some(Overhead {
                pod_fixed: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(self.cpu.clone())),
                    ("memory".to_string(), Quantity(self.memory.clone())),
                ])),
            }),
            scheduling: Some(Scheduling {
                node_selector: Some(node_selector.clone()),
                tolerations: None,
            }),
        }
    }
}

/// Default class, the peer-pod class when enabled, then feature-supplied extras.
/// A name appears once; the first occurrence wins.
pub fn desired_set(peer_pods: bool, extras: &[RuntimeClassEntry]) -> Vec<RuntimeClassEntry> {
    let mut set = vec![RuntimeClassEntry::with_default_overhead(DEFAULT_RUNTIME_CLASS)];
    if peer_pods {
        set.push(RuntimeClassEntry::new(
            PEER_PODS_RUNTIME_CLASS,
            DEFAULT_CPU_OVERHEAD,
            PEER_PODS_MEMORY_OVERHEAD,
        ));
    }
    for extra in extras {
        if !set.iter().any(|e| e.name == extra.name) {
            set.push(extra.clone());
        }
    }
    set
}

pub struct RuntimeClassHandler<'a> {
    client: &'a dyn ClusterClientTrait,
}

impl<'a> RuntimeClassHandler<'a> {
    pub fn new(client: &'a dyn ClusterClientTrait) -> Self {
        Self { client }
    }

    /// Bring the registered classes from `recorded` to `desired`.
    ///
    /// Returns the names to record in status.
    pub async fn reconcile(
        &self,
        desired: &[RuntimeClassEntry],
        recorded: &[String],
        node_selector: &BTreeMap<String, String>,
        owner: Option<OwnerReference>,
    ) -> Result<Vec<String>, ControllerError> {
        for entry in desired.iter().filter(|e| !recorded.contains(&e.name)) {
            match self
                .client
                .create_runtime_class(&entry.runtime_class(node_selector, owner.clone()))
                .await
            {
                Ok(_) => info!("Created runtime class {}", entry.name),
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e.into()),
            }
        }

        for name in recorded.iter().filter(|n| !desired.iter().any(|e| &e.name == *n)) {
            self.delete(name).await?;
        }

        Ok(desired.iter().map(|e| e.name.clone()).collect())
    }

    /// Delete every recorded class
    pub async fn delete_all(&self, recorded: &[String]) -> Result<(), ControllerError> {
        for name in recorded {
            self.delete(name).await?;
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ControllerError> {
        match self.client.delete_runtime_class(name).await {
            Ok(()) => {
                info!("Deleted runtime class {}", name);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockClusterClient;

    fn names(entries: &[RuntimeClassEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_desired_set_composition() {
        assert_eq!(names(&desired_set(false, &[])), vec!["kata"]);
        assert_eq!(names(&desired_set(true, &[])), vec!["kata", "kata-remote"]);

        let extras = [
            RuntimeClassEntry::with_default_overhead("extra1"),
            RuntimeClassEntry::new("kata", "1", "1Gi"),
        ];
        let set = desired_set(false, &extras);
        assert_eq!(names(&set), vec!["kata", "extra1"]);
        assert_eq!(set[0].memory, DEFAULT_MEMORY_OVERHEAD);
    }

    #[test]
    fn test_runtime_class_object() {
        let selector = BTreeMap::from([("node-role.kubernetes.io/kata-oc".to_string(), String::new())]);
        let rc = desired_set(true, &[])[1].runtime_class(&selector, None);
        assert_eq!(rc.handler, "kata-remote");
        let overhead = rc.overhead.unwrap().pod_fixed.unwrap();
        assert_eq!(overhead["memory"], Quantity("120Mi".to_string()));
        assert_eq!(rc.scheduling.unwrap().node_selector, Some(selector));
    }

    #[tokio::test]
    async fn test_diff_creates_missing_and_deletes_stale() {
        let client = MockClusterClient::new();
        client.add_runtime_class(RuntimeClassEntry::with_default_overhead("kata").runtime_class(&BTreeMap::new(), None));
        client.add_runtime_class(RuntimeClassEntry::with_default_overhead("kata-remote").runtime_class(&BTreeMap::new(), None));

        let recorded = vec!["kata".to_string(), "kata-remote".to_string()];
        let desired = vec![
            RuntimeClassEntry::with_default_overhead("kata"),
            RuntimeClassEntry::with_default_overhead("extra1"),
        ];

        let names = RuntimeClassHandler::new(&client)
            .reconcile(&desired, &recorded, &BTreeMap::new(), None)
            .await
            .unwrap();

        assert_eq!(names, vec!["kata".to_string(), "extra1".to_string()]);
        assert_eq!(
            client.writes(),
            vec![
                "create RuntimeClass extra1".to_string(),
                "delete RuntimeClass kata-remote".to_string(),
            ]
        );
        assert!(client.runtime_class("kata").is_some());
        assert!(client.runtime_class("kata-remote").is_none());
    }

    #[tokio::test]
    async fn test_create_tolerates_existing() {
        let client = MockClusterClient::new();
        client.add_runtime_class(RuntimeClassEntry::with_default_overhead("kata").runtime_class(&BTreeMap::new(), None));

        let names = RuntimeClassHandler::new(&client)
            .reconcile(&desired_set(false, &[]), &[], &BTreeMap::new(), None)
            .await
            .unwrap();
        assert_eq!(names, vec!["kata".to_string()]);
    }
}
