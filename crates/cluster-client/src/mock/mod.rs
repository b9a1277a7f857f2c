//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of ClusterClientTrait that
//! behaves like the API server for the calls the operator makes: resource
//! versions advance on every write, stale conditional writes conflict and a
//! deleted KataConfig disappears once its last finalizer is removed.
//! Controllers owned by other operators (machine config, job controller) are
//! not simulated; tests script their effects with the setup helpers.
//!
//! The mock is organized into domain-specific modules:
//! - `kata.rs` - KataConfig reads, status and finalizer patches
//! - `nodes.rs` - Nodes and pods
//! - `machine_config.rs` - Pools, machine configs and CRI-O configs
//! - `workloads.rs` - Runtime classes, config maps, secrets, jobs and daemon sets
//! - `helpers.rs` - Builders for commonly seeded objects
//! - `selector.rs` - Label selector matching

pub mod helpers;
mod kata;
mod machine_config;
mod nodes;
pub mod selector;
mod workloads;

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{
    ContainerRuntimeConfig, KataConfig, KataConfigStatus, MachineConfig, MachineConfigPool,
    MachineConfigPoolStatus, RenderedConfiguration,
};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Secret};
use k8s_openapi::api::node::v1::RuntimeClass;
use k8s_openapi::ByteString;
use kube::Resource;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Key for namespaced objects
pub(crate) type NsName = (String, String);

fn ns_name(namespace: &str, name: &str) -> NsName {
    (namespace.to_string(), name.to_string())
}

/// Mock ClusterClient for testing
///
/// Clones share the same in-memory cluster, so a test can hand one clone to
/// the reconciler and keep another to seed objects and inspect results.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    pub(crate) kata_configs: Arc<Mutex<HashMap<String, KataConfig>>>,
    pub(crate) nodes: Arc<Mutex<HashMap<String, Node>>>,
    pub(crate) pods: Arc<Mutex<HashMap<NsName, Pod>>>,
    pub(crate) pools: Arc<Mutex<HashMap<String, MachineConfigPool>>>,
    pub(crate) machine_configs: Arc<Mutex<HashMap<String, MachineConfig>>>,
    pub(crate) container_runtime_configs: Arc<Mutex<HashMap<String, ContainerRuntimeConfig>>>,
    pub(crate) runtime_classes: Arc<Mutex<HashMap<String, RuntimeClass>>>,
    pub(crate) config_maps: Arc<Mutex<HashMap<NsName, ConfigMap>>>,
    pub(crate) secrets: Arc<Mutex<HashMap<NsName, Secret>>>,
    pub(crate) jobs: Arc<Mutex<HashMap<NsName, Job>>>,
    pub(crate) daemon_sets: Arc<Mutex<HashMap<NsName, DaemonSet>>>,
    pub(crate) platform_type: Arc<Mutex<Option<String>>>,
    // Every mutating call, as "<verb> <Kind> <name>"
    pub(crate) writes: Arc<Mutex<Vec<String>>>,
    // Counter for resource versions and uids
    pub(crate) next_version: Arc<Mutex<u64>>,
}

impl MockClusterClient {
    /// Create an empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Next resource version
    pub(crate) fn next_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    /// Stamp a fresh resource version on an object
    pub(crate) fn touch<K: Resource>(&self, obj: &mut K) {
        obj.meta_mut().resource_version = Some(self.next_version());
    }

    pub(crate) fn record(&self, verb: &str, kind: &str, name: &str) {
        self.writes
            .lock()
            .unwrap()
            .push(format!("{} {} {}", verb, kind, name));
    }

    /// Insert a new object the way the API server admits it
    pub(crate) fn admit<K: Resource + Clone>(
        &self,
        store: &Mutex<HashMap<String, K>>,
        kind: &str,
        obj: &K,
    ) -> Result<K, ClusterError> {
        let name = obj.meta().name.clone().unwrap_or_default();
        let mut store = store.lock().unwrap();
        if store.contains_key(&name) {
            return Err(ClusterError::AlreadyExists(format!("{} {}", kind, name)));
        }
        let mut created = obj.clone();
        self.touch(&mut created);
        created.meta_mut().uid = Some(format!("uid-{}", self.next_version()));
        created.meta_mut().generation = Some(1);
        store.insert(name.clone(), created.clone());
        drop(store);
        self.record("create", kind, &name);
        Ok(created)
    }

    pub(crate) fn remove<K>(
        &self,
        store: &Mutex<HashMap<String, K>>,
        kind: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        if store.lock().unwrap().remove(name).is_none() {
            return Err(ClusterError::NotFound(format!("{} {}", kind, name)));
        }
        self.record("delete", kind, name);
        Ok(())
    }

    pub(crate) fn admit_namespaced<K: Resource + Clone>(
        &self,
        store: &Mutex<HashMap<NsName, K>>,
        kind: &str,
        namespace: &str,
        obj: &K,
    ) -> Result<K, ClusterError> {
        let name = obj.meta().name.clone().unwrap_or_default();
        let key = ns_name(namespace, &name);
        let mut store = store.lock().unwrap();
        if store.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(format!("{} {}/{}", kind, namespace, name)));
        }
        let mut created = obj.clone();
        created.meta_mut().namespace = Some(namespace.to_string());
        self.touch(&mut created);
        created.meta_mut().uid = Some(format!("uid-{}", self.next_version()));
        store.insert(key, created.clone());
        drop(store);
        self.record("create", kind, &format!("{}/{}", namespace, name));
        Ok(created)
    }

    pub(crate) fn remove_namespaced<K>(
        &self,
        store: &Mutex<HashMap<NsName, K>>,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        if store.lock().unwrap().remove(&ns_name(namespace, name)).is_none() {
            return Err(ClusterError::NotFound(format!("{} {}/{}", kind, namespace, name)));
        }
        self.record("delete", kind, &format!("{}/{}", namespace, name));
        Ok(())
    }

    // ---- Recorded writes ----

    /// Every mutating call made so far, in order
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// Mutating calls whose description starts with `prefix` (e.g. "create MachineConfig")
    pub fn writes_matching(&self, prefix: &str) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter(|w| w.starts_with(prefix))
            .collect()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    // ---- KataConfig setup ----

    /// Add a KataConfig (for test setup)
    pub fn add_kata_config(&self, mut kata_config: KataConfig) {
        self.touch(&mut kata_config);
        if kata_config.metadata.uid.is_none() {
            kata_config.metadata.uid = Some(format!("uid-{}", self.next_version()));
        }
        let name = kata_config.metadata.name.clone().unwrap_or_default();
        self.kata_configs.lock().unwrap().insert(name, kata_config);
    }

    /// Current state of a KataConfig
    pub fn kata_config(&self, name: &str) -> Option<KataConfig> {
        self.kata_configs.lock().unwrap().get(name).cloned()
    }

    /// Request deletion: sets the deletion timestamp, or removes the object
    /// right away when no finalizer holds it
    pub fn mark_kata_config_deleting(&self, name: &str) {
        let mut store = self.kata_configs.lock().unwrap();
        let holds = store
            .get(name)
            .is_some_and(|kc| kc.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()));
        if !holds {
            store.remove(name);
            return;
        }
        if let Some(kc) = store.get_mut(name) {
            kc.metadata.deletion_timestamp =
                serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).ok();
            kc.metadata.resource_version = Some(self.next_version());
        }
    }

    /// Simulate a write by another client, invalidating resource versions read before it
    pub fn touch_kata_config(&self, name: &str) {
        let mut store = self.kata_configs.lock().unwrap();
        if let Some(kc) = store.get_mut(name) {
            kc.metadata.resource_version = Some(self.next_version());
        }
    }

    // ---- Node and pod setup ----

    /// Add a node (for test setup)
    pub fn add_node(&self, mut node: Node) {
        self.touch(&mut node);
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.lock().unwrap().insert(name, node);
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.nodes.lock().unwrap().get(name).cloned()
    }

    /// Replace a node's annotations, as the machine config daemon does while it works
    pub fn set_node_annotations(&self, name: &str, annotations: BTreeMap<String, String>) {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(node) = nodes.get_mut(name) {
            node.metadata.annotations = Some(annotations);
            node.metadata.resource_version = Some(self.next_version());
        }
    }

    /// Add a pod (for test setup)
    pub fn add_pod(&self, pod: Pod) {
        let key = ns_name(
            pod.metadata.namespace.as_deref().unwrap_or("default"),
            pod.metadata.name.as_deref().unwrap_or_default(),
        );
        self.pods.lock().unwrap().insert(key, pod);
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.pods.lock().unwrap().remove(&ns_name(namespace, name));
    }

    // ---- Machine configuration setup ----

    /// Add a pool (for test setup). Keeps the given generation, defaulting to 1.
    pub fn add_machine_config_pool(&self, mut pool: MachineConfigPool) {
        self.touch(&mut pool);
        pool.metadata.generation.get_or_insert(1);
        let name = pool.metadata.name.clone().unwrap_or_default();
        self.pools.lock().unwrap().insert(name, pool);
    }

    pub fn machine_config_pool(&self, name: &str) -> Option<MachineConfigPool> {
        self.pools.lock().unwrap().get(name).cloned()
    }

    /// Bump a pool's generation, as a spec change by the machine config operator would
    pub fn bump_pool_generation(&self, name: &str) {
        let mut pools = self.pools.lock().unwrap();
        if let Some(pool) = pools.get_mut(name) {
            pool.metadata.generation = Some(pool.metadata.generation.unwrap_or_default() + 1);
            pool.metadata.resource_version = Some(self.next_version());
        }
    }

    pub fn set_pool_status(&self, name: &str, status: MachineConfigPoolStatus) {
        let mut pools = self.pools.lock().unwrap();
        if let Some(pool) = pools.get_mut(name) {
            pool.status = Some(status);
            pool.metadata.resource_version = Some(self.next_version());
        }
    }

    pub fn set_pool_configuration(&self, name: &str, configuration: RenderedConfiguration) {
        let mut pools = self.pools.lock().unwrap();
        if let Some(pool) = pools.get_mut(name) {
            pool.spec.configuration = Some(configuration);
            pool.metadata.resource_version = Some(self.next_version());
        }
    }

    /// Add a machine config (for test setup)
    pub fn add_machine_config(&self, mut config: MachineConfig) {
        self.touch(&mut config);
        let name = config.metadata.name.clone().unwrap_or_default();
        self.machine_configs.lock().unwrap().insert(name, config);
    }

    pub fn machine_config(&self, name: &str) -> Option<MachineConfig> {
        self.machine_configs.lock().unwrap().get(name).cloned()
    }

    pub fn container_runtime_config(&self, name: &str) -> Option<ContainerRuntimeConfig> {
        self.container_runtime_configs.lock().unwrap().get(name).cloned()
    }

    // ---- Workload setup ----

    pub fn add_runtime_class(&self, mut runtime_class: RuntimeClass) {
        self.touch(&mut runtime_class);
        let name = runtime_class.metadata.name.clone().unwrap_or_default();
        self.runtime_classes.lock().unwrap().insert(name, runtime_class);
    }

    pub fn runtime_class(&self, name: &str) -> Option<RuntimeClass> {
        self.runtime_classes.lock().unwrap().get(name).cloned()
    }

    /// Add a config map holding the given string data (for test setup)
    pub fn add_config_map(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let mut config_map = ConfigMap {
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        };
        config_map.metadata.name = Some(name.to_string());
        config_map.metadata.namespace = Some(namespace.to_string());
        self.touch(&mut config_map);
        self.config_maps
            .lock()
            .unwrap()
            .insert(ns_name(namespace, name), config_map);
    }

    /// Add a secret holding the given data (for test setup)
    pub fn add_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let mut secret = Secret {
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        };
        secret.metadata.name = Some(name.to_string());
        secret.metadata.namespace = Some(namespace.to_string());
        self.touch(&mut secret);
        self.secrets
            .lock()
            .unwrap()
            .insert(ns_name(namespace, name), secret);
    }

    pub fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(&ns_name(namespace, name)).cloned()
    }

    /// Set a job's status, as the job controller would
    pub fn set_job_status(&self, namespace: &str, name: &str, status: JobStatus) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&ns_name(namespace, name)) {
            job.status = Some(status);
            job.metadata.resource_version = Some(self.next_version());
        }
    }

    pub fn daemon_set(&self, namespace: &str, name: &str) -> Option<DaemonSet> {
        self.daemon_sets
            .lock()
            .unwrap()
            .get(&ns_name(namespace, name))
            .cloned()
    }

    pub fn set_platform_type(&self, platform: Option<&str>) {
        *self.platform_type.lock().unwrap() = platform.map(str::to_string);
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    // KataConfig - delegated to kata module
    async fn get_kata_config(&self, name: &str) -> Result<Option<KataConfig>, ClusterError> {
        kata::get_kata_config(self, name).await
    }

    async fn patch_kata_config_status(&self, name: &str, resource_version: Option<&str>, status: &KataConfigStatus) -> Result<KataConfig, ClusterError> {
        kata::patch_kata_config_status(self, name, resource_version, status).await
    }

    async fn patch_kata_config_finalizers(&self, name: &str, resource_version: Option<&str>, finalizers: &[String]) -> Result<KataConfig, ClusterError> {
        kata::patch_kata_config_finalizers(self, name, resource_version, finalizers).await
    }

    // Nodes and pods - delegated to nodes module
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ClusterError> {
        nodes::list_nodes(self, label_selector).await
    }

    async fn set_node_label(&self, node: &str, key: &str, value: Option<&str>) -> Result<(), ClusterError> {
        nodes::set_node_label(self, node, key, value).await
    }

    async fn list_pods(&self) -> Result<Vec<Pod>, ClusterError> {
        nodes::list_pods(self).await
    }

    // Machine configuration - delegated to machine_config module
    async fn get_machine_config_pool(&self, name: &str) -> Result<Option<MachineConfigPool>, ClusterError> {
        machine_config::get_machine_config_pool(self, name).await
    }

    async fn create_machine_config_pool(&self, pool: &MachineConfigPool) -> Result<MachineConfigPool, ClusterError> {
        machine_config::create_machine_config_pool(self, pool).await
    }

    async fn delete_machine_config_pool(&self, name: &str) -> Result<(), ClusterError> {
        machine_config::delete_machine_config_pool(self, name).await
    }

    async fn get_machine_config(&self, name: &str) -> Result<Option<MachineConfig>, ClusterError> {
        machine_config::get_machine_config(self, name).await
    }

    async fn create_machine_config(&self, config: &MachineConfig) -> Result<MachineConfig, ClusterError> {
        machine_config::create_machine_config(self, config).await
    }

    async fn delete_machine_config(&self, name: &str) -> Result<(), ClusterError> {
        machine_config::delete_machine_config(self, name).await
    }

    async fn get_container_runtime_config(&self, name: &str) -> Result<Option<ContainerRuntimeConfig>, ClusterError> {
        machine_config::get_container_runtime_config(self, name).await
    }

    async fn create_container_runtime_config(&self, config: &ContainerRuntimeConfig) -> Result<ContainerRuntimeConfig, ClusterError> {
        machine_config::create_container_runtime_config(self, config).await
    }

    async fn delete_container_runtime_config(&self, name: &str) -> Result<(), ClusterError> {
        machine_config::delete_container_runtime_config(self, name).await
    }

    // Runtime classes and namespaced objects - delegated to workloads module
    async fn create_runtime_class(&self, runtime_class: &RuntimeClass) -> Result<RuntimeClass, ClusterError> {
        workloads::create_runtime_class(self, runtime_class).await
    }

    async fn delete_runtime_class(&self, name: &str) -> Result<(), ClusterError> {
        workloads::delete_runtime_class(self, name).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, ClusterError> {
        workloads::get_config_map(self, namespace, name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ClusterError> {
        workloads::get_secret(self, namespace, name).await
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError> {
        workloads::get_job(self, namespace, name).await
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ClusterError> {
        workloads::create_job(self, namespace, job).await
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        workloads::delete_job(self, namespace, name).await
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>, ClusterError> {
        workloads::get_daemon_set(self, namespace, name).await
    }

    async fn create_daemon_set(&self, namespace: &str, daemon_set: &DaemonSet) -> Result<DaemonSet, ClusterError> {
        workloads::create_daemon_set(self, namespace, daemon_set).await
    }

    async fn delete_daemon_set(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        workloads::delete_daemon_set(self, namespace, name).await
    }

    async fn get_platform_type(&self) -> Result<Option<String>, ClusterError> {
        Ok(self.platform_type.lock().unwrap().clone())
    }
}
