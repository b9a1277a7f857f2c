//! kube-rs backed implementation of [`ClusterClientTrait`]

use crate::error::ClusterError;
use crate::cluster_trait::ClusterClientTrait;
use crds::{
    ContainerRuntimeConfig, KataConfig, KataConfigStatus, MachineConfig, MachineConfigPool,
};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod, Secret};
use k8s_openapi::api::node::v1::RuntimeClass;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch,
    PatchParams, PostParams,
};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Field manager recorded on every write
const FIELD_MANAGER: &str = "kata-operator";

/// Kubernetes client used by the operator in production
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Create a client from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self, ClusterError> {
        Ok(Self::new(Client::try_default().await?))
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Underlying kube client, for watchers and event recorders
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    fn cluster_api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::ClusterResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }

    fn namespaced_api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, ClusterError>
where
    K: Clone + DeserializeOwned + Debug,
{
    api.get_opt(name)
        .await
        .map_err(|e| ClusterError::from_kube(e, name))
}

async fn create<K>(api: &Api<K>, obj: &K) -> Result<K, ClusterError>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = obj.meta().name.clone().unwrap_or_default();
    debug!("Creating {}", name);
    api.create(&PostParams::default(), obj)
        .await
        .map_err(|e| ClusterError::from_kube(e, &name))
}

async fn delete<K>(api: &Api<K>, name: &str, dp: &DeleteParams) -> Result<(), ClusterError>
where
    K: Clone + DeserializeOwned + Debug,
{
    debug!("Deleting {}", name);
    api.delete(name, dp)
        .await
        .map(|_| ())
        .map_err(|e| ClusterError::from_kube(e, name))
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_kata_config(&self, name: &str) -> Result<Option<KataConfig>, ClusterError> {
        get_opt(&self.cluster_api::<KataConfig>(), name).await
    }

    async fn patch_kata_config_status(
        &self,
        name: &str,
        resource_version: Option<&str>,
        status: &KataConfigStatus,
    ) -> Result<KataConfig, ClusterError> {
        // resourceVersion in a merge patch turns it into a conditional write
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": resource_version },
            "status": serde_json::to_value(status)?,
        });
        self.cluster_api::<KataConfig>()
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClusterError::from_kube(e, name))
    }

    async fn patch_kata_config_finalizers(
        &self,
        name: &str,
        resource_version: Option<&str>,
        finalizers: &[String],
    ) -> Result<KataConfig, ClusterError> {
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": resource_version,
                "finalizers": finalizers,
            }
        });
        self.cluster_api::<KataConfig>()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClusterError::from_kube(e, name))
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ClusterError> {
        let lp = ListParams::default().labels(label_selector);
        let nodes = self.cluster_api::<Node>().list(&lp).await?;
        Ok(nodes.items)
    }

    async fn set_node_label(&self, node: &str, key: &str, value: Option<&str>) -> Result<(), ClusterError> {
        // A null value in a merge patch removes the label
        let patch = serde_json::json!({
            "metadata": { "labels": { key: value } }
        });
        self.cluster_api::<Node>()
            .patch(node, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(e, node))
    }

    async fn list_pods(&self) -> Result<Vec<Pod>, ClusterError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        Ok(pods.list(&ListParams::default()).await?.items)
    }

    async fn get_machine_config_pool(&self, name: &str) -> Result<Option<MachineConfigPool>, ClusterError> {
        get_opt(&self.cluster_api::<MachineConfigPool>(), name).await
    }

    async fn create_machine_config_pool(&self, pool: &MachineConfigPool) -> Result<MachineConfigPool, ClusterError> {
        create(&self.cluster_api::<MachineConfigPool>(), pool).await
    }

    async fn delete_machine_config_pool(&self, name: &str) -> Result<(), ClusterError> {
        delete(&self.cluster_api::<MachineConfigPool>(), name, &DeleteParams::default()).await
    }

    async fn get_machine_config(&self, name: &str) -> Result<Option<MachineConfig>, ClusterError> {
        get_opt(&self.cluster_api::<MachineConfig>(), name).await
    }

    async fn create_machine_config(&self, config: &MachineConfig) -> Result<MachineConfig, ClusterError> {
        create(&self.cluster_api::<MachineConfig>(), config).await
    }

    async fn delete_machine_config(&self, name: &str) -> Result<(), ClusterError> {
        delete(&self.cluster_api::<MachineConfig>(), name, &DeleteParams::default()).await
    }

    async fn get_container_runtime_config(&self, name: &str) -> Result<Option<ContainerRuntimeConfig>, ClusterError> {
        get_opt(&self.cluster_api::<ContainerRuntimeConfig>(), name).await
    }

    async fn create_container_runtime_config(&self, config: &ContainerRuntimeConfig) -> Result<ContainerRuntimeConfig, ClusterError> {
        create(&self.cluster_api::<ContainerRuntimeConfig>(), config).await
    }

    async fn delete_container_runtime_config(&self, name: &str) -> Result<(), ClusterError> {
        delete(&self.cluster_api::<ContainerRuntimeConfig>(), name, &DeleteParams::default()).await
    }

    async fn create_runtime_class(&self, runtime_class: &RuntimeClass) -> Result<RuntimeClass, ClusterError> {
        create(&self.cluster_api::<RuntimeClass>(), runtime_class).await
    }

    async fn delete_runtime_class(&self, name: &str) -> Result<(), ClusterError> {
        delete(&self.cluster_api::<RuntimeClass>(), name, &DeleteParams::default()).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, ClusterError> {
        get_opt(&self.namespaced_api::<ConfigMap>(namespace), name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ClusterError> {
        get_opt(&self.namespaced_api::<Secret>(namespace), name).await
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ClusterError> {
        get_opt(&self.namespaced_api::<Job>(namespace), name).await
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ClusterError> {
        create(&self.namespaced_api::<Job>(namespace), job).await
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete(&self.namespaced_api::<Job>(namespace), name, &DeleteParams::background()).await
    }

    async fn get_daemon_set(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>, ClusterError> {
        get_opt(&self.namespaced_api::<DaemonSet>(namespace), name).await
    }

    async fn create_daemon_set(&self, namespace: &str, daemon_set: &DaemonSet) -> Result<DaemonSet, ClusterError> {
        create(&self.namespaced_api::<DaemonSet>(namespace), daemon_set).await
    }

    async fn delete_daemon_set(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete(&self.namespaced_api::<DaemonSet>(namespace), name, &DeleteParams::default()).await
    }

    async fn get_platform_type(&self) -> Result<Option<String>, ClusterError> {
        let gvk = GroupVersionKind::gvk("config.openshift.io", "v1", "Infrastructure");
        let resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);

        let infrastructure = match api.get_opt("cluster").await {
            Ok(obj) => obj,
            // Not an OpenShift cluster: the Infrastructure kind is not served
            Err(kube::Error::Api(ae)) if ae.code == 404 => None,
            Err(e) => return Err(ClusterError::Kube(e)),
        };

        Ok(infrastructure.and_then(|obj| {
            obj.data
                .pointer("/status/platformStatus/type")
                .or_else(|| obj.data.pointer("/status/platform"))
                .and_then(|v| v.as_str())
                .map(str::to_lowercase)
        }))
    }
}
