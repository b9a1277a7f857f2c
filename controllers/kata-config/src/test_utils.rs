//! Test utilities for unit testing the reconciler
//!
//! Builders for KataConfigs and image settings plus a [`Harness`] wiring a
//! reconciler to an in-memory cluster and a recording event publisher.

use crate::config::{OperatorConfig, DEFAULT_NAMESPACE};
use crate::events::RecordingEventPublisher;
use crate::image::job::ImageOperation;
use crate::image::templates::StaticTemplateSource;
use crate::image::{CloudProvider, ImageBuilder};
use crate::machine_config::EXTENSION_MACHINE_CONFIG;
use crate::reconciler::{Outcome, Reconciler};
use cluster_client::mock::helpers::{node, node_state_annotations};
use cluster_client::MockClusterClient;
use crds::well_known::{DEDICATED_POOL, MACHINE_CONFIG_ROLE_LABEL, WORKER_POOL, WORKER_ROLE_LABEL};
use crds::{
    ConfigSource, KataConfig, KataConfigSpec, KataConfigStatus, MachineConfigPool, MachineConfigPoolSpec,
    MachineConfigPoolStatus, RenderedConfiguration,
};
use k8s_openapi::api::core::v1::ObjectReference;
use std::sync::Arc;
use std::time::Duration;

pub const NAMESPACE: &str = DEFAULT_NAMESPACE;
pub const KATA_CONFIG_NAME: &str = "example-kataconfig";
/// Rendered configuration of the dedicated pool once the runtime is in
pub const RENDERED_CONFIG: &str = "rendered-kata-oc-2";

const JOB_TEMPLATE: &str = r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: placeholder
spec:
  backoffLimit: 1
  template:
    spec:
      restartPolicy: Never
      containers:
        - name: podvm-builder
          image: quay.io/example/podvm-builder:latest
          envFrom:
            - configMapRef:
                name: peer-pods-cm
"#;

/// AWS create and delete templates
pub fn templates() -> StaticTemplateSource {
    StaticTemplateSource::default()
        .with("aws", ImageOperation::Create, JOB_TEMPLATE)
        .with("aws", ImageOperation::Delete, JOB_TEMPLATE)
}

pub fn image_builder() -> ImageBuilder {
    ImageBuilder {
        provider: CloudProvider::Aws,
        fips: false,
        namespace: NAMESPACE.to_string(),
        builder_image: None,
        templates: Arc::new(templates()),
    }
}

pub fn owner_ref() -> ObjectReference {
    ObjectReference {
        api_version: Some("kataconfiguration.openshift.io/v1".to_string()),
        kind: Some("KataConfig".to_string()),
        name: Some(KATA_CONFIG_NAME.to_string()),
        ..Default::default()
    }
}

pub fn kata_config(spec: KataConfigSpec) -> KataConfig {
    KataConfig::new(KATA_CONFIG_NAME, spec)
}

/// Configuration without blocking waits
pub fn test_config() -> OperatorConfig {
    OperatorConfig {
        pool_resync_wait: Duration::ZERO,
        ..Default::default()
    }
}

pub fn pool_status(observed: i64, machines: i32, updated: i32) -> MachineConfigPoolStatus {
    MachineConfigPoolStatus {
        observed_generation: observed,
        machine_count: machines,
        updated_machine_count: updated,
        ready_machine_count: updated,
        ..Default::default()
    }
}

/// Reconciler over a mock cluster
pub struct Harness {
    pub client: MockClusterClient,
    pub events: Arc<RecordingEventPublisher>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let client = MockClusterClient::new();
        let events = Arc::new(RecordingEventPublisher::default());
        let reconciler = Reconciler::new(
            Arc::new(client.clone()),
            events.clone(),
            Arc::new(image_builder()),
            test_config(),
        );
        Self {
            client,
            events,
            reconciler,
        }
    }

    /// A cluster with the given worker nodes, their worker pool and a KataConfig
    pub fn with_workers(names: &[&str], spec: KataConfigSpec) -> Self {
        let harness = Self::new();
        for name in names {
            harness.client.add_node(node(name, &[(WORKER_ROLE_LABEL, "")]));
        }
        let mut worker = MachineConfigPool::new(WORKER_POOL, MachineConfigPoolSpec::default());
        let count = i32::try_from(names.len()).unwrap();
        worker.status = Some(pool_status(1, count, count));
        harness.client.add_machine_config_pool(worker);
        harness.client.add_kata_config(kata_config(spec));
        harness
    }

    pub async fn reconcile(&self) -> Outcome {
        self.reconciler.reconcile_outcome(KATA_CONFIG_NAME).await.unwrap()
    }

    pub fn kata_config(&self) -> Option<KataConfig> {
        self.client.kata_config(KATA_CONFIG_NAME)
    }

    pub fn status(&self) -> KataConfigStatus {
        self.kata_config().and_then(|kc| kc.status).unwrap_or_default()
    }

    /// Let the pool report `machines` nodes, none of them updated yet
    pub fn pool_picks_up_nodes(&self, pool: &str, machines: i32) {
        let generation = self.client.machine_config_pool(pool).unwrap().generation();
        self.client
            .set_pool_status(pool, pool_status(generation, machines, 0));
    }

    /// What the machine config operator does once it sees a new machine config:
    /// render it into the pool and bump the generation
    pub fn pool_renders(&self, pool: &str, rendered: &str, sources: &[&str]) {
        self.client.set_pool_configuration(
            pool,
            RenderedConfiguration {
                name: rendered.to_string(),
                source: sources
                    .iter()
                    .map(|s| ConfigSource { name: s.to_string() })
                    .collect(),
            },
        );
        self.client.bump_pool_generation(pool);
    }

    /// Report the pool's current generation as observed with `updated` of `machines` nodes done
    pub fn pool_progress(&self, pool: &str, machines: i32, updated: i32) {
        let generation = self.client.machine_config_pool(pool).unwrap().generation();
        self.client
            .set_pool_status(pool, pool_status(generation, machines, updated));
    }

    pub fn node_state(&self, name: &str, state: &str, current: &str, desired: &str) {
        self.client
            .set_node_annotations(name, node_state_annotations(state, current, desired, None));
    }

    /// Drive a dedicated-pool rollout until every node reports the rendered configuration
    pub async fn roll_out(&self, nodes: &[&str]) {
        let count = i32::try_from(nodes.len()).unwrap();
        assert_eq!(self.reconcile().await, Outcome::Requeue);
        self.pool_picks_up_nodes(DEDICATED_POOL, count);
        assert_eq!(self.reconcile().await, Outcome::Requeue);
        self.pool_renders(DEDICATED_POOL, RENDERED_CONFIG, &[EXTENSION_MACHINE_CONFIG]);
        for name in nodes {
            self.node_state(name, "Done", RENDERED_CONFIG, RENDERED_CONFIG);
        }
        self.pool_progress(DEDICATED_POOL, count, count);
    }

    /// Machine config role label of a created machine config
    pub fn machine_config_role(&self, name: &str) -> Option<String> {
        self.client
            .machine_config(name)
            .and_then(|mc| mc.metadata.labels)
            .and_then(|l| l.get(MACHINE_CONFIG_ROLE_LABEL).cloned())
    }
}
