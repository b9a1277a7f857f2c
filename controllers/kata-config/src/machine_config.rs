//! Node configuration objects
//!
//! The runtime reaches the nodes through exactly one machine config, either
//! as an OS extension or as a layered OS image. Each strategy has its own
//! fixed name, so the handler can tell when the other one is already in place.
//! The optional CRI-O log level rides along as a ContainerRuntimeConfig.

use crate::error::ControllerError;
use cluster_client::ClusterClientTrait;
use crds::well_known::{MACHINE_CONFIG_ROLE_LABEL, MANAGED_BY_LABEL, MANAGED_BY_VALUE, POOL_SELECTOR_LABEL_PREFIX};
use crds::{
    ContainerRuntimeConfig, ContainerRuntimeConfigSpec, MachineConfig, MachineConfigSpec,
    RuntimeSettings,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const EXTENSION_MACHINE_CONFIG: &str = "50-enable-sandboxed-containers-extension";
pub const IMAGE_MACHINE_CONFIG: &str = "50-enable-sandboxed-containers-image";
pub const SANDBOXED_CONTAINERS_EXTENSION: &str = "sandboxed-containers";
pub const LOG_LEVEL_CONFIG: &str = "kata-crio-log-level";
const DEFAULT_LOG_LEVEL: &str = "info";

/// How the runtime is delivered to the nodes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MachineConfigStrategy {
    #[default]
    Extension,
    LayeredImage {
        os_image_url: String,
        kernel_arguments: Vec<String>,
    },
}

impl MachineConfigStrategy {
    /// Name of the machine config this strategy owns
    pub fn config_name(&self) -> &'static str {
        match self {
            Self::Extension => EXTENSION_MACHINE_CONFIG,
            Self::LayeredImage { .. } => IMAGE_MACHINE_CONFIG,
        }
    }

    /// Name owned by the other strategy
    pub fn other_config_name(&self) -> &'static str {
        match self {
            Self::Extension => IMAGE_MACHINE_CONFIG,
            Self::LayeredImage { .. } => EXTENSION_MACHINE_CONFIG,
        }
    }

    /// Machine config rendering this strategy into `pool`
    pub fn machine_config(&self, pool: &str, owner: Option<OwnerReference>) -> MachineConfig {
        let spec = match self {
            Self::Extension => MachineConfigSpec {
                extensions: vec![SANDBOXED_CONTAINERS_EXTENSION.to_string()],
                ..Default::default()
            },
            Self::LayeredImage { os_image_url, kernel_arguments } => MachineConfigSpec {
                os_image_url: Some(os_image_url.clone()),
                kernel_arguments: kernel_arguments.clone(),
                ..Default::default()
            },
        };

        let mut config = MachineConfig::new(self.config_name(), spec);
        config.metadata.labels = Some(BTreeMap::from([
            (MACHINE_CONFIG_ROLE_LABEL.to_string(), pool.to_string()),
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        ]));
        config.metadata.owner_references = owner.map(|o| vec![o]);
        config
    }
}

/// Creates and deletes the machine config and the CRI-O log level config
pub struct MachineConfigHandler<'a> {
    client: &'a dyn ClusterClientTrait,
}

impl<'a> MachineConfigHandler<'a> {
    pub fn new(client: &'a dyn ClusterClientTrait) -> Self {
        Self { client }
    }

    /// Name of whichever strategy's machine config currently exists
    pub async fn existing(&self) -> Result<Option<String>, ControllerError> {
        for name in [EXTENSION_MACHINE_CONFIG, IMAGE_MACHINE_CONFIG] {
            if self.client.get_machine_config(name).await?.is_some() {
                return Ok(Some(name.to_string()));
            }
        }
        Ok(None)
    }

    /// Create the machine config for `strategy` unless one already exists.
    ///
    /// An existing config of the other strategy counts as configured.
    /// Returns whether a config was created.
    pub async fn ensure_config(
        &self,
        strategy: &MachineConfigStrategy,
        pool: &str,
        owner: Option<OwnerReference>,
    ) -> Result<bool, ControllerError> {
        if self.client.get_machine_config(strategy.config_name()).await?.is_some() {
            debug!("Machine config {} already exists", strategy.config_name());
            return Ok(false);
        }
        if self.client.get_machine_config(strategy.other_config_name()).await?.is_some() {
            info!(
                "Machine config {} already configures the pool; delete it to switch strategy",
                strategy.other_config_name()
            );
            return Ok(false);
        }

        match self.client.create_machine_config(&strategy.machine_config(pool, owner)).await {
            Ok(_) => {
                info!("Created machine config {} for pool {}", strategy.config_name(), pool);
                Ok(true)
            }
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a machine config; a missing one counts as deleted
    pub async fn delete_config(&self, name: &str) -> Result<(), ControllerError> {
        match self.client.delete_machine_config(name).await {
            Ok(()) => {
                info!("Deleted machine config {}", name);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Keep the CRI-O log level config in line with the requested level.
    ///
    /// It exists only for a level other than the default one.
    pub async fn ensure_log_level(
        &self,
        log_level: Option<&str>,
        pool: &str,
        owner: Option<OwnerReference>,
    ) -> Result<(), ControllerError> {
        let wanted = log_level.filter(|l| !l.is_empty() && *l != DEFAULT_LOG_LEVEL);
        let existing = self.client.get_container_runtime_config(LOG_LEVEL_CONFIG).await?;

        match (wanted, existing) {
            (Some(level), Some(current)) => {
                if current.spec.container_runtime_config.log_level.as_deref() != Some(level) {
                    // Recreated on the next reconcile
                    info!("CRI-O log level changed to {}", level);
                    self.delete_log_level().await?;
                }
                Ok(())
            }
            (Some(level), None) => {
                let config = log_level_config(level, pool, owner);
                match self.client.create_container_runtime_config(&config).await {
                    Ok(_) => {
                        info!("Set CRI-O log level {} on pool {}", level, pool);
                        Ok(())
                    }
                    Err(e) if e.is_already_exists() => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            (None, Some(_)) => self.delete_log_level().await,
            (None, None) => Ok(()),
        }
    }

    pub async fn delete_log_level(&self) -> Result<(), ControllerError> {
        match self.client.delete_container_runtime_config(LOG_LEVEL_CONFIG).await {
            Ok(()) | Err(cluster_client::ClusterError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn log_level_config(level: &str, pool: &str, owner: Option<OwnerReference>) -> ContainerRuntimeConfig {
    let mut config = ContainerRuntimeConfig::new(
        LOG_LEVEL_CONFIG,
        ContainerRuntimeConfigSpec {
            machine_config_pool_selector: Some(LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    format!("{}{}", POOL_SELECTOR_LABEL_PREFIX, pool),
                    String::new(),
                )])),
                ..Default::default()
            }),
            container_runtime_config: RuntimeSettings {
                log_level: Some(level.to_string()),
            },
        },
    );
    config.metadata = ObjectMeta {
        name: Some(LOG_LEVEL_CONFIG.to_string()),
        labels: Some(BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])),
        owner_references: owner.map(|o| vec![o]),
        ..Default::default()
    };
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::MockClusterClient;

    fn layered() -> MachineConfigStrategy {
        MachineConfigStrategy::LayeredImage {
            os_image_url: "quay.io/example/os:1".to_string(),
            kernel_arguments: vec!["kvm.nested=1".to_string()],
        }
    }

    #[test]
    fn test_strategy_content() {
        let mc = MachineConfigStrategy::Extension.machine_config("kata-oc", None);
        assert_eq!(mc.metadata.name.as_deref(), Some(EXTENSION_MACHINE_CONFIG));
        assert_eq!(mc.spec.extensions, vec![SANDBOXED_CONTAINERS_EXTENSION.to_string()]);
        assert_eq!(
            mc.metadata.labels.unwrap().get(MACHINE_CONFIG_ROLE_LABEL).map(String::as_str),
            Some("kata-oc")
        );

        let mc = layered().machine_config("worker", None);
        assert_eq!(mc.metadata.name.as_deref(), Some(IMAGE_MACHINE_CONFIG));
        assert_eq!(mc.spec.os_image_url.as_deref(), Some("quay.io/example/os:1"));
        assert!(mc.spec.extensions.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let client = MockClusterClient::new();
        let handler = MachineConfigHandler::new(&client);

        assert!(handler.ensure_config(&MachineConfigStrategy::Extension, "kata-oc", None).await.unwrap());
        assert!(!handler.ensure_config(&MachineConfigStrategy::Extension, "kata-oc", None).await.unwrap());
        assert_eq!(client.writes_matching("create MachineConfig").len(), 1);
    }

    #[tokio::test]
    async fn test_other_strategy_counts_as_configured() {
        let client = MockClusterClient::new();
        client.add_machine_config(MachineConfigStrategy::Extension.machine_config("kata-oc", None));
        let handler = MachineConfigHandler::new(&client);

        assert!(!handler.ensure_config(&layered(), "kata-oc", None).await.unwrap());
        assert!(client.machine_config(IMAGE_MACHINE_CONFIG).is_none());
        assert_eq!(handler.existing().await.unwrap().as_deref(), Some(EXTENSION_MACHINE_CONFIG));
    }

    #[tokio::test]
    async fn test_delete_missing_is_success() {
        let client = MockClusterClient::new();
        MachineConfigHandler::new(&client).delete_config(IMAGE_MACHINE_CONFIG).await.unwrap();
    }

    #[tokio::test]
    async fn test_log_level_only_for_non_default() {
        let client = MockClusterClient::new();
        let handler = MachineConfigHandler::new(&client);

        handler.ensure_log_level(Some("info"), "kata-oc", None).await.unwrap();
        assert!(client.container_runtime_config(LOG_LEVEL_CONFIG).is_none());

        handler.ensure_log_level(Some("debug"), "kata-oc", None).await.unwrap();
        let config = client.container_runtime_config(LOG_LEVEL_CONFIG).unwrap();
        assert_eq!(config.spec.container_runtime_config.log_level.as_deref(), Some("debug"));

        handler.ensure_log_level(None, "kata-oc", None).await.unwrap();
        assert!(client.container_runtime_config(LOG_LEVEL_CONFIG).is_none());
    }
}
