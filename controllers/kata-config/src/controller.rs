//! Main controller implementation.
//!
//! Wires the cluster client, the pod VM image builder and the event
//! publisher into a [`Reconciler`] and runs the KataConfig watcher.

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::events::KubeEventPublisher;
use crate::image::templates::FileTemplateSource;
use crate::image::ImageBuilder;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_client::KubeClusterClient;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Reporting component of published events
const CONTROLLER_NAME: &str = "kata-config-controller";

/// Main controller for KataConfig rollouts.
#[derive(Debug)]
pub struct Controller {
    kata_config_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Connect to the cluster and start watching.
    pub async fn new(config: OperatorConfig) -> Result<Self, ControllerError> {
        info!("Initializing KataConfig controller");

        let cluster = KubeClusterClient::try_default().await?;
        let kube_client = cluster.kube_client();

        let templates = Arc::new(FileTemplateSource::new(config.template_dir.clone()));
        let image_builder = ImageBuilder::detect(&cluster, &config, templates).await?;
        let events = KubeEventPublisher::new(kube_client.clone(), CONTROLLER_NAME);

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(cluster),
            Arc::new(events),
            Arc::new(image_builder),
            config,
        ));

        let watcher = Watcher::new(kube_client, reconciler);
        let kata_config_watcher = tokio::spawn(async move { watcher.watch_kata_configs().await });

        Ok(Self { kata_config_watcher })
    }

    /// Wait for the watcher to exit
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("KataConfig controller running");
        self.kata_config_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("KataConfig watcher panicked: {}", e)))?
    }
}
