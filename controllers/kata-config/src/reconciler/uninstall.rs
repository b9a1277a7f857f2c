//! Teardown behind the KataConfig finalizer

use super::{classify_nodes, Outcome, ReconcileContext, Reconciler};
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::image::job::{ImageJobOrchestrator, ImagePhase};
use crate::machine_config::{MachineConfigHandler, EXTENSION_MACHINE_CONFIG, IMAGE_MACHINE_CONFIG};
use crate::monitor::delete_monitor;
use crate::pool::{delete_dedicated_pool, select_pool, unlabel_nodes, PoolChoice};
use crate::runtime_class::{RuntimeClassHandler, DEFAULT_RUNTIME_CLASS};
use crate::selector::node_query;
use crate::status::StatusDelta;
use crds::well_known::{DEDICATED_POOL_ROLE_LABEL, KATA_CONFIG_FINALIZER};
use crds::{KataConfig, MachineConfigPool};
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

impl Reconciler {
    pub(crate) async fn uninstall(
        &self,
        kata_config: &KataConfig,
        ctx: &mut ReconcileContext,
    ) -> Result<Outcome, ControllerError> {
        if !kata_config.has_finalizer(KATA_CONFIG_FINALIZER) {
            return Ok(Outcome::AwaitChange);
        }
        let client = self.client.as_ref();
        let recorded = ctx.status.snapshot().runtime_classes.clone();

        let blocking = self.pods_using_runtime(&recorded).await?;
        if !blocking.is_empty() {
            let message = format!(
                "Existing pods using the sandboxed runtime must be deleted first: {}",
                blocking.join(", ")
            );
            if ctx.status.snapshot().uninstallation_status.error_message.as_deref() != Some(message.as_str()) {
                warn!("KataConfig {}: {}", ctx.name, message);
                self.events
                    .publish(
                        &ctx.object_ref,
                        EventType::Warning,
                        reasons::UNINSTALL_BLOCKED,
                        actions::UNINSTALL,
                        Some(message.clone()),
                    )
                    .await;
            }
            ctx.status.push(StatusDelta::UninstallError(Some(message)));
            return Ok(Outcome::Requeue);
        }
        ctx.status.push(StatusDelta::UninstallError(None));

        delete_monitor(client, &self.config.namespace).await?;
        RuntimeClassHandler::new(client).delete_all(&recorded).await?;
        ctx.status.push(StatusDelta::RuntimeClasses(Vec::new()));
        ctx.status.push(StatusDelta::Installed(false));

        if kata_config.spec.enable_peer_pods && !self.remove_image(ctx).await? {
            return Ok(Outcome::Requeue);
        }

        let machine_configs = MachineConfigHandler::new(client);
        machine_configs.delete_log_level().await?;

        let choice = select_pool(client).await?;
        let pool = client.get_machine_config_pool(choice.name()).await?;
        if let Some(name) = machine_configs.existing().await? {
            // The watermark must be stored before the config goes, or a restart
            // would compare the rollback against the install watermark
            if let Some(pool) = &pool {
                ctx.status.push(StatusDelta::BaseGeneration(pool.generation()));
                self.flush_status(ctx).await?;
            }
            machine_configs.delete_config(&name).await?;
            // The pool does not see the deletion right away
            tokio::time::sleep(self.config.pool_resync_wait).await;
            return Ok(Outcome::Requeue);
        }

        if let Some(pool) = &pool {
            let watermark = ctx.status.snapshot().base_mcp_generation.unwrap_or_default();
            let nodes = client.list_nodes(&node_query(kata_config)).await?;
            ctx.status
                .push(StatusDelta::UninstallProgress(classify_nodes(&nodes, pool, watermark)));
            if !pool.is_updated_since(watermark) || still_rendered(pool) {
                debug!("Pool {} is still rolling back (watermark {})", choice.name(), watermark);
                return Ok(Outcome::Requeue);
            }

            if choice == PoolChoice::Dedicated {
                let members = client.list_nodes(DEDICATED_POOL_ROLE_LABEL).await?;
                let unlabelled = unlabel_nodes(client, &members).await?;
                if unlabelled > 0 {
                    info!("Removed {} node(s) from pool {}", unlabelled, choice.name());
                    tokio::time::sleep(self.config.pool_resync_wait).await;
                    return Ok(Outcome::Requeue);
                }
                if pool.machine_count() > 0 {
                    debug!("Waiting for pool {} to drain", choice.name());
                    return Ok(Outcome::Requeue);
                }
                delete_dedicated_pool(client).await?;
            }
        }

        info!("Sandboxed runtime uninstalled");
        self.events
            .publish(
                &ctx.object_ref,
                EventType::Normal,
                reasons::UNINSTALLATION_COMPLETE,
                actions::UNINSTALL,
                None,
            )
            .await;
        Ok(Outcome::Released)
    }

    /// `namespace/name` of every pod requesting one of our runtime classes
    async fn pods_using_runtime(&self, recorded: &[String]) -> Result<Vec<String>, ControllerError> {
        let pods = self.client.list_pods().await?;
        Ok(pods
            .iter()
            .filter(|pod| {
                pod.spec
                    .as_ref()
                    .and_then(|s| s.runtime_class_name.as_deref())
                    .is_some_and(|rc| rc == DEFAULT_RUNTIME_CLASS || recorded.iter().any(|r| r == rc))
            })
            .map(|pod| {
                format!(
                    "{}/{}",
                    pod.metadata.namespace.as_deref().unwrap_or_default(),
                    pod.metadata.name.as_deref().unwrap_or_default()
                )
            })
            .collect())
    }

    /// Delete the pod VM image. Returns false while the job is still running.
    ///
    /// A failed or impossible deletion does not hold up the uninstall.
    async fn remove_image(&self, ctx: &ReconcileContext) -> Result<bool, ControllerError> {
        let orchestrator = ImageJobOrchestrator::new(
            self.client.as_ref(),
            self.events.as_ref(),
            &self.image_builder,
            &ctx.object_ref,
        );
        match orchestrator.delete_image().await {
            Ok(ImagePhase::Succeeded) => Ok(true),
            Ok(ImagePhase::Failed) => {
                warn!("Pod VM image deletion failed, continuing uninstall");
                Ok(true)
            }
            Ok(ImagePhase::Requeue | ImagePhase::Unknown) => Ok(false),
            Err(e @ (ControllerError::PeerPods(_) | ControllerError::Template(_))) => {
                warn!("Skipping pod VM image deletion: {}", e);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

/// Whether the pool still renders one of our machine configs
fn still_rendered(pool: &MachineConfigPool) -> bool {
    [EXTENSION_MACHINE_CONFIG, IMAGE_MACHINE_CONFIG]
        .iter()
        .any(|name| pool.renders(name))
}
