//! Installation rollout
//!
//! Steps run in order on every reconcile and each one is a no-op once its
//! object exists, so a reconcile can stop at any step and pick up again.

use super::{classify_nodes, Outcome, ReconcileContext, Reconciler};
use crate::error::ControllerError;
use crate::events::{actions, reasons};
use crate::feature_gates::{plan_rollout, FeatureGateEvaluator};
use crate::image::job::{ImageJobOrchestrator, ImagePhase};
use crate::image::validation::validate_peer_pods_config;
use crate::machine_config::MachineConfigHandler;
use crate::monitor::ensure_monitor;
use crate::pool::{
    ensure_dedicated_pool, label_nodes, node_selector_labels, release_unselected_nodes, select_pool, PoolChoice,
};
use crate::runtime_class::{desired_set, RuntimeClassHandler};
use crate::selector::node_query;
use crate::status::StatusDelta;
use crds::well_known::POOL_CONDITION_DEGRADED;
use crds::{KataConfig, MachineConfigPool};
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

impl Reconciler {
    pub(crate) async fn install(
        &self,
        kata_config: &KataConfig,
        ctx: &mut ReconcileContext,
    ) -> Result<Outcome, ControllerError> {
        let client = self.client.as_ref();

        let query = node_query(kata_config);
        let nodes = client.list_nodes(&query).await?;
        if nodes.is_empty() {
            let message = format!("No nodes match the pool selector \"{}\"", query);
            warn!("KataConfig {}: {}", ctx.name, message);
            self.report_install_error(ctx, reasons::NO_ELIGIBLE_NODES, message).await;
            ctx.status.push(StatusDelta::TotalNodes(0));
            return Ok(Outcome::Requeue);
        }
        ctx.status.push(StatusDelta::TotalNodes(nodes.len()));
        ctx.status.push(StatusDelta::InstallError(None));

        self.add_finalizer(kata_config, ctx).await?;

        let choice = select_pool(client).await?;
        if choice == PoolChoice::Dedicated {
            let labelled = label_nodes(client, &nodes).await?;
            if labelled > 0 {
                info!("Labelled {} node(s) for pool {}", labelled, choice.name());
            }
            let released = release_unselected_nodes(client, &nodes).await?;
            if released > 0 {
                info!("Released {} node(s) from pool {}", released, choice.name());
            }
            ensure_dedicated_pool(client, ctx.owner.clone()).await?;
        }
        let Some(pool) = client.get_machine_config_pool(choice.name()).await? else {
            debug!("Waiting for pool {} to appear", choice.name());
            return Ok(Outcome::Requeue);
        };
        if pool.machine_count() == 0 {
            debug!("Waiting for pool {} to pick up its nodes", choice.name());
            return Ok(Outcome::Requeue);
        }

        let evaluator = FeatureGateEvaluator::new(client, &self.config.namespace);
        let plan = plan_rollout(&evaluator).await?;
        self.announce(ctx, reasons::FEATURE_SKIPPED, &plan.skipped).await;
        let peer_pods = if kata_config.spec.enable_peer_pods {
            self.peer_pods_available(ctx).await?
        } else {
            self.announce(ctx, reasons::PEER_PODS_UNAVAILABLE, &[]).await;
            false
        };

        let machine_configs = MachineConfigHandler::new(client);
        let created = machine_configs
            .ensure_config(&plan.strategy, choice.name(), ctx.owner.clone())
            .await?;
        let watermark = if created {
            pool.generation()
        } else if let Some(watermark) = ctx.status.snapshot().base_mcp_generation {
            watermark
        } else {
            recover_watermark(&machine_configs, &pool).await?
        };
        ctx.status.push(StatusDelta::BaseGeneration(watermark));

        machine_configs
            .ensure_log_level(kata_config.spec.log_level.as_deref(), choice.name(), ctx.owner.clone())
            .await?;

        ctx.status
            .push(StatusDelta::InstallProgress(classify_nodes(&nodes, &pool, watermark)));
        if pool.condition_true(POOL_CONDITION_DEGRADED) {
            let message = degraded_message(&pool);
            warn!("KataConfig {}: {}", ctx.name, message);
            self.report_install_error(ctx, reasons::POOL_DEGRADED, message).await;
        }

        if !pool.is_updated_since(watermark) {
            debug!("Pool {} is still rolling out (watermark {})", choice.name(), watermark);
            return Ok(Outcome::Requeue);
        }

        let image_ready = peer_pods && self.ensure_image(ctx).await?;
        let desired = desired_set(image_ready, &plan.extra_runtime_classes);
        let selector = node_selector_labels(&pool);
        let registered = RuntimeClassHandler::new(client)
            .reconcile(&desired, &ctx.status.snapshot().runtime_classes, &selector, ctx.owner.clone())
            .await?;
        ctx.status.push(StatusDelta::RuntimeClasses(registered));

        ensure_monitor(
            client,
            &self.config.namespace,
            kata_config.spec.kata_monitor_image.as_deref(),
            &selector,
            ctx.owner.clone(),
        )
        .await?;

        if peer_pods && !image_ready {
            return Ok(Outcome::Requeue);
        }

        if !ctx.status.snapshot().installed {
            info!("Sandboxed runtime installed on {} node(s)", nodes.len());
            self.events
                .publish(
                    &ctx.object_ref,
                    EventType::Normal,
                    reasons::INSTALLATION_COMPLETE,
                    actions::INSTALL,
                    Some(format!("runtime installed on pool {}", choice.name())),
                )
                .await;
        }
        ctx.status.push(StatusDelta::Installed(true));
        Ok(Outcome::AwaitChange)
    }

    /// Record an install diagnostic; the event is only published when the message changes
    async fn report_install_error(&self, ctx: &mut ReconcileContext, reason: &str, message: String) {
        let unchanged =
            ctx.status.snapshot().installation_status.error_message.as_deref() == Some(message.as_str());
        if !unchanged {
            self.events
                .publish(&ctx.object_ref, EventType::Warning, reason, actions::INSTALL, Some(message.clone()))
                .await;
        }
        ctx.status.push(StatusDelta::InstallError(Some(message)));
    }

    /// Publish the warnings of `reason` that were not published before
    async fn announce(&self, ctx: &ReconcileContext, reason: &'static str, messages: &[String]) {
        for message in self.announced.fresh(&ctx.name, reason, messages) {
            warn!("KataConfig {}: {}", ctx.name, message);
            self.events
                .publish(&ctx.object_ref, EventType::Warning, reason, actions::INSTALL, Some(message))
                .await;
        }
    }

    /// Whether the peer-pod provider is supported and configured.
    /// A misconfigured provider only disables peer pods.
    async fn peer_pods_available(&self, ctx: &ReconcileContext) -> Result<bool, ControllerError> {
        match validate_peer_pods_config(self.client.as_ref(), &self.config.namespace, &self.image_builder.provider)
            .await
        {
            Ok(()) => {
                self.announce(ctx, reasons::PEER_PODS_UNAVAILABLE, &[]).await;
                Ok(true)
            }
            Err(e @ ControllerError::PeerPods(_)) => {
                debug!("Peer pods disabled: {}", e);
                self.announce(ctx, reasons::PEER_PODS_UNAVAILABLE, &[e.to_string()])
                    .await;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Drive the pod VM image job. Returns whether the image exists.
    async fn ensure_image(&self, ctx: &ReconcileContext) -> Result<bool, ControllerError> {
        let orchestrator = ImageJobOrchestrator::new(
            self.client.as_ref(),
            self.events.as_ref(),
            &self.image_builder,
            &ctx.object_ref,
        );
        match orchestrator.create_image().await? {
            ImagePhase::Succeeded => Ok(true),
            ImagePhase::Failed => {
                warn!("Pod VM image creation failed, retrying on a later reconcile");
                Ok(false)
            }
            ImagePhase::Requeue | ImagePhase::Unknown => Ok(false),
        }
    }
}

/// Watermark for a rollout whose machine config predates the recorded status.
///
/// If the pool already renders the config, its current generation already
/// carries it.
async fn recover_watermark(
    machine_configs: &MachineConfigHandler<'_>,
    pool: &MachineConfigPool,
) -> Result<i64, ControllerError> {
    let rendered = machine_configs
        .existing()
        .await?
        .is_some_and(|name| pool.renders(&name));
    Ok(if rendered { pool.generation() - 1 } else { pool.generation() })
}

fn degraded_message(pool: &MachineConfigPool) -> String {
    let detail = pool
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.type_ == POOL_CONDITION_DEGRADED))
        .and_then(|c| c.message.clone())
        .unwrap_or_default();
    let name = pool.metadata.name.as_deref().unwrap_or_default();
    if detail.is_empty() {
        format!("Pool {} is degraded", name)
    } else {
        format!("Pool {} is degraded: {}", name, detail)
    }
}
