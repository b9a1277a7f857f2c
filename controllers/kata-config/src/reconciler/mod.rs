//! KataConfig reconciliation
//!
//! Every call re-reads the KataConfig and live cluster state and works out
//! the next step from scratch. Nothing is remembered between calls except
//! what is written back to the KataConfig status, and which warnings were
//! already published.
//!
//! - `install`: rollout onto the selected nodes
//! - `uninstall`: finalizer-gated teardown
//! - `progress`: per-node classification against the pool watermark

mod install;
mod progress;
mod uninstall;

pub use progress::classify_nodes;

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::events::{Announcements, EventPublisher};
use crate::image::ImageBuilder;
use crate::status::StatusAggregator;
use chrono::Utc;
use cluster_client::ClusterClientTrait;
use crds::well_known::KATA_CONFIG_FINALIZER;
use crds::KataConfig;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the controller should do after a reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Check again after the requeue interval
    Requeue,
    /// Nothing left to do until a watched object changes
    AwaitChange,
    /// Teardown finished and the finalizer was removed
    Released,
}

/// State of one reconcile call
pub(crate) struct ReconcileContext {
    pub name: String,
    /// Latest resource version seen, advanced by our own writes
    pub resource_version: Option<String>,
    pub status: StatusAggregator,
    /// Subject of published events
    pub object_ref: ObjectReference,
    /// Owner reference stamped on created objects
    pub owner: Option<OwnerReference>,
}

impl ReconcileContext {
    pub fn new(kata_config: &KataConfig) -> Self {
        Self {
            name: kata_config.metadata.name.clone().unwrap_or_default(),
            resource_version: kata_config.metadata.resource_version.clone(),
            status: StatusAggregator::new(kata_config.status.as_ref()),
            object_ref: kata_config.object_ref(&()),
            owner: kata_config.controller_owner_ref(&()),
        }
    }
}

/// Reconciles KataConfig resources
pub struct Reconciler {
    pub(crate) client: Arc<dyn ClusterClientTrait>,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) image_builder: Arc<ImageBuilder>,
    pub(crate) config: OperatorConfig,
    pub(crate) announced: Announcements,
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn ClusterClientTrait>,
        events: Arc<dyn EventPublisher>,
        image_builder: Arc<ImageBuilder>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            client,
            events,
            image_builder,
            config,
            announced: Announcements::default(),
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Reconcile the named KataConfig into a controller action
    pub async fn reconcile(&self, name: &str) -> Result<Action, ControllerError> {
        Ok(match self.reconcile_outcome(name).await? {
            Outcome::Requeue => Action::requeue(self.config.requeue_interval),
            Outcome::AwaitChange | Outcome::Released => Action::await_change(),
        })
    }

    pub async fn reconcile_outcome(&self, name: &str) -> Result<Outcome, ControllerError> {
        let Some(kata_config) = self.client.get_kata_config(name).await? else {
            debug!("KataConfig {} is gone, nothing to do", name);
            return Ok(Outcome::AwaitChange);
        };

        let mut ctx = ReconcileContext::new(&kata_config);
        let result = if kata_config.is_deleting() {
            self.uninstall(&kata_config, &mut ctx).await
        } else {
            self.install(&kata_config, &mut ctx).await
        };

        let outcome = self.finish(&mut ctx, result).await?;
        if outcome == Outcome::Released {
            return self.release_finalizer(&kata_config, &ctx).await;
        }
        Ok(outcome)
    }

    /// Write the aggregated status, even when the step failed, and fold
    /// conflicts into a requeue.
    pub(crate) async fn finish(
        &self,
        ctx: &mut ReconcileContext,
        result: Result<Outcome, ControllerError>,
    ) -> Result<Outcome, ControllerError> {
        let flushed = self.flush_status(ctx).await;
        match (result, flushed) {
            (Err(e), _) | (Ok(_), Err(e)) if e.is_conflict() => {
                info!("KataConfig {} changed during reconcile, retrying: {}", ctx.name, e);
                Ok(Outcome::Requeue)
            }
            (Err(e), Err(flush_error)) => {
                warn!("Failed to record status of {}: {}", ctx.name, flush_error);
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
            (Ok(outcome), Ok(())) => Ok(outcome),
        }
    }

    /// Write the pending deltas now. Later deltas of the same reconcile
    /// apply on top of what was written.
    pub(crate) async fn flush_status(&self, ctx: &mut ReconcileContext) -> Result<(), ControllerError> {
        let Some(status) = ctx.status.finish(Utc::now()) else {
            return Ok(());
        };
        let updated = self
            .client
            .patch_kata_config_status(&ctx.name, ctx.resource_version.as_deref(), &status)
            .await?;
        debug!("Updated status of KataConfig {}", ctx.name);
        ctx.resource_version = updated.metadata.resource_version;
        ctx.status.commit(status);
        Ok(())
    }

    pub(crate) async fn add_finalizer(
        &self,
        kata_config: &KataConfig,
        ctx: &mut ReconcileContext,
    ) -> Result<(), ControllerError> {
        if kata_config.has_finalizer(KATA_CONFIG_FINALIZER) {
            return Ok(());
        }
        let mut finalizers = kata_config.metadata.finalizers.clone().unwrap_or_default();
        finalizers.push(KATA_CONFIG_FINALIZER.to_string());
        let updated = self
            .client
            .patch_kata_config_finalizers(&ctx.name, ctx.resource_version.as_deref(), &finalizers)
            .await?;
        info!("Added finalizer to KataConfig {}", ctx.name);
        ctx.resource_version = updated.metadata.resource_version;
        Ok(())
    }

    async fn release_finalizer(
        &self,
        kata_config: &KataConfig,
        ctx: &ReconcileContext,
    ) -> Result<Outcome, ControllerError> {
        let finalizers: Vec<String> = kata_config
            .metadata
            .finalizers
            .iter()
            .flatten()
            .filter(|f| f.as_str() != KATA_CONFIG_FINALIZER)
            .cloned()
            .collect();
        match self
            .client
            .patch_kata_config_finalizers(&ctx.name, ctx.resource_version.as_deref(), &finalizers)
            .await
        {
            Ok(_) => {
                info!("Removed finalizer from KataConfig {}", ctx.name);
                Ok(Outcome::Released)
            }
            Err(e) if e.is_conflict() => Ok(Outcome::Requeue),
            Err(e) if e.is_not_found() => Ok(Outcome::Released),
            Err(e) => Err(e.into()),
        }
    }
}


#[cfg(test)]
#[path = "uninstall_test.rs"]
mod uninstall_test;
