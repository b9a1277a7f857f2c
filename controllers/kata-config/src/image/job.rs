//! Pod VM image jobs
//!
//! Creating or deleting the peer-pod VM image is delegated to a one-shot
//! batch job rendered from a provider template. Each call re-renders the job,
//! checks whether the image is already where it should be, and otherwise
//! starts (or keeps polling) the job.

use super::{ImageBuilder, PEER_PODS_CONFIG_MAP};
use crate::error::ControllerError;
use crate::events::{actions, reasons, EventPublisher};
use cluster_client::ClusterClientTrait;
use crds::well_known::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::{EnvVar, ObjectReference};
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

pub const CREATE_JOB_NAME: &str = "osc-podvm-image-creation";
pub const DELETE_JOB_NAME: &str = "osc-podvm-image-deletion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOperation {
    Create,
    Delete,
}

impl ImageOperation {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }

    pub fn job_name(self) -> &'static str {
        match self {
            Self::Create => CREATE_JOB_NAME,
            Self::Delete => DELETE_JOB_NAME,
        }
    }

    /// Whether the recorded image id already reflects this operation
    fn target_reached(self, image_id: Option<&str>) -> bool {
        match self {
            Self::Create => image_id.is_some(),
            Self::Delete => image_id.is_none(),
        }
    }

    fn reasons(self) -> (&'static str, &'static str) {
        match self {
            Self::Create => (reasons::IMAGE_CREATED, reasons::IMAGE_CREATION_FAILED),
            Self::Delete => (reasons::IMAGE_DELETED, reasons::IMAGE_DELETION_FAILED),
        }
    }
}

/// Outcome of one image create or delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePhase {
    /// The image is in the requested state
    Succeeded,
    /// The job is still running, or finished without recording its result yet
    Requeue,
    /// The job failed and was removed
    Failed,
    /// The job reports nothing conclusive
    Unknown,
}

/// Fill in a job template for one operation
pub fn render_job(
    builder: &ImageBuilder,
    operation: ImageOperation,
    image_id: Option<&str>,
) -> Result<Job, ControllerError> {
    let manifest = builder.templates.load(builder.provider.name(), operation)?;
    let mut job: Job = serde_yaml::from_str(&manifest)
        .map_err(|e| ControllerError::Template(format!("{} job for {}: {}", operation.verb(), builder.provider, e)))?;

    job.metadata.name = Some(operation.job_name().to_string());
    job.metadata.namespace = Some(builder.namespace.clone());
    job.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

    let pod_spec = job
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
        .ok_or_else(|| ControllerError::Template(format!("{} job has no pod spec", operation.verb())))?;

    for container in &mut pod_spec.containers {
        if let Some(image) = &builder.builder_image {
            container.image = Some(image.clone());
        }
        let env = container.env.get_or_insert_with(Vec::new);
        set_env(env, "FIPS_ENABLED", &builder.fips.to_string());
        if operation == ImageOperation::Delete {
            set_env(env, "IMAGE_ID", image_id.unwrap_or_default());
        }
    }
    Ok(job)
}

fn set_env(env: &mut Vec<EnvVar>, name: &str, value: &str) {
    env.retain(|e| e.name != name);
    env.push(EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    });
}

fn condition_true(status: &JobStatus, type_: &str) -> bool {
    status
        .conditions
        .iter()
        .flatten()
        .any(|c| c.type_ == type_ && c.status == "True")
}

/// Drives the image jobs for one KataConfig
pub struct ImageJobOrchestrator<'a> {
    client: &'a dyn ClusterClientTrait,
    events: &'a dyn EventPublisher,
    builder: &'a ImageBuilder,
    owner: &'a ObjectReference,
}

impl<'a> ImageJobOrchestrator<'a> {
    pub fn new(
        client: &'a dyn ClusterClientTrait,
        events: &'a dyn EventPublisher,
        builder: &'a ImageBuilder,
        owner: &'a ObjectReference,
    ) -> Self {
        Self {
            client,
            events,
            builder,
            owner,
        }
    }

    pub async fn create_image(&self) -> Result<ImagePhase, ControllerError> {
        self.run(ImageOperation::Create).await
    }

    pub async fn delete_image(&self) -> Result<ImagePhase, ControllerError> {
        self.run(ImageOperation::Delete).await
    }

    async fn run(&self, operation: ImageOperation) -> Result<ImagePhase, ControllerError> {
        let namespace = self.builder.namespace.as_str();
        let name = operation.job_name();

        let image_id = self.recorded_image_id().await?;
        let job = render_job(self.builder, operation, image_id.as_deref())?;

        if operation.target_reached(image_id.as_deref()) {
            let leftover = self.client.get_job(namespace, name).await?;
            if let Some(job) = leftover {
                self.remove_job(name).await?;
                if job.status.as_ref().is_some_and(|s| condition_true(s, "Complete")) {
                    self.publish_done(operation, image_id.as_deref()).await;
                }
            }
            return Ok(ImagePhase::Succeeded);
        }

        match self.client.create_job(namespace, &job).await {
            Ok(_) => info!(job = name, provider = %self.builder.provider, "Started pod VM image job"),
            Err(e) if e.is_already_exists() => debug!(job = name, "Image job already running"),
            Err(e) => return Err(e.into()),
        }

        let Some(job) = self.client.get_job(namespace, name).await? else {
            return Ok(ImagePhase::Unknown);
        };
        let status = job.status.unwrap_or_default();

        if condition_true(&status, "Failed") && status.failed.unwrap_or_default() > 0 {
            warn!(job = name, "Pod VM image job failed");
            self.remove_job(name).await?;
            self.events
                .publish(
                    self.owner,
                    EventType::Warning,
                    operation.reasons().1,
                    actions::IMAGE_JOB,
                    Some(format!("job {} failed", name)),
                )
                .await;
            return Ok(ImagePhase::Failed);
        }

        if condition_true(&status, "Complete") && status.succeeded.unwrap_or_default() > 0 {
            // The job's side effect lands in the config map; only that counts
            let image_id = self.recorded_image_id().await?;
            if !operation.target_reached(image_id.as_deref()) {
                debug!(job = name, "Image job completed, waiting for the image id to be recorded");
                return Ok(ImagePhase::Requeue);
            }
            self.remove_job(name).await?;
            self.publish_done(operation, image_id.as_deref()).await;
            return Ok(ImagePhase::Succeeded);
        }

        if status.active.unwrap_or_default() > 0 {
            return Ok(ImagePhase::Requeue);
        }
        Ok(ImagePhase::Unknown)
    }

    async fn publish_done(&self, operation: ImageOperation, image_id: Option<&str>) {
        let note = match operation {
            ImageOperation::Create => format!("image {} created", image_id.unwrap_or_default()),
            ImageOperation::Delete => "image deleted".to_string(),
        };
        info!(job = operation.job_name(), "Pod VM {}", note);
        self.events
            .publish(self.owner, EventType::Normal, operation.reasons().0, actions::IMAGE_JOB, Some(note))
            .await;
    }

    async fn recorded_image_id(&self) -> Result<Option<String>, ControllerError> {
        let key = self.builder.provider.image_id_key().ok_or_else(|| {
            ControllerError::PeerPods(format!("cloud provider {} is not supported", self.builder.provider))
        })?;
        let config_map = self
            .client
            .get_config_map(&self.builder.namespace, PEER_PODS_CONFIG_MAP)
            .await?;
        Ok(config_map
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(key))
            .filter(|id| !id.trim().is_empty()))
    }

    async fn remove_job(&self, name: &str) -> Result<(), ControllerError> {
        match self.client.delete_job(&self.builder.namespace, name).await {
            Ok(()) => {
                debug!(job = name, "Removed image job");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "job_test.rs"]
mod job_test;
