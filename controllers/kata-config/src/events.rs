//! Kubernetes Event recording
//!
//! Events are fire-and-forget: a failed publish is logged and never breaks
//! reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tracing::warn;

/// Publishes Kubernetes Events about the KataConfig
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    /// The controller name is reported as the event's reporting component
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Warning messages already published, per KataConfig and reason.
///
/// Node and pool watches re-run the reconcile every few seconds; a
/// condition that persists is announced once, and again only after it
/// clears or its message changes.
#[derive(Debug, Default)]
pub struct Announcements {
    seen: Mutex<BTreeMap<(String, &'static str), BTreeSet<String>>>,
}

impl Announcements {
    /// Record the messages currently reported for `reason` and return the
    /// ones not announced before. An empty slice clears the reason.
    pub fn fresh(&self, kata_config: &str, reason: &'static str, messages: &[String]) -> Vec<String> {
        let current: BTreeSet<String> = messages.iter().cloned().collect();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let key = (kata_config.to_string(), reason);
        let fresh = match seen.get(&key) {
            Some(previous) => current.difference(previous).cloned().collect(),
            None => current.iter().cloned().collect(),
        };
        if current.is_empty() {
            seen.remove(&key);
        } else {
            seen.insert(key, current);
        }
        fresh
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    pub const NO_ELIGIBLE_NODES: &str = "NoEligibleNodes";
    pub const INSTALLATION_COMPLETE: &str = "InstallationComplete";
    pub const POOL_DEGRADED: &str = "PoolDegraded";
    pub const UNINSTALL_BLOCKED: &str = "UninstallBlocked";
    pub const UNINSTALLATION_COMPLETE: &str = "UninstallationComplete";
    pub const FEATURE_SKIPPED: &str = "FeatureSkipped";
    pub const PEER_PODS_UNAVAILABLE: &str = "PeerPodsUnavailable";
    pub const IMAGE_CREATED: &str = "PodVMImageCreated";
    pub const IMAGE_CREATION_FAILED: &str = "PodVMImageCreationFailed";
    pub const IMAGE_DELETED: &str = "PodVMImageDeleted";
    pub const IMAGE_DELETION_FAILED: &str = "PodVMImageDeletionFailed";
}

/// Event actions, shown in the ACTION column
pub mod actions {
    pub const INSTALL: &str = "Install";
    pub const UNINSTALL: &str = "Uninstall";
    pub const IMAGE_JOB: &str = "ImageJob";
}

#[cfg(test)]
pub use recording::RecordingEventPublisher;
