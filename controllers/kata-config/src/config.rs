//! Operator configuration read from the environment

use crate::error::ControllerError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_NAMESPACE: &str = "openshift-sandboxed-containers-operator";
pub const DEFAULT_TEMPLATE_DIR: &str = "/config/peerpods/podvm";

/// Runtime configuration of the operator
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace holding the operator's config maps, secrets, jobs and daemon sets
    pub namespace: String,
    /// Replaces the container image of the pod VM image builder jobs
    pub builder_image: Option<String>,
    /// Directory holding the `<provider>-podvm-image-<create|delete>.yaml` job templates
    pub template_dir: PathBuf,
    /// Delay used for every requeue while waiting on the cluster
    pub requeue_interval: Duration,
    /// Blocking wait after deleting the machine config or unlabelling nodes
    pub pool_resync_wait: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            builder_image: None,
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            requeue_interval: Duration::from_secs(15),
            pool_resync_wait: Duration::from_secs(60),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let seconds = |key: &str, default: Duration| -> Result<Duration, ControllerError> {
            match non_empty(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ControllerError::InvalidConfig(format!("{}={}: {}", key, raw, e))),
                None => Ok(default),
            }
        };

        // Registry credentials are consumed by the node agent, not by this controller
        if non_empty("PAYLOAD_REGISTRY_URL").is_none() {
            info!("PAYLOAD_REGISTRY_URL not set; node agent will use its built-in payload location");
        }

        Ok(Self {
            namespace: non_empty("OPERATOR_NAMESPACE").unwrap_or(defaults.namespace),
            builder_image: non_empty("PODVM_BUILDER_IMAGE"),
            template_dir: non_empty("PODVM_TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
            requeue_interval: seconds("REQUEUE_INTERVAL_SECONDS", defaults.requeue_interval)?,
            pool_resync_wait: seconds("POOL_RESYNC_WAIT_SECONDS", defaults.pool_resync_wait)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = OperatorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.requeue_interval, Duration::from_secs(15));
        assert_eq!(config.pool_resync_wait, Duration::from_secs(60));
        assert!(config.builder_image.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = OperatorConfig::from_lookup(lookup(&[
            ("OPERATOR_NAMESPACE", "kata-system"),
            ("PODVM_BUILDER_IMAGE", "quay.io/example/podvm-builder:1"),
            ("POOL_RESYNC_WAIT_SECONDS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.namespace, "kata-system");
        assert_eq!(config.builder_image.as_deref(), Some("quay.io/example/podvm-builder:1"));
        assert_eq!(config.pool_resync_wait, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_interval_is_rejected() {
        let err = OperatorConfig::from_lookup(lookup(&[("REQUEUE_INTERVAL_SECONDS", "soon")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
