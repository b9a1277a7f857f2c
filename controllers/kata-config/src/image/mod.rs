//! Peer-pod VM image management
//!
//! [`ImageBuilder`] knows which cloud the cluster runs on and whether it is
//! in FIPS mode. It is detected once at startup and handed to the
//! reconciler. The image itself is built or deleted by a one-shot job driven
//! by [`ImageJobOrchestrator`](job::ImageJobOrchestrator).

pub mod job;
pub mod templates;
pub mod validation;

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use cluster_client::ClusterClientTrait;
use std::fmt;
use std::sync::Arc;
use templates::JobTemplateSource;
use tracing::{info, warn};

/// Config map holding the peer-pod provider settings and the built image id
pub const PEER_PODS_CONFIG_MAP: &str = "peer-pods-cm";
/// Secret holding the provider credentials
pub const PEER_PODS_SECRET: &str = "peer-pods-secret";

const INSTALL_CONFIG_NAMESPACE: &str = "kube-system";
const INSTALL_CONFIG_MAP: &str = "cluster-config-v1";
const INSTALL_CONFIG_KEY: &str = "install-config";

/// Cloud the peer-pod VMs run on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
    Libvirt,
    Unsupported(String),
}

impl CloudProvider {
    /// Map an infrastructure platform type (any case) to a provider
    pub fn from_platform(platform: Option<&str>) -> Self {
        match platform.map(str::to_lowercase).as_deref() {
            Some("aws") => Self::Aws,
            Some("azure") => Self::Azure,
            Some("gcp") => Self::Gcp,
            Some("libvirt") | Some("baremetal") | Some("none") => Self::Libvirt,
            Some(other) => Self::Unsupported(other.to_string()),
            None => Self::Unsupported("unknown".to_string()),
        }
    }

    /// Name used in job template file names
    pub fn name(&self) -> &str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::Libvirt => "libvirt",
            Self::Unsupported(name) => name,
        }
    }

    /// Key in the peer-pods config map holding the built image id
    pub fn image_id_key(&self) -> Option<&'static str> {
        match self {
            Self::Aws => Some("PODVM_AMI_ID"),
            Self::Azure => Some("AZURE_IMAGE_ID"),
            Self::Gcp => Some("PODVM_IMAGE_NAME"),
            Self::Libvirt => Some("LIBVIRT_IMAGE_ID"),
            Self::Unsupported(_) => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Process-wide peer-pod image settings
#[derive(Clone)]
pub struct ImageBuilder {
    pub provider: CloudProvider,
    pub fips: bool,
    pub namespace: String,
    pub builder_image: Option<String>,
    pub templates: Arc<dyn JobTemplateSource>,
}

impl fmt::Debug for ImageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuilder")
            .field("provider", &self.provider)
            .field("fips", &self.fips)
            .field("namespace", &self.namespace)
            .field("builder_image", &self.builder_image)
            .finish_non_exhaustive()
    }
}

impl ImageBuilder {
    /// Detect provider and FIPS mode from the cluster
    pub async fn detect(
        client: &dyn ClusterClientTrait,
        config: &OperatorConfig,
        templates: Arc<dyn JobTemplateSource>,
    ) -> Result<Self, ControllerError> {
        let provider = CloudProvider::from_platform(client.get_platform_type().await?.as_deref());
        let fips = detect_fips(client).await?;
        info!(provider = %provider, fips, "Detected peer-pod image settings");

        Ok(Self {
            provider,
            fips,
            namespace: config.namespace.clone(),
            builder_image: config.builder_image.clone(),
            templates,
        })
    }
}

/// FIPS mode as recorded in the cluster install config
async fn detect_fips(client: &dyn ClusterClientTrait) -> Result<bool, ControllerError> {
    let Some(config_map) = client
        .get_config_map(INSTALL_CONFIG_NAMESPACE, INSTALL_CONFIG_MAP)
        .await?
    else {
        return Ok(false);
    };
    let Some(raw) = config_map.data.as_ref().and_then(|d| d.get(INSTALL_CONFIG_KEY)) else {
        return Ok(false);
    };
    Ok(parse_fips(raw))
}

fn parse_fips(install_config: &str) -> bool {
    match serde_yaml::from_str::<serde_yaml::Value>(install_config) {
        Ok(value) => value.get("fips").and_then(serde_yaml::Value::as_bool).unwrap_or(false),
        Err(e) => {
            warn!(error = %e, "Unreadable install config, assuming FIPS is off");
            false
        }
    }
}
