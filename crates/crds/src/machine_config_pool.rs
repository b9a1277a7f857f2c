//! MachineConfigPool CRD
//!
//! Typed mirror of the pool object grouping nodes that receive the same
//! rendered configuration.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    plural = "machineconfigpools",
    status = "MachineConfigPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {
    /// Which machine configs are rendered into this pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::preserve_unknown_fields")]
    pub machine_config_selector: Option<LabelSelector>,

    /// Which nodes belong to this pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::preserve_unknown_fields")]
    pub node_selector: Option<LabelSelector>,

    /// Desired rendered configuration, maintained by the machine config operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<RenderedConfiguration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderedConfiguration {
    #[serde(default)]
    pub name: String,

    /// Machine configs the rendered configuration was built from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<ConfigSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSource {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    #[serde(default)]
    pub observed_generation: i64,

    #[serde(default)]
    pub machine_count: i32,

    #[serde(default)]
    pub updated_machine_count: i32,

    #[serde(default)]
    pub ready_machine_count: i32,

    #[serde(default)]
    pub degraded_machine_count: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<PoolCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolCondition {
    #[serde(rename = "type")]
    #[schemars(rename = "type")]
    pub type_: String,

    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MachineConfigPool {
    /// Pool generation as tracked by the API server
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }

    pub fn observed_generation(&self) -> i64 {
        self.status.as_ref().map(|s| s.observed_generation).unwrap_or_default()
    }

    pub fn machine_count(&self) -> i32 {
        self.status.as_ref().map(|s| s.machine_count).unwrap_or_default()
    }

    /// Name of the rendered configuration nodes are expected to converge to
    pub fn desired_configuration(&self) -> Option<&str> {
        self.spec
            .configuration
            .as_ref()
            .map(|c| c.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Whether the named machine config is part of the rendered configuration
    pub fn renders(&self, machine_config: &str) -> bool {
        self.spec
            .configuration
            .as_ref()
            .is_some_and(|c| c.source.iter().any(|s| s.name == machine_config))
    }

    /// True when the pool has processed a generation newer than `watermark`
    /// and every machine runs the rendered configuration.
    pub fn is_updated_since(&self, watermark: i64) -> bool {
        match &self.status {
            Some(status) => {
                status.observed_generation > watermark
                    && status.updated_machine_count == status.machine_count
            }
            None => false,
        }
    }

    /// Whether a condition of the given type is "True"
    pub fn condition_true(&self, type_: &str) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.conditions.iter().any(|c| c.type_ == type_ && c.status == "True"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(generation: i64, observed: i64, machines: i32, updated: i32) -> MachineConfigPool {
        let mut pool = MachineConfigPool::new("kata-oc", MachineConfigPoolSpec::default());
        pool.metadata.generation = Some(generation);
        pool.status = Some(MachineConfigPoolStatus {
            observed_generation: observed,
            machine_count: machines,
            updated_machine_count: updated,
            ..Default::default()
        });
        pool
    }

    #[test]
    fn test_updated_requires_generation_past_watermark() {
        let p = pool(4, 4, 2, 2);
        assert!(!p.is_updated_since(4));
        assert!(p.is_updated_since(3));
    }

    #[test]
    fn test_updated_requires_all_machines() {
        let p = pool(5, 5, 3, 2);
        assert!(!p.is_updated_since(1));
    }

    #[test]
    fn test_renders_checks_sources() {
        let mut p = pool(1, 1, 1, 1);
        p.spec.configuration = Some(RenderedConfiguration {
            name: "rendered-kata-oc-abc".to_string(),
            source: vec![ConfigSource { name: "50-enable-sandboxed-containers-extension".to_string() }],
        });
        assert!(p.renders("50-enable-sandboxed-containers-extension"));
        assert!(!p.renders("50-enable-sandboxed-containers-image"));
        assert_eq!(p.desired_configuration(), Some("rendered-kata-oc-abc"));
    }
}
