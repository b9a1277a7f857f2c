//! MachineConfig CRD
//!
//! Typed mirror of the node configuration object consumed by the machine
//! config operator. Only the fields this operator writes are modelled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfig",
    plural = "machineconfigs"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigSpec {
    /// OS extensions to layer onto the node image
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,

    /// Full OS image to switch the node to
    #[serde(default, rename = "osImageURL", skip_serializing_if = "Option::is_none")]
    #[schemars(rename = "osImageURL")]
    pub os_image_url: Option<String>,

    /// Extra kernel arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kernel_arguments: Vec<String>,

    /// Ignition payload (left empty, the operator never writes files)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "crate::preserve_unknown_fields")]
    pub config: Option<serde_json::Value>,
}
