//! Kata Operator CRD Definitions
//!
//! The `KataConfig` custom resource owned by this operator, plus typed mirrors
//! of the machine configuration kinds it creates and watches.

pub mod container_runtime_config;
pub mod kata_config;
pub mod machine_config;
pub mod machine_config_pool;
pub mod well_known;

pub use container_runtime_config::*;
pub use kata_config::*;
pub use machine_config::*;
pub use machine_config_pool::*;

/// Schema for embedded upstream types (label selectors, ignition payloads)
/// that carry no `JsonSchema` implementation of their own.
pub(crate) fn preserve_unknown_fields(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
