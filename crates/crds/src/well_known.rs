//! Well-known names shared by the operator and its tests.
//!
//! Label and annotation keys here are owned by the machine config operator;
//! the operator only reads them (or writes the pool role label).

/// Finalizer guarding teardown of everything a `KataConfig` created
pub const KATA_CONFIG_FINALIZER: &str = "kataconfiguration.openshift.io/finalizer";

/// Dedicated pool created for the runtime rollout
pub const DEDICATED_POOL: &str = "kata-oc";
/// Pool used on converged (control-plane-only) clusters
pub const MASTER_POOL: &str = "master";
pub const WORKER_POOL: &str = "worker";

/// Role label that places a node in the dedicated pool
pub const DEDICATED_POOL_ROLE_LABEL: &str = "node-role.kubernetes.io/kata-oc";
pub const WORKER_ROLE_LABEL: &str = "node-role.kubernetes.io/worker";
pub const MASTER_ROLE_LABEL: &str = "node-role.kubernetes.io/master";

/// Set by node feature discovery on nodes able to run the runtime
pub const RUNTIME_ELIGIBLE_LABEL: &str = "feature.node.kubernetes.io/runtime.kata";

/// Role label selecting which pools render a machine config
pub const MACHINE_CONFIG_ROLE_LABEL: &str = "machineconfiguration.openshift.io/role";
/// Prefix of the per-pool label that configs such as ContainerRuntimeConfig select on
pub const POOL_SELECTOR_LABEL_PREFIX: &str = "pools.operator.machineconfiguration.openshift.io/";

/// Per-node rollout annotations maintained by the machine config daemon
pub const NODE_STATE_ANNOTATION: &str = "machineconfiguration.openshift.io/state";
pub const NODE_CURRENT_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/currentConfig";
pub const NODE_DESIRED_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/desiredConfig";
pub const NODE_REASON_ANNOTATION: &str = "machineconfiguration.openshift.io/reason";

/// Values of [`NODE_STATE_ANNOTATION`]
pub const NODE_STATE_WORKING: &str = "Working";
pub const NODE_STATE_DONE: &str = "Done";
pub const NODE_STATE_DEGRADED: &str = "Degraded";

/// Pool condition raised when a node fails to apply its configuration
pub const POOL_CONDITION_DEGRADED: &str = "NodeDegraded";

/// Label marking every object the operator creates
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "kata-operator";
