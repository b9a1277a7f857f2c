//! Feature gates
//!
//! Optional behaviours are a closed set of [`Feature`]s. Their on/off state
//! lives in the `osc-feature-gates` config map, their parameters in one
//! `<feature>-config` config map each. Every feature has exactly one
//! [`FeatureHandler`], looked up in [`HANDLERS`], that turns its parameters
//! into a [`PlanDelta`] on the [`RolloutPlan`].

use crate::error::ControllerError;
use crate::machine_config::MachineConfigStrategy;
use crate::runtime_class::RuntimeClassEntry;
use cluster_client::ClusterClientTrait;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Config map holding the on/off state of every feature
pub const FEATURE_GATES_CONFIG_MAP: &str = "osc-feature-gates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    /// Roll the runtime out as a layered OS image instead of an OS extension
    LayeredImageDeployment,
    /// Register extra runtime classes next to the default one
    AdditionalRuntimeClasses,
}

impl Feature {
    pub const ALL: [Feature; 2] = [Feature::LayeredImageDeployment, Feature::AdditionalRuntimeClasses];

    pub fn name(self) -> &'static str {
        match self {
            Feature::LayeredImageDeployment => "LayeredImageDeployment",
            Feature::AdditionalRuntimeClasses => "AdditionalRuntimeClasses",
        }
    }

    /// State used when the feature is not listed
    pub fn default_enabled(self) -> bool {
        false
    }

    /// Name of the config map carrying this feature's parameters
    pub fn params_config_map(self) -> String {
        format!("{}-config", self.name().to_lowercase())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Reads feature state and parameters from the operator namespace
pub struct FeatureGateEvaluator<'a> {
    client: &'a dyn ClusterClientTrait,
    namespace: &'a str,
}

impl<'a> FeatureGateEvaluator<'a> {
    pub fn new(client: &'a dyn ClusterClientTrait, namespace: &'a str) -> Self {
        Self { client, namespace }
    }

    /// On/off state of every feature. A missing config map means defaults.
    pub async fn status(&self) -> Result<BTreeMap<Feature, bool>, ControllerError> {
        let mut status: BTreeMap<Feature, bool> =
            Feature::ALL.into_iter().map(|f| (f, f.default_enabled())).collect();

        let Some(config_map) = self
            .client
            .get_config_map(self.namespace, FEATURE_GATES_CONFIG_MAP)
            .await?
        else {
            debug!("No {} config map, using default feature states", FEATURE_GATES_CONFIG_MAP);
            return Ok(status);
        };

        for (key, value) in config_map.data.unwrap_or_default() {
            match Feature::from_name(&key) {
                Some(feature) => {
                    status.insert(feature, value.trim().eq_ignore_ascii_case("true"));
                }
                None => debug!("Ignoring unknown feature gate {}", key),
            }
        }
        Ok(status)
    }

    /// Parameters of one feature. A missing config map means no parameters.
    pub async fn params(&self, feature: Feature) -> Result<BTreeMap<String, String>, ControllerError> {
        let config_map = self
            .client
            .get_config_map(self.namespace, &feature.params_config_map())
            .await?;
        Ok(config_map.and_then(|cm| cm.data).unwrap_or_default())
    }
}

/// What the rollout will do, after every enabled feature had its say
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RolloutPlan {
    pub strategy: MachineConfigStrategy,
    pub extra_runtime_classes: Vec<RuntimeClassEntry>,
    /// Why each enabled feature that rejected its parameters was left out
    pub skipped: Vec<String>,
}

/// Change a feature contributes to the plan
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDelta {
    Strategy(MachineConfigStrategy),
    ExtraRuntimeClasses(Vec<RuntimeClassEntry>),
}

impl RolloutPlan {
    pub fn apply(&mut self, delta: PlanDelta) {
        match delta {
            PlanDelta::Strategy(strategy) => self.strategy = strategy,
            PlanDelta::ExtraRuntimeClasses(entries) => self.extra_runtime_classes.extend(entries),
        }
    }
}

/// Behaviour behind one feature
pub trait FeatureHandler: Send + Sync {
    fn apply(&self, params: &BTreeMap<String, String>) -> Result<PlanDelta, ControllerError>;
}

struct LayeredImageHandler;

impl FeatureHandler for LayeredImageHandler {
    fn apply(&self, params: &BTreeMap<String, String>) -> Result<PlanDelta, ControllerError> {
        let os_image_url = params
            .get("osImageURL")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ControllerError::Feature {
                feature: Feature::LayeredImageDeployment.name(),
                message: "osImageURL parameter is required".to_string(),
            })?;
        let kernel_arguments = params
            .get("kernelArguments")
            .map(|args| args.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(PlanDelta::Strategy(MachineConfigStrategy::LayeredImage {
            os_image_url: os_image_url.to_string(),
            kernel_arguments,
        }))
    }
}

struct AdditionalRuntimeClassesHandler;

impl FeatureHandler for AdditionalRuntimeClassesHandler {
    fn apply(&self, params: &BTreeMap<String, String>) -> Result<PlanDelta, ControllerError> {
        let mut entries = Vec::new();
        for (name, overhead) in params {
            let entry = if overhead.trim().is_empty() {
                RuntimeClassEntry::with_default_overhead(name)
            } else {
                let (cpu, memory) = overhead.split_once(',').ok_or_else(|| ControllerError::Feature {
                    feature: Feature::AdditionalRuntimeClasses.name(),
                    message: format!("{}: expected \"<cpu>,<memory>\", got {:?}", name, overhead),
                })?;
                RuntimeClassEntry::new(name, cpu.trim(), memory.trim())
            };
            entries.push(entry);
        }
        Ok(PlanDelta::ExtraRuntimeClasses(entries))
    }
}

/// One handler per feature
pub static HANDLERS: [(Feature, &dyn FeatureHandler); 2] = [
    (Feature::LayeredImageDeployment, &LayeredImageHandler),
    (Feature::AdditionalRuntimeClasses, &AdditionalRuntimeClassesHandler),
];

pub fn handler_for(feature: Feature) -> Option<&'static dyn FeatureHandler> {
    HANDLERS
        .iter()
        .find(|(f, _)| *f == feature)
        .map(|(_, handler)| *handler)
}

/// Build the rollout plan from the enabled features.
///
/// A feature whose handler rejects its parameters is skipped and listed in
/// [`RolloutPlan::skipped`]; failures to read the config maps propagate.
pub async fn plan_rollout(evaluator: &FeatureGateEvaluator<'_>) -> Result<RolloutPlan, ControllerError> {
    let mut plan = RolloutPlan::default();

    for (feature, enabled) in evaluator.status().await? {
        if !enabled {
            continue;
        }
        let Some(handler) = handler_for(feature) else {
            continue;
        };
        let params = evaluator.params(feature).await?;
        match handler.apply(&params) {
            Ok(delta) => {
                info!(feature = feature.name(), "Feature enabled");
                plan.apply(delta);
            }
            Err(e) => {
                debug!(feature = feature.name(), error = %e, "Skipping feature");
                plan.skipped.push(e.to_string());
            }
        }
    }
    Ok(plan)
}
