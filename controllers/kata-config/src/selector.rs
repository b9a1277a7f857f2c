//! Node selection for the rollout

use crds::well_known::{RUNTIME_ELIGIBLE_LABEL, WORKER_ROLE_LABEL};
use crds::KataConfig;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

/// Render a label selector in the string form accepted by list calls
pub fn to_query(selector: &LabelSelector) -> String {
    let mut requirements: Vec<String> = selector
        .match_labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.clone().unwrap_or_default().join(",");
        let requirement = match expr.operator.as_str() {
            "In" => format!("{} in ({})", expr.key, values),
            "NotIn" => format!("{} notin ({})", expr.key, values),
            "Exists" => expr.key.clone(),
            "DoesNotExist" => format!("!{}", expr.key),
            _ => continue,
        };
        requirements.push(requirement);
    }
    requirements.join(",")
}

/// Label query selecting the nodes a KataConfig targets
pub fn node_query(kata_config: &KataConfig) -> String {
    let base = kata_config
        .spec
        .kata_config_pool_selector
        .as_ref()
        .map(to_query)
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| WORKER_ROLE_LABEL.to_string());

    if kata_config.spec.check_node_eligibility {
        format!("{},{}=true", base, RUNTIME_ELIGIBLE_LABEL)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::KataConfigSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;
    use std::collections::BTreeMap;

    #[test]
    fn test_default_selects_workers() {
        let kc = KataConfig::new("example", KataConfigSpec::default());
        assert_eq!(node_query(&kc), WORKER_ROLE_LABEL);
    }

    #[test]
    fn test_selector_with_expressions_and_eligibility() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("zone".to_string(), "a".to_string())])),
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "gpu".to_string(),
                operator: "DoesNotExist".to_string(),
                values: None,
            }]),
        };
        let kc = KataConfig::new(
            "example",
            KataConfigSpec {
                kata_config_pool_selector: Some(selector),
                check_node_eligibility: true,
                ..Default::default()
            },
        );
        assert_eq!(
            node_query(&kc),
            "zone=a,!gpu,feature.node.kubernetes.io/runtime.kata=true"
        );
    }
}
