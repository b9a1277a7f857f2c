//! Label selector matching for MockClusterClient
//!
//! Understands the string form produced by the operator: `key`, `!key`,
//! `key=value`, `key==value`, `key!=value`, `key in (a,b)` and `key notin (a,b)`.

use std::collections::BTreeMap;

/// Split a selector on top-level commas (commas inside parentheses belong to a set)
fn requirements(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(selector[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(selector[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn set_values(raw: &str) -> Vec<&str> {
    raw.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(str::trim)
        .collect()
}

fn requirement_matches(requirement: &str, labels: &BTreeMap<String, String>) -> bool {
    if let Some((key, values)) = requirement.split_once(" notin ") {
        return labels
            .get(key.trim())
            .is_none_or(|v| !set_values(values).contains(&v.as_str()));
    }
    if let Some((key, values)) = requirement.split_once(" in ") {
        return labels
            .get(key.trim())
            .is_some_and(|v| set_values(values).contains(&v.as_str()));
    }
    if let Some((key, value)) = requirement.split_once("!=") {
        return labels.get(key.trim()).is_none_or(|v| v != value.trim());
    }
    if let Some((key, value)) = requirement.split_once("==").or_else(|| requirement.split_once('=')) {
        return labels.get(key.trim()).is_some_and(|v| v == value.trim());
    }
    if let Some(key) = requirement.strip_prefix('!') {
        return !labels.contains_key(key.trim());
    }
    labels.contains_key(requirement)
}

/// Whether `labels` satisfy every requirement in `selector`. An empty selector matches everything.
pub fn matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    requirements(selector)
        .into_iter()
        .all(|r| requirement_matches(r, labels))
}
