//! Load-time policy checks.
//!
//! Problems that can be found without a resource are reported here, all at
//! once, so that an evaluation never has to discover them.

use admiral_core::{LabelSelector, Policy, Rule, SelectorOperator};
use std::collections::HashSet;

use crate::error::EngineError;

/// Check a policy before it is used for evaluation.
pub fn check_policy(policy: &Policy) -> Result<(), EngineError> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    if policy.spec.rules.is_empty() {
        issues.push("policy has no rules".to_string());
    }

    for (idx, rule) in policy.spec.rules.iter().enumerate() {
        let label = if rule.name.is_empty() {
            issues.push(format!("rule #{} has no name", idx));
            format!("#{}", idx)
        } else {
            rule.name.clone()
        };

        if !rule.name.is_empty() && !seen.insert(rule.name.as_str()) {
            issues.push(format!("duplicate rule name '{}'", rule.name));
        }

        check_rule(&label, rule, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        tracing::warn!(policy = %policy.name(), issues = issues.len(), "policy rejected");
        Err(EngineError::Configuration(format!(
            "policy '{}': {}",
            policy.name(),
            issues.join("; ")
        )))
    }
}

/// Reject policies whose rules share a name. Rule names key statistics and
/// responses, so this runs before every evaluation, not only at load time.
pub fn check_rule_names(policy: &Policy) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    let duplicates: Vec<&str> = policy
        .spec
        .rules
        .iter()
        .map(|r| r.name.as_str())
        .filter(|name| !seen.insert(*name))
        .collect();
    if duplicates.is_empty() {
        return Ok(());
    }
    Err(EngineError::Configuration(format!(
        "policy '{}': duplicate rule name '{}'",
        policy.name(),
        duplicates.join("', '")
    )))
}

fn check_rule(label: &str, rule: &Rule, issues: &mut Vec<String>) {
    if rule.match_resources.resources.kinds.is_empty() {
        issues.push(format!("rule '{}': match.resources.kinds is required", label));
    }
    if let Some(selector) = &rule.match_resources.resources.selector {
        check_selector(label, "match", selector, issues);
    }
    if let Some(selector) = rule.exclude.as_ref().and_then(|e| e.resources.selector.as_ref()) {
        check_selector(label, "exclude", selector, issues);
    }

    if !rule.has_mutate() && !rule.has_validate() && !rule.has_generate() {
        issues.push(format!("rule '{}': one of mutate, validate or generate is required", label));
    }

    if let Some(mutation) = &rule.mutate {
        if mutation.is_empty() {
            issues.push(format!("rule '{}': mutate requires overlay or patches", label));
        }
        for patch in &mutation.patches {
            if !matches!(patch.operation.as_str(), "add" | "replace" | "remove") {
                issues.push(format!(
                    "rule '{}': unsupported patch operation '{}'",
                    label, patch.operation
                ));
            }
            if !patch.path.starts_with('/') {
                issues.push(format!(
                    "rule '{}': patch path '{}' must start with '/'",
                    label, patch.path
                ));
            }
        }
    }

    if let Some(validation) = &rule.validate {
        match (&validation.pattern, validation.any_pattern.is_empty()) {
            (Some(_), false) => issues.push(format!(
                "rule '{}': pattern and anyPattern are mutually exclusive",
                label
            )),
            (None, true) => issues.push(format!(
                "rule '{}': validate requires pattern or anyPattern",
                label
            )),
            _ => {}
        }
    }

    if let Some(generation) = &rule.generate {
        if generation.kind.is_empty() {
            issues.push(format!("rule '{}': generate.kind is required", label));
        }
        if generation.name.is_empty() {
            issues.push(format!("rule '{}': generate.name is required", label));
        }
        match (&generation.data, &generation.clone) {
            (Some(_), Some(_)) => issues.push(format!(
                "rule '{}': generate data and clone are mutually exclusive",
                label
            )),
            (None, None) => issues.push(format!(
                "rule '{}': generate requires data or clone",
                label
            )),
            (None, Some(clone)) if clone.name.is_empty() || clone.namespace.is_empty() => issues.push(
                format!("rule '{}': generate.clone needs namespace and name", label),
            ),
            _ => {}
        }
    }
}

fn check_selector(label: &str, block: &str, selector: &LabelSelector, issues: &mut Vec<String>) {
    for req in &selector.match_expressions {
        let needs_values = matches!(req.operator, SelectorOperator::In | SelectorOperator::NotIn);
        if needs_values && req.values.is_empty() {
            issues.push(format!(
                "rule '{}': {} selector on '{}' needs values",
                label, block, req.key
            ));
        }
        if !needs_values && !req.values.is_empty() {
            issues.push(format!(
                "rule '{}': {} selector on '{}' must not have values",
                label, block, req.key
            ));
        }
    }
}
