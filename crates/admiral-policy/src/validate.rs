//! Validation: `pattern` and `anyPattern` checks.
//!
//! A failed check is an outcome, not an error. Errors are reserved for
//! rules that cannot be evaluated at all (no pattern, unresolvable
//! variable inside a pattern).

use admiral_core::{EngineConfig, Validation};
use serde_json::Value;

use crate::context::Context;
use crate::error::EngineError;
use crate::pattern::{PatternMatcher, PatternMismatch};
use crate::variables;

const DEFAULT_MESSAGE: &str = "resource does not match the validation pattern";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub message: String,
}

impl ValidationOutcome {
    fn pass() -> Self {
        Self {
            passed: true,
            message: "validation passed".to_string(),
        }
    }

    fn fail(message: String) -> Self {
        Self {
            passed: false,
            message,
        }
    }
}

/// Check `resource` against the rule's pattern or pattern alternatives.
/// Neither `resource` nor `ctx` is modified.
pub fn validate(
    resource: &Value,
    validation: &Validation,
    ctx: &Context,
    config: &EngineConfig,
) -> Result<ValidationOutcome, EngineError> {
    let matcher = PatternMatcher::new(config);

    let headline = if validation.message.is_empty() {
        DEFAULT_MESSAGE.to_string()
    } else {
        variables::substitute_lossy(&validation.message, ctx)
    };

    match (&validation.pattern, validation.any_pattern.as_slice()) {
        (Some(_), [_, ..]) => Err(EngineError::Configuration(
            "pattern and anyPattern are mutually exclusive".to_string(),
        )),
        (Some(pattern), []) => {
            let pattern = variables::substitute(pattern, ctx)?;
            Ok(match matcher.check(resource, &pattern) {
                Ok(()) => ValidationOutcome::pass(),
                Err(mismatch) => ValidationOutcome::fail(format!("{}; {}", headline, mismatch)),
            })
        }
        (None, []) => Err(EngineError::Configuration(
            "validate requires pattern or anyPattern".to_string(),
        )),
        (None, alternatives) => {
            let mut failures: Vec<PatternMismatch> = Vec::with_capacity(alternatives.len());
            for alternative in alternatives {
                let alternative = variables::substitute(alternative, ctx)?;
                match matcher.check(resource, &alternative) {
                    Ok(()) => return Ok(ValidationOutcome::pass()),
                    Err(mismatch) => failures.push(mismatch),
                }
            }

            let details = failures
                .iter()
                .enumerate()
                .map(|(i, m)| format!("anyPattern[{}]: {}", i, m))
                .collect::<Vec<_>>()
                .join("; ");
            Ok(ValidationOutcome::fail(format!(
                "{}; no pattern alternative matched ({})",
                headline, details
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RESOURCE;
    use proptest::prelude::*;
    use serde_json::json;

    fn pod(host_path: bool) -> Value {
        let volume = if host_path {
            json!({"name": "data", "hostPath": {"path": "/var/data"}})
        } else {
            json!({"name": "data", "emptyDir": {}})
        };
        json!({
            "kind": "Pod",
            "metadata": {"name": "web", "namespace": "team-a", "labels": {"app": "web"}},
            "spec": {
                "volumes": [volume],
                "containers": [{"name": "app", "image": "nginx:1.25"}]
            }
        })
    }

    fn ctx_for(resource: &Value) -> Context {
        let mut ctx = Context::new();
        ctx.add_value(RESOURCE, resource.clone()).unwrap();
        ctx
    }

    fn run(resource: &Value, validation: &Validation) -> ValidationOutcome {
        validate(resource, validation, &ctx_for(resource), &EngineConfig::default()).unwrap()
    }

    fn pattern(pattern: Value, message: &str) -> Validation {
        Validation {
            message: message.to_string(),
            pattern: Some(pattern),
            any_pattern: vec![],
        }
    }

    #[test]
    fn test_host_path_volumes_are_rejected() {
        let rule = pattern(
            json!({"spec": {"volumes": {"hostPath": "X"}}}),
            "hostPath volumes are not allowed in {{resource.metadata.name}}",
        );

        let outcome = run(&pod(true), &rule);
        assert!(!outcome.passed);
        assert!(outcome.message.starts_with("hostPath volumes are not allowed in web"));
        assert!(outcome.message.contains("/spec/volumes/0/hostPath"));

        let outcome = run(&pod(false), &rule);
        assert!(outcome.passed);
        assert_eq!(outcome.message, "validation passed");
    }

    #[test]
    fn test_default_message_when_none_configured() {
        let outcome = run(&pod(false), &pattern(json!({"metadata": {"labels": {"team": "?*"}}}), ""));
        assert!(!outcome.passed);
        assert!(outcome.message.starts_with(DEFAULT_MESSAGE));
    }

    #[test]
    fn test_patterns_are_substituted() {
        let rule = pattern(
            json!({"metadata": {"labels": {"app": "{{resource.metadata.name}}"}}}),
            "app label must equal the name",
        );
        assert!(run(&pod(false), &rule).passed);
    }

    #[test]
    fn test_any_pattern_passes_when_one_alternative_matches() {
        let rule = Validation {
            message: "needs a team or an owner label".to_string(),
            pattern: None,
            any_pattern: vec![
                json!({"metadata": {"labels": {"team": "*"}}}),
                json!({"metadata": {"labels": {"app": "web"}}}),
            ],
        };
        assert!(run(&pod(false), &rule).passed);
    }

    #[test]
    fn test_any_pattern_failure_lists_every_alternative() {
        let rule = Validation {
            message: "needs a team or an owner label".to_string(),
            pattern: None,
            any_pattern: vec![
                json!({"metadata": {"labels": {"team": "*"}}}),
                json!({"metadata": {"labels": {"owner": "*"}}}),
            ],
        };
        let outcome = run(&pod(false), &rule);
        assert!(!outcome.passed);
        assert!(outcome.message.contains("no pattern alternative matched"));
        assert!(outcome.message.contains("anyPattern[0]"));
        assert!(outcome.message.contains("anyPattern[1]"));
    }

    #[test]
    fn test_validation_does_not_modify_inputs() {
        let resource = pod(true);
        let ctx = ctx_for(&resource);
        let before = resource.clone();
        let _ = validate(
            &resource,
            &pattern(json!({"spec": {"volumes": {"hostPath": "X"}}}), "m"),
            &ctx,
            &EngineConfig::default(),
        );
        assert_eq!(resource, before);
        assert_eq!(ctx.query("resource").unwrap(), &before);
    }

    #[test]
    fn test_rules_without_patterns_are_configuration_errors() {
        let resource = pod(false);
        let empty = Validation::default();
        assert!(matches!(
            validate(&resource, &empty, &ctx_for(&resource), &EngineConfig::default()),
            Err(EngineError::Configuration(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_any_pattern_is_a_disjunction(
            labels in prop::collection::btree_map(prop::sample::select(vec!["a", "b", "c"]), "[xy]", 0..3),
            wanted in prop::collection::vec((prop::sample::select(vec!["a", "b", "c"]), "[xy*]"), 1..4),
        ) {
            let resource = json!({"metadata": {"labels": labels}});
            let alternatives: Vec<Value> = wanted
                .iter()
                .map(|(k, v)| json!({"metadata": {"labels": {k.to_string(): v}}}))
                .collect();

            let any = Validation { message: String::new(), pattern: None, any_pattern: alternatives.clone() };
            let expected = alternatives
                .iter()
                .any(|alt| run(&resource, &pattern(alt.clone(), "")).passed);
            prop_assert_eq!(run(&resource, &any).passed, expected);
        }
    }
}
