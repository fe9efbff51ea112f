//! Mutation: overlay merge and explicit patches, reported as one JSON patch.
//!
//! Both forms run against a working copy of the resource: the overlay
//! first, then the patch list in order. Either one failing aborts the
//! whole mutation. The reported patch is the diff between the input and
//! the final document, so it has the same shape whichever form produced
//! it.

use admiral_core::{EngineConfig, Mutation, Patch};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::context::Context;
use crate::error::EngineError;
use crate::overlay::Overlay;
use crate::variables;

/// One operation of a produced patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

impl PatchOperation {
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Remove { path } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// The mutated resource.
    pub resource: Value,
    /// The changes from the input resource, empty when nothing changed.
    pub patches: Vec<PatchOperation>,
}

impl MutationOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Apply `mutation` to `resource`, substituting `{{...}}` references from
/// `ctx` in the overlay and in patch values first.
pub fn mutate(
    resource: &Value,
    mutation: &Mutation,
    ctx: &Context,
    config: &EngineConfig,
) -> Result<MutationOutcome, EngineError> {
    let mut working = resource.clone();

    if let Some(overlay) = &mutation.overlay {
        let overlay = variables::substitute(overlay, ctx)?;
        Overlay::new(config).apply(&mut working, &overlay)?;
    }

    for patch in &mutation.patches {
        apply_patch(&mut working, patch, ctx)?;
    }

    let patches = diff(resource, &working)?;
    tracing::debug!(operations = patches.len(), "mutation computed");
    Ok(MutationOutcome {
        resource: working,
        patches,
    })
}

/// Apply a produced patch list to `resource`.
pub fn apply_patches(resource: &Value, patches: &[PatchOperation]) -> Result<Value, EngineError> {
    let ops: json_patch::Patch = serde_json::from_value(serde_json::to_value(patches)?)?;
    let mut patched = resource.clone();
    json_patch::patch(&mut patched, &ops.0)
        .map_err(|e| EngineError::PatchTargetMissing(e.to_string()))?;
    Ok(patched)
}

fn apply_patch(target: &mut Value, patch: &Patch, ctx: &Context) -> Result<(), EngineError> {
    if !patch.path.starts_with('/') {
        return Err(EngineError::Configuration(format!(
            "patch path '{}' must start with '/'",
            patch.path
        )));
    }

    let op = match patch.operation.as_str() {
        "add" | "replace" => {
            let value = variables::substitute(&patch.value, ctx)?;
            json!({"op": patch.operation, "path": patch.path, "value": value})
        }
        "remove" => json!({"op": "remove", "path": patch.path}),
        other => {
            return Err(EngineError::Configuration(format!(
                "unsupported patch operation '{}'",
                other
            )));
        }
    };

    let op: json_patch::PatchOperation = serde_json::from_value(op)?;
    json_patch::patch(target, &[op]).map_err(|e| {
        EngineError::PatchTargetMissing(format!("{} {}: {}", patch.operation, patch.path, e))
    })
}

fn diff(before: &Value, after: &Value) -> Result<Vec<PatchOperation>, EngineError> {
    let patch = json_patch::diff(before, after);
    Ok(serde_json::from_value(serde_json::to_value(&patch)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RESOURCE;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn pod() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web", "namespace": "default", "labels": {"app": "web"}},
            "spec": {"containers": [{"name": "app", "image": "nginx:1.25"}]}
        })
    }

    fn ctx_for(resource: &Value) -> Context {
        let mut ctx = Context::new();
        ctx.add_value(RESOURCE, resource.clone()).unwrap();
        ctx
    }

    fn overlay(overlay: Value) -> Mutation {
        Mutation {
            overlay: Some(overlay),
            patches: vec![],
        }
    }

    fn patch(op: &str, path: &str, value: Value) -> Patch {
        Patch {
            path: path.to_string(),
            operation: op.to_string(),
            value,
        }
    }

    #[test]
    fn test_overlay_adding_a_label_produces_one_add() {
        let resource = pod();
        let out = mutate(
            &resource,
            &overlay(json!({"metadata": {"labels": {"added": "true"}}})),
            &ctx_for(&resource),
            &EngineConfig::default(),
        )
        .unwrap();

        assert_eq!(
            out.patches,
            vec![PatchOperation::Add {
                path: "/metadata/labels/added".to_string(),
                value: json!("true"),
            }]
        );
        assert_eq!(out.resource["metadata"]["labels"]["added"], json!("true"));
        assert_eq!(
            serde_json::to_value(&out.patches).unwrap(),
            json!([{"op": "add", "path": "/metadata/labels/added", "value": "true"}])
        );
    }

    #[test]
    fn test_overlay_values_are_substituted() {
        let resource = pod();
        let out = mutate(
            &resource,
            &overlay(json!({"metadata": {"annotations": {"owner": "{{resource.metadata.name}}-team"}}})),
            &ctx_for(&resource),
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(out.resource["metadata"]["annotations"]["owner"], json!("web-team"));
    }

    #[test]
    fn test_explicit_patches_apply_in_order() {
        let resource = pod();
        let mutation = Mutation {
            overlay: None,
            patches: vec![
                patch("add", "/metadata/labels/tier", json!("frontend")),
                patch("replace", "/metadata/labels/tier", json!("edge")),
                patch("remove", "/metadata/labels/app", Value::Null),
            ],
        };
        let out = mutate(&resource, &mutation, &ctx_for(&resource), &EngineConfig::default()).unwrap();
        assert_eq!(out.resource["metadata"]["labels"], json!({"tier": "edge"}));
        assert_eq!(apply_patches(&resource, &out.patches).unwrap(), out.resource);
    }

    #[test]
    fn test_missing_patch_target_fails_the_whole_mutation() {
        let resource = pod();
        let mutation = Mutation {
            overlay: Some(json!({"metadata": {"labels": {"ok": "1"}}})),
            patches: vec![patch("add", "/spec/missing/field", json!(1))],
        };
        let err = mutate(&resource, &mutation, &ctx_for(&resource), &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::PatchTargetMissing(_)));

        let remove = Mutation {
            overlay: None,
            patches: vec![patch("remove", "/metadata/annotations", Value::Null)],
        };
        assert!(matches!(
            mutate(&resource, &remove, &ctx_for(&resource), &EngineConfig::default()),
            Err(EngineError::PatchTargetMissing(_))
        ));
    }

    #[test]
    fn test_unknown_operation_is_a_configuration_error() {
        let resource = pod();
        let mutation = Mutation {
            overlay: None,
            patches: vec![patch("move", "/metadata/name", Value::Null)],
        };
        assert!(matches!(
            mutate(&resource, &mutation, &ctx_for(&resource), &EngineConfig::default()),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn test_unresolved_variable_is_a_context_error() {
        let resource = pod();
        let out = mutate(
            &resource,
            &overlay(json!({"metadata": {"labels": {"x": "{{resource.metadata.uid}}"}}})),
            &ctx_for(&resource),
            &EngineConfig::default(),
        );
        assert!(matches!(out, Err(EngineError::Context(_))));
    }

    #[test]
    fn test_append_after_positional_element_is_kept() {
        let resource = json!({"metadata": {"name": "p", "finalizers": ["z"]}});
        let mutation = overlay(json!({"metadata": {"finalizers": ["+x", "y"]}}));
        let config = EngineConfig::default();

        let first = mutate(&resource, &mutation, &ctx_for(&resource), &config).unwrap();
        assert_eq!(first.resource["metadata"]["finalizers"], json!(["y", "x"]));

        let patched = apply_patches(&resource, &first.patches).unwrap();
        let second = mutate(&patched, &mutation, &ctx_for(&patched), &config).unwrap();
        assert!(second.patches.is_empty(), "second pass produced {:?}", second.patches);
    }

    #[test]
    fn test_unchanged_resource_has_no_patches() {
        let resource = pod();
        let out = mutate(
            &resource,
            &overlay(json!({"metadata": {"labels": {"app": "web"}}})),
            &ctx_for(&resource),
            &EngineConfig::default(),
        )
        .unwrap();
        assert!(out.is_unchanged());
        assert_eq!(out.resource, resource);
    }

    fn overlay_strategy() -> impl Strategy<Value = Value> {
        let label = prop::sample::select(vec!["a", "b", "c"]);
        let value = prop::sample::select(vec!["1", "2", "X"]);
        (
            prop::collection::btree_map(label, value, 0..3),
            prop::option::of(prop::sample::select(vec!["app", "sidecar", "init"])),
            prop::collection::vec(prop::sample::select(vec!["+f1", "+f2", "+f9", "f8", "f9"]), 0..4),
        )
            .prop_map(|(labels, container, finalizers)| {
                let mut overlay = json!({"metadata": {"labels": labels}});
                if let Some(name) = container {
                    overlay["spec"] = json!({"containers": [{"name": name, "imagePullPolicy": "Always"}]});
                }
                if !finalizers.is_empty() {
                    overlay["metadata"]["finalizers"] = json!(finalizers);
                }
                overlay
            })
    }

    fn resource_strategy() -> impl Strategy<Value = Value> {
        (
            prop::collection::btree_map(prop::sample::select(vec!["a", "b", "z"]), "[0-9]", 0..3),
            prop::sample::subsequence(vec!["app", "sidecar"], 0..=2),
            prop::collection::vec(prop::sample::select(vec!["f1", "f3"]), 0..3),
        )
            .prop_map(|(labels, containers, finalizers)| {
                let containers: Vec<Value> = containers
                    .into_iter()
                    .map(|name| json!({"name": name, "image": "img"}))
                    .collect();
                json!({
                    "kind": "Pod",
                    "metadata": {"name": "p", "labels": labels, "finalizers": finalizers},
                    "spec": {"containers": containers}
                })
            })
    }

    proptest! {
        #[test]
        fn prop_mutation_is_idempotent(resource in resource_strategy(), overlay_doc in overlay_strategy()) {
            let config = EngineConfig::default();
            let mutation = overlay(overlay_doc);
            let first = mutate(&resource, &mutation, &ctx_for(&resource), &config).unwrap();
            let patched = apply_patches(&resource, &first.patches).unwrap();
            prop_assert_eq!(&patched, &first.resource);

            let second = mutate(&patched, &mutation, &ctx_for(&patched), &config).unwrap();
            prop_assert!(second.patches.is_empty(), "second pass produced {:?}", second.patches);
        }
    }
}
