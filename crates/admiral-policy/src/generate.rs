//! Generate rule resolution: where the child resource goes and what it
//! looks like.
//!
//! Fetching a clone source is I/O and lives in `admiral-runtime`; the
//! functions here only compute names and shape bodies.

use admiral_core::{CloneFrom, Generation, ResourceSpec};
use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::EngineError;
use crate::variables;

/// Metadata fields that belong to the source object, not the copy.
const CLONE_STRIPPED_METADATA: &[&str] = &[
    "ownerReferences",
    "resourceVersion",
    "creationTimestamp",
    "uid",
    "selfLink",
    "managedFields",
    "generation",
];

/// Where the desired body of a generate rule comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenerateSource<'a> {
    Data(&'a Value),
    Clone(&'a CloneFrom),
}

/// A resolved child resource.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredResource {
    pub target: ResourceSpec,
    pub body: Value,
}

/// The rule's body source. Exactly one of `data` and `clone` must be set.
pub fn source(generation: &Generation) -> Result<GenerateSource<'_>, EngineError> {
    match (&generation.data, &generation.clone) {
        (Some(data), None) => Ok(GenerateSource::Data(data)),
        (None, Some(clone)) => Ok(GenerateSource::Clone(clone)),
        (Some(_), Some(_)) => Err(EngineError::Configuration(format!(
            "generate {}/{}: data and clone are mutually exclusive",
            generation.kind, generation.name
        ))),
        (None, None) => Err(EngineError::Configuration(format!(
            "generate {}/{}: one of data or clone is required",
            generation.kind, generation.name
        ))),
    }
}

/// Identity of the child resource for a trigger.
///
/// The namespace is the rule's explicit namespace, else the trigger itself
/// when it is a `Namespace`, else the trigger's namespace.
pub fn target(generation: &Generation, trigger: &Value, ctx: &Context) -> Result<ResourceSpec, EngineError> {
    let name = substitute_name(&generation.name, ctx)?;
    let trigger = ResourceSpec::from_resource(trigger);

    let namespace = match &generation.namespace {
        Some(ns) => substitute_name(ns, ctx)?,
        None if trigger.kind == "Namespace" => trigger.name,
        None => trigger.namespace,
    };

    Ok(ResourceSpec::new(generation.kind.clone(), namespace, name))
}

/// Location of the clone source, with `{{...}}` references resolved.
pub fn clone_source(generation: &Generation, clone: &CloneFrom, ctx: &Context) -> Result<ResourceSpec, EngineError> {
    Ok(ResourceSpec::new(
        generation.kind.clone(),
        substitute_name(&clone.namespace, ctx)?,
        substitute_name(&clone.name, ctx)?,
    ))
}

/// Desired body from inline `data`.
pub fn body_from_data(data: &Value, target: &ResourceSpec, ctx: &Context) -> Result<Value, EngineError> {
    let mut body = variables::substitute(data, ctx)?;
    if !body.is_object() {
        return Err(EngineError::Configuration(format!(
            "generate data for {} must be an object",
            target
        )));
    }
    stamp(&mut body, target);
    Ok(body)
}

/// Desired body copied from a fetched source object.
pub fn body_from_clone(source: &Value, target: &ResourceSpec) -> Value {
    let mut body = source.clone();
    if let Some(metadata) = body.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in CLONE_STRIPPED_METADATA {
            metadata.remove(*field);
        }
    }
    if !body.is_object() {
        body = Value::Object(Map::new());
    }
    stamp(&mut body, target);
    body
}

/// Resolve a `data` generate rule in one step.
pub fn resolve_data(
    generation: &Generation,
    trigger: &Value,
    ctx: &Context,
) -> Result<DesiredResource, EngineError> {
    let GenerateSource::Data(data) = source(generation)? else {
        return Err(EngineError::Configuration(format!(
            "generate {}/{}: clone sources must be fetched",
            generation.kind, generation.name
        )));
    };
    let target = target(generation, trigger, ctx)?;
    let body = body_from_data(data, &target, ctx)?;
    Ok(DesiredResource { target, body })
}

fn substitute_name(raw: &str, ctx: &Context) -> Result<String, EngineError> {
    match variables::substitute_str(raw, ctx)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Force kind, name and namespace of `body` to the target's.
fn stamp(body: &mut Value, target: &ResourceSpec) {
    let Value::Object(root) = body else {
        return;
    };
    root.insert("kind".to_string(), Value::String(target.kind.clone()));

    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    if let Value::Object(meta) = metadata {
        meta.insert("name".to_string(), Value::String(target.name.clone()));
        if target.namespace.is_empty() {
            meta.remove("namespace");
        } else {
            meta.insert("namespace".to_string(), Value::String(target.namespace.clone()));
        }
    }
}
