//! Overlay merge.
//!
//! Merges a partial document into a resource in place:
//!
//! - objects merge key by key, unrelated resource keys are kept
//! - `"X"` or `null` as a value removes the key
//! - `(key)` conditions gate the enclosing object, `+(key)` only adds
//! - arrays of objects merge by anchor field, conditional elements merge
//!   into every element that satisfies them, everything else by position
//!   among the positional elements
//! - `"+value"` in an array appends `value` unless already present
//!
//! Content that lands in the resource is stripped of anchors and markers
//! first, so applying the same overlay twice is a no-op.

use admiral_core::EngineConfig;
use serde_json::{Map, Value};

use crate::anchor::{self, Anchor};
use crate::error::EngineError;
use crate::pattern::{PatternMatcher, escape};

/// Applies overlays using the configured anchor fields.
pub struct Overlay<'a> {
    config: &'a EngineConfig,
    conditions: PatternMatcher<'a>,
}

impl<'a> Overlay<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            conditions: PatternMatcher::new(config),
        }
    }

    /// Merge `overlay` into `resource`.
    pub fn apply(&self, resource: &mut Value, overlay: &Value) -> Result<(), EngineError> {
        self.merge_value(resource, overlay, "")
    }

    fn merge_value(&self, target: &mut Value, overlay: &Value, path: &str) -> Result<(), EngineError> {
        match overlay {
            Value::Object(overlay_map) => match target {
                Value::Object(target_map) => self.merge_object(target_map, overlay_map, path),
                Value::Null => {
                    if !anchor::has_conditions(overlay_map) {
                        *target = clean(overlay);
                    }
                    Ok(())
                }
                other => Err(conflict(path, "an object", other)),
            },
            Value::Array(overlay_items) => match target {
                Value::Array(target_items) => self.merge_array(target_items, overlay_items, path),
                Value::Null => {
                    *target = clean(overlay);
                    Ok(())
                }
                other => Err(conflict(path, "an array", other)),
            },
            scalar => match target {
                Value::Object(_) | Value::Array(_) => Err(conflict(path, "a scalar", target)),
                _ => {
                    *target = scalar.clone();
                    Ok(())
                }
            },
        }
    }

    fn merge_object(
        &self,
        target: &mut Map<String, Value>,
        overlay: &Map<String, Value>,
        path: &str,
    ) -> Result<(), EngineError> {
        if !self.conditions.conditions_hold(target, overlay) {
            return Ok(());
        }

        for (key, value) in overlay {
            match Anchor::parse(key) {
                Anchor::Condition(_) => {}
                Anchor::AddIfAbsent(k) => {
                    if !target.contains_key(k) && !is_delete(value) {
                        target.insert(k.to_string(), clean(value));
                    }
                }
                Anchor::Plain(k) => {
                    if is_delete(value) {
                        target.remove(k);
                        continue;
                    }
                    match target.get_mut(k) {
                        Some(current) => {
                            self.merge_value(current, value, &format!("{}/{}", path, escape(k)))?
                        }
                        None => {
                            // A condition cannot hold on a field that does not exist.
                            if value.as_object().is_some_and(anchor::has_conditions) {
                                continue;
                            }
                            target.insert(k.to_string(), clean(value));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Positional elements address the resource by their ordinal among
    /// the overlay's positional elements, never by their raw index, so
    /// appends and anchored elements do not shift them. Everything that
    /// grows the array is added after the in-place merges, in the order
    /// positional, anchored, appended. Conditional elements run last, over
    /// the whole array.
    fn merge_array(
        &self,
        target: &mut Vec<Value>,
        overlay: &[Value],
        path: &str,
    ) -> Result<(), EngineError> {
        let original = target.len();
        let mut position = 0;
        let mut positional = Vec::new();
        let mut anchored: Vec<Value> = Vec::new();
        let mut appended = Vec::new();
        let mut conditional = Vec::new();

        for element in overlay {
            if let Some(text) = element.as_str().and_then(append_marker) {
                appended.push(Value::String(text.to_string()));
                continue;
            }

            if let Value::Object(element_map) = element {
                if anchor::has_conditions(element_map) {
                    conditional.push(element_map);
                    continue;
                }

                if let Some(field) = self.config.anchor_of(element_map) {
                    let wanted = &element_map[field];
                    let existing = target[..original]
                        .iter()
                        .position(|item| item.get(field) == Some(wanted));
                    if let Some(i) = existing {
                        self.merge_value(&mut target[i], element, &format!("{}/{}", path, i))?;
                    } else if let Some(pending) =
                        anchored.iter_mut().find(|item| item.get(field) == Some(wanted))
                    {
                        self.merge_value(pending, element, path)?;
                    } else {
                        anchored.push(clean(element));
                    }
                    continue;
                }
            }

            let idx = position;
            position += 1;
            if idx < original {
                self.merge_value(&mut target[idx], element, &format!("{}/{}", path, idx))?;
            } else {
                positional.push(clean(element));
            }
        }

        target.extend(positional);
        target.extend(anchored);
        for value in appended {
            if !target.contains(&value) {
                target.push(value);
            }
        }

        for element_map in conditional {
            for (i, item) in target.iter_mut().enumerate() {
                if let Value::Object(item_map) = item {
                    self.merge_object(item_map, element_map, &format!("{}/{}", path, i))?;
                }
            }
        }
        Ok(())
    }
}

/// Strip anchors and markers from overlay content before it is inserted.
pub fn clean(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                if is_delete(item) {
                    continue;
                }
                match Anchor::parse(key) {
                    Anchor::Condition(_) => {}
                    Anchor::AddIfAbsent(k) | Anchor::Plain(k) => {
                        out.insert(k.to_string(), clean(item));
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item.as_str().and_then(append_marker) {
                    Some(appended) => Value::String(appended.to_string()),
                    None => clean(item),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn append_marker(text: &str) -> Option<&str> {
    text.strip_prefix('+').filter(|rest| !rest.is_empty())
}

fn is_delete(value: &Value) -> bool {
    value.is_null() || anchor::is_absence_marker(value)
}

fn conflict(path: &str, expected: &str, found: &Value) -> EngineError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    EngineError::MergeConflict {
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        reason: format!("overlay has {} but resource has {}", expected, found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn apply(mut resource: Value, overlay: Value) -> Value {
        let config = EngineConfig::default();
        Overlay::new(&config).apply(&mut resource, &overlay).unwrap();
        resource
    }

    #[test]
    fn test_merges_objects_key_by_key() {
        let out = apply(
            json!({"metadata": {"name": "web", "labels": {"app": "web"}}}),
            json!({"metadata": {"labels": {"added": "true"}}}),
        );
        assert_eq!(
            out,
            json!({"metadata": {"name": "web", "labels": {"app": "web", "added": "true"}}})
        );
    }

    #[test]
    fn test_deletion_markers_remove_fields() {
        let out = apply(
            json!({"metadata": {"labels": {"a": "1", "b": "2", "c": "3"}}}),
            json!({"metadata": {"labels": {"a": "X", "b": null, "missing": "X"}}}),
        );
        assert_eq!(out, json!({"metadata": {"labels": {"c": "3"}}}));
    }

    #[test]
    fn test_add_if_absent_keeps_existing_values() {
        let overlay = json!({"spec": {"+(dnsPolicy)": "Default", "+(priority)": 10}});
        let out = apply(json!({"spec": {"dnsPolicy": "ClusterFirst"}}), overlay);
        assert_eq!(out, json!({"spec": {"dnsPolicy": "ClusterFirst", "priority": 10}}));
    }

    #[test]
    fn test_anchored_array_elements_merge_by_name() {
        let out = apply(
            json!({"spec": {"containers": [
                {"name": "app", "image": "app:1"},
                {"name": "sidecar", "image": "envoy:1"}
            ]}}),
            json!({"spec": {"containers": [
                {"name": "sidecar", "imagePullPolicy": "Always"},
                {"name": "logger", "image": "fluent:2"}
            ]}}),
        );
        assert_eq!(
            out,
            json!({"spec": {"containers": [
                {"name": "app", "image": "app:1"},
                {"name": "sidecar", "image": "envoy:1", "imagePullPolicy": "Always"},
                {"name": "logger", "image": "fluent:2"}
            ]}})
        );
    }

    #[test]
    fn test_conditional_elements_merge_where_condition_holds() {
        let out = apply(
            json!({"containers": [
                {"name": "a", "image": "nginx:latest"},
                {"name": "b", "image": "redis:7"}
            ]}),
            json!({"containers": [{"(image)": "*:latest", "imagePullPolicy": "Always"}]}),
        );
        assert_eq!(
            out,
            json!({"containers": [
                {"name": "a", "image": "nginx:latest", "imagePullPolicy": "Always"},
                {"name": "b", "image": "redis:7"}
            ]})
        );
    }

    #[test]
    fn test_conditions_gate_objects() {
        let overlay = json!({"metadata": {"(labels)": {"env": "prod"}, "annotations": {"audit": "on"}}});
        let dev = json!({"metadata": {"labels": {"env": "dev"}}});
        assert_eq!(apply(dev.clone(), overlay.clone()), dev);

        let prod = apply(json!({"metadata": {"labels": {"env": "prod"}}}), overlay);
        assert_eq!(prod["metadata"]["annotations"], json!({"audit": "on"}));
    }

    #[test]
    fn test_append_markers_and_positional_arrays() {
        let out = apply(
            json!({"finalizers": ["a"], "args": ["--v", "1"]}),
            json!({"finalizers": ["+b", "+a"], "args": ["--v", "2", "--x"]}),
        );
        assert_eq!(out, json!({"finalizers": ["a", "b"], "args": ["--v", "2", "--x"]}));
    }

    #[test]
    fn test_inserted_content_is_cleaned() {
        let out = apply(
            json!({}),
            json!({"spec": {"+(a)": 1, "b": "X", "list": ["+c", {"+(d)": true}]}}),
        );
        assert_eq!(out, json!({"spec": {"a": 1, "list": ["c", {"d": true}]}}));

        // Conditional content cannot apply to a field that does not exist.
        let out = apply(json!({}), json!({"spec": {"(kind)": "Pod", "x": 1}}));
        assert_eq!(out, json!({}));
    }

    #[test]
    fn test_type_mismatch_is_a_conflict() {
        let config = EngineConfig::default();
        let mut resource = json!({"spec": {"replicas": 3}});
        let err = Overlay::new(&config)
            .apply(&mut resource, &json!({"spec": {"replicas": {"min": 1}}}))
            .unwrap_err();
        match err {
            EngineError::MergeConflict { path, reason } => {
                assert_eq!(path, "/spec/replicas");
                assert_eq!(reason, "overlay has an object but resource has a number");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_appends_do_not_shift_positional_elements() {
        let overlay = json!({"finalizers": ["+x", "y"]});
        let once = apply(json!({"finalizers": ["z"]}), overlay.clone());
        assert_eq!(once, json!({"finalizers": ["y", "x"]}));
        assert_eq!(apply(once.clone(), overlay), once);

        let overlay = json!({"items": ["a", "+x", "b"]});
        let once = apply(json!({"items": []}), overlay.clone());
        assert_eq!(once, json!({"items": ["a", "b", "x"]}));
        assert_eq!(apply(once.clone(), overlay), once);
    }

    #[test]
    fn test_anchored_elements_do_not_shift_positional_elements() {
        let overlay = json!({"items": [{"name": "n", "v": 1}, "s"]});
        let once = apply(json!({"items": ["q"]}), overlay.clone());
        assert_eq!(once, json!({"items": ["s", {"name": "n", "v": 1}]}));
        assert_eq!(apply(once.clone(), overlay), once);
    }

    #[test]
    fn test_applying_twice_is_stable() {
        let overlay = json!({
            "metadata": {"labels": {"+(team)": "core", "old": "X"}},
            "spec": {"containers": [{"name": "app", "resources": {"limits": {"cpu": "1"}}}], "tags": ["+x"]}
        });
        let once = apply(
            json!({"metadata": {"labels": {"old": "1"}}, "spec": {"containers": [{"name": "app"}], "tags": []}}),
            overlay.clone(),
        );
        let twice = apply(once.clone(), overlay);
        assert_eq!(once, twice);
    }
}
