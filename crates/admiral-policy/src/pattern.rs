//! Structural pattern matching.
//!
//! A pattern is a partial document compared against a resource:
//!
//! - objects are subset constraints: every pattern key must match, extra
//!   resource keys are ignored; an object pattern compared with an array
//!   must match every element
//! - arrays: each pattern element must find a matching resource element,
//!   located by anchor field for objects or by position otherwise; an
//!   empty pattern array only matches an empty array
//! - scalars: `*` matches any present value, `?` matches one character,
//!   `>`, `>=`, `<`, `<=` compare, `!` negates
//! - `"X"` asserts the key is absent
//! - `(key)` conditions skip the enclosing object when not met

use admiral_core::EngineConfig;
use admiral_core::wildcard;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

use crate::anchor::{self, Anchor};

/// Where and why a resource does not match a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMismatch {
    pub path: String,
    pub reason: String,
}

impl PatternMismatch {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PatternMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at path {}", self.reason, self.path)
    }
}

/// Compares resources against patterns using the configured anchor fields.
pub struct PatternMatcher<'a> {
    config: &'a EngineConfig,
}

impl<'a> PatternMatcher<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Check `resource` against `pattern`.
    pub fn check(&self, resource: &Value, pattern: &Value) -> Result<(), PatternMismatch> {
        self.check_value(Some(resource), pattern, "")
    }

    /// Convenience wrapper returning only the verdict.
    pub fn matches(&self, resource: &Value, pattern: &Value) -> bool {
        self.check(resource, pattern).is_ok()
    }

    fn check_value(
        &self,
        resource: Option<&Value>,
        pattern: &Value,
        path: &str,
    ) -> Result<(), PatternMismatch> {
        if anchor::is_absence_marker(pattern) {
            return match resource {
                None => Ok(()),
                Some(_) => Err(PatternMismatch::new(path, "field must not be present")),
            };
        }

        let Some(resource) = resource else {
            return Err(PatternMismatch::new(path, "field is missing"));
        };

        match pattern {
            Value::Object(pattern_map) => match resource {
                Value::Object(resource_map) => self.check_object(resource_map, pattern_map, path),
                Value::Array(items) => {
                    for (idx, item) in items.iter().enumerate() {
                        self.check_value(Some(item), pattern, &format!("{}/{}", path, idx))?;
                    }
                    Ok(())
                }
                other => Err(PatternMismatch::new(
                    path,
                    format!("expected an object, found {}", type_name(other)),
                )),
            },
            Value::Array(pattern_items) => match resource {
                Value::Array(items) => self.check_array(items, pattern_items, path),
                other => Err(PatternMismatch::new(
                    path,
                    format!("expected an array, found {}", type_name(other)),
                )),
            },
            scalar => {
                if scalar_matches(resource, scalar) {
                    Ok(())
                } else {
                    Err(PatternMismatch::new(
                        path,
                        format!("expected {}, found {}", scalar, render(resource)),
                    ))
                }
            }
        }
    }

    fn check_object(
        &self,
        resource: &Map<String, Value>,
        pattern: &Map<String, Value>,
        path: &str,
    ) -> Result<(), PatternMismatch> {
        if !self.conditions_hold(resource, pattern) {
            return Ok(());
        }

        for (key, value) in pattern {
            let child = |k: &str| format!("{}/{}", path, escape(k));
            match Anchor::parse(key) {
                Anchor::Condition(_) => {}
                Anchor::AddIfAbsent(k) => {
                    if let Some(current) = resource.get(k) {
                        self.check_value(Some(current), value, &child(k))?;
                    }
                }
                Anchor::Plain(k) => self.check_value(resource.get(k), value, &child(k))?,
            }
        }
        Ok(())
    }

    fn check_array(
        &self,
        resource: &[Value],
        pattern: &[Value],
        path: &str,
    ) -> Result<(), PatternMismatch> {
        if pattern.is_empty() {
            return if resource.is_empty() {
                Ok(())
            } else {
                Err(PatternMismatch::new(path, "expected an empty array"))
            };
        }

        let mut position = 0;
        for element in pattern {
            let element_map = element.as_object();

            // Conditional elements apply to every resource element that
            // satisfies the condition.
            if element_map.is_some_and(anchor::has_conditions) {
                for (i, item) in resource.iter().enumerate() {
                    self.check_value(Some(item), element, &format!("{}/{}", path, i))?;
                }
                continue;
            }

            if let Some(field) = element_map.and_then(|m| self.config.anchor_of(m)) {
                self.check_anchored(resource, element, field, path)?;
                continue;
            }

            // Positional elements count among themselves only.
            let idx = position;
            position += 1;
            self.check_value(resource.get(idx), element, &format!("{}/{}", path, idx))?;
        }
        Ok(())
    }

    /// At least one resource element with a matching anchor field must
    /// satisfy the whole pattern element.
    fn check_anchored(
        &self,
        resource: &[Value],
        element: &Value,
        field: &str,
        path: &str,
    ) -> Result<(), PatternMismatch> {
        let wanted = &element[field];
        let mut first_error = None;

        for (i, item) in resource.iter().enumerate() {
            let Some(current) = item.get(field) else {
                continue;
            };
            if !scalar_matches(current, wanted) {
                continue;
            }
            match self.check_value(Some(item), element, &format!("{}/{}", path, i)) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| {
            PatternMismatch::new(
                path,
                format!("no element with {} = {}", field, render(wanted)),
            )
        }))
    }

    /// Evaluate `(key)` conditions of a pattern or overlay object.
    pub fn conditions_hold(&self, resource: &Map<String, Value>, pattern: &Map<String, Value>) -> bool {
        pattern.iter().all(|(key, value)| match Anchor::parse(key) {
            Anchor::Condition(k) => self.check_value(resource.get(k), value, "").is_ok(),
            _ => true,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

fn split_operator(pattern: &str) -> (Operator, &str) {
    // Two-character operators first.
    for (prefix, op) in [
        (">=", Operator::GreaterOrEqual),
        ("<=", Operator::LessOrEqual),
        (">", Operator::Greater),
        ("<", Operator::Less),
        ("!", Operator::NotEqual),
    ] {
        if let Some(rest) = pattern.strip_prefix(prefix) {
            return (op, rest.trim_start());
        }
    }
    (Operator::Equal, pattern)
}

/// Compare a single resource value with a scalar pattern.
pub fn scalar_matches(resource: &Value, pattern: &Value) -> bool {
    match pattern {
        Value::String(p) => string_pattern_matches(resource, p),
        Value::Number(n) => match resource {
            Value::Number(r) => r.as_f64() == n.as_f64(),
            Value::String(r) => r.parse::<f64>().ok() == n.as_f64(),
            _ => false,
        },
        Value::Bool(b) => resource.as_bool() == Some(*b),
        Value::Null => resource.is_null(),
        // Containers are handled structurally by the matcher.
        _ => resource == pattern,
    }
}

fn string_pattern_matches(resource: &Value, pattern: &str) -> bool {
    if pattern == "*" {
        return !resource.is_null();
    }

    let (op, operand) = split_operator(pattern);
    match op {
        Operator::Equal => plain_matches(resource, operand),
        Operator::NotEqual => !plain_matches(resource, operand),
        _ => match compare(resource, operand) {
            Some(ordering) => match op {
                Operator::Greater => ordering == Ordering::Greater,
                Operator::GreaterOrEqual => ordering != Ordering::Less,
                Operator::Less => ordering == Ordering::Less,
                Operator::LessOrEqual => ordering != Ordering::Greater,
                Operator::Equal | Operator::NotEqual => false,
            },
            None => false,
        },
    }
}

fn plain_matches(resource: &Value, pattern: &str) -> bool {
    let Some(text) = scalar_text(resource) else {
        return false;
    };
    if wildcard::has_wildcard(pattern) {
        return wildcard::matches(pattern, &text);
    }
    if text == pattern {
        return true;
    }
    // `1` and `1.0` are the same number.
    matches!(
        (resource.as_f64(), pattern.parse::<f64>().ok()),
        (Some(a), Some(b)) if a == b
    )
}

/// Numeric comparison when both sides are numbers, lexicographic when the
/// resource value is a string.
fn compare(resource: &Value, operand: &str) -> Option<Ordering> {
    let resource_num = match resource {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    };
    if let (Some(a), Ok(b)) = (resource_num, operand.parse::<f64>()) {
        return a.partial_cmp(&b);
    }
    resource.as_str().map(|s| s.cmp(operand))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Object(_) | Value::Array(_) => type_name(value).to_string(),
        other => other.to_string(),
    }
}

/// JSON pointer escaping for a single path segment.
pub(crate) fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
