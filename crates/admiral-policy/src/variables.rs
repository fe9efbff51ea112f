//! Variable substitution: `{{path}}` references resolved against a
//! [`Context`].
//!
//! A string consisting of exactly one reference is replaced by the
//! referenced value with its JSON type intact. References embedded in a
//! longer string are replaced by their stringified value. Object keys are
//! never substituted.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::context::Context;
use crate::error::ContextError;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("variable regex is valid"));

/// Whether `text` contains at least one `{{...}}` reference.
pub fn has_variables(text: &str) -> bool {
    VARIABLE.is_match(text)
}

/// Substitute every reference in `value`, recursively.
pub fn substitute(value: &Value, ctx: &Context) -> Result<Value, ContextError> {
    match value {
        Value::String(s) => substitute_str(s, ctx),
        Value::Array(items) => items
            .iter()
            .map(|item| substitute(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), substitute(item, ctx)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Substitute references in a single string.
pub fn substitute_str(text: &str, ctx: &Context) -> Result<Value, ContextError> {
    if !has_variables(text) {
        return Ok(Value::String(text.to_string()));
    }

    if let Some(caps) = VARIABLE.captures(text) {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        if whole.len() == text.len() {
            return ctx.query(&caps[1]).cloned();
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in VARIABLE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&stringify(ctx.query(&caps[1])?));
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(Value::String(out))
}

/// Substitute references in free text (messages), leaving unresolvable
/// references as written.
pub fn substitute_lossy(text: &str, ctx: &Context) -> String {
    VARIABLE
        .replace_all(text, |caps: &regex::Captures<'_>| match ctx.query(&caps[1]) {
            Ok(value) => stringify(value),
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
