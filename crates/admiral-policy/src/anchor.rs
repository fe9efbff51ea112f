//! Anchor syntax in overlay and pattern keys.
//!
//! - `(key)`: condition. The enclosing object only applies where the
//!   resource value at `key` matches.
//! - `+(key)`: add if absent. The field is written only when the resource
//!   does not have it yet.

use serde_json::{Map, Value};

/// The string value that deletes a field in an overlay and asserts absence
/// in a pattern.
pub const ABSENCE_MARKER: &str = "X";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor<'a> {
    Condition(&'a str),
    AddIfAbsent(&'a str),
    Plain(&'a str),
}

impl<'a> Anchor<'a> {
    pub fn parse(key: &'a str) -> Self {
        if let Some(inner) = key.strip_prefix("+(").and_then(|k| k.strip_suffix(')')) {
            if !inner.is_empty() {
                return Anchor::AddIfAbsent(inner);
            }
        }
        if let Some(inner) = key.strip_prefix('(').and_then(|k| k.strip_suffix(')')) {
            if !inner.is_empty() {
                return Anchor::Condition(inner);
            }
        }
        Anchor::Plain(key)
    }

    /// The field name without anchor decoration.
    pub fn key(&self) -> &'a str {
        match *self {
            Anchor::Condition(k) | Anchor::AddIfAbsent(k) | Anchor::Plain(k) => k,
        }
    }
}

/// Whether the object carries at least one `(key)` condition.
pub fn has_conditions(map: &Map<String, Value>) -> bool {
    map.keys()
        .any(|k| matches!(Anchor::parse(k), Anchor::Condition(_)))
}

pub fn is_absence_marker(value: &Value) -> bool {
    value.as_str() == Some(ABSENCE_MARKER)
}
