//! Engine conventions.

use serde::{Deserialize, Serialize};

/// Options passed explicitly into the evaluation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fields that identify an array element when merging overlays into, or
    /// matching patterns against, arrays of objects. Checked in order: the
    /// first field present on the overlay/pattern element is the anchor.
    #[serde(default = "default_anchor_fields")]
    pub anchor_fields: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anchor_fields: default_anchor_fields(),
        }
    }
}

impl EngineConfig {
    /// The first configured anchor field present in `element`.
    pub fn anchor_of<'a>(&'a self, element: &serde_json::Map<String, serde_json::Value>) -> Option<&'a str> {
        self.anchor_fields
            .iter()
            .find(|field| element.contains_key(field.as_str()))
            .map(String::as_str)
    }
}

fn default_anchor_fields() -> Vec<String> {
    vec!["name".to_string()]
}
