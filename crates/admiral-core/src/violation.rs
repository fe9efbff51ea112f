//! PolicyViolation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::policy::ObjectMeta;
use crate::request::ResourceSpec;

/// Which rule body produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleType {
    Mutation,
    Validation,
    Generation,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutation => write!(f, "Mutation"),
            Self::Validation => write!(f, "Validation"),
            Self::Generation => write!(f, "Generation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolation {
    #[serde(default)]
    pub metadata: ObjectMeta,

    pub spec: PolicyViolationSpec,

    #[serde(default)]
    pub status: PolicyViolationStatus,
}

impl PolicyViolation {
    pub fn new(policy: impl Into<String>, resource: ResourceSpec, rules: Vec<ViolatedRule>) -> Self {
        let policy = policy.into();
        Self {
            metadata: ObjectMeta {
                name: format!("{}-{}", policy, resource.name),
                namespace: (!resource.namespace.is_empty()).then(|| resource.namespace.clone()),
                ..Default::default()
            },
            spec: PolicyViolationSpec {
                policy,
                resource,
                rules,
            },
            status: PolicyViolationStatus {
                last_update_time: Some(Utc::now()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolationSpec {
    pub policy: String,
    pub resource: ResourceSpec,
    #[serde(default)]
    pub rules: Vec<ViolatedRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolatedRule {
    pub name: String,

    #[serde(rename = "type")]
    pub rule_type: RuleType,

    pub message: String,

    #[serde(default, rename = "managedResource", skip_serializing_if = "ManagedResourceSpec::is_empty")]
    pub managed_resource: ManagedResourceSpec,
}

/// Set when the violation was raised on an owner on behalf of a child
/// resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResourceSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default)]
    pub creation_blocked: bool,
}

impl ManagedResourceSpec {
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.namespace.is_empty() && !self.creation_blocked
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_violation_document_shape() {
        let pv = PolicyViolation::new(
            "no-host-path",
            ResourceSpec::new("Pod", "prod", "web"),
            vec![ViolatedRule {
                name: "check".to_string(),
                rule_type: RuleType::Validation,
                message: "hostPath is not allowed".to_string(),
                managed_resource: ManagedResourceSpec::default(),
            }],
        );
        assert_eq!(pv.metadata.namespace.as_deref(), Some("prod"));

        let value = serde_json::to_value(&pv).unwrap();
        assert_eq!(value["spec"]["rules"][0]["type"], json!("Validation"));
        assert!(value["spec"]["rules"][0].get("managedResource").is_none());
        assert!(value["status"]["lastUpdateTime"].is_string());
    }
}
