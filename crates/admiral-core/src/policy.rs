//! Policy document types.
//!
//! A policy is an ordered list of rules. Rule order is significant: rules
//! are evaluated in declaration order and mutations accumulate across them.
//!
//! # Example
//!
//! ```yaml
//! metadata:
//!   name: add-labels
//! spec:
//!   validationFailureAction: enforce
//!   rules:
//!     - name: add-team-label
//!       match:
//!         resources:
//!           kinds: [Pod]
//!       mutate:
//!         overlay:
//!           metadata:
//!             labels:
//!               team: platform
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::ConfigError;

/// Minimal object metadata carried by policy-engine documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A policy document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub metadata: ObjectMeta,

    pub spec: PolicySpec,

    #[serde(default)]
    pub status: PolicyStatus,
}

impl Policy {
    /// Load a policy from a YAML (or JSON) file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a policy from YAML content. JSON is valid YAML, so this also
    /// accepts JSON documents.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// The policy name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Look up a rule by name.
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.spec.rules.iter().find(|r| r.name == name)
    }

    /// Whether any rule carries a generate body.
    pub fn has_generate_rules(&self) -> bool {
        self.spec.rules.iter().any(|r| r.generate.is_some())
    }
}

/// Policy behavior: rules plus failure handling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default)]
    pub validation_failure_action: ValidationFailureAction,

    /// Whether the policy also applies outside live admission
    /// (existing resources, reconciliation passes).
    #[serde(default)]
    pub background: bool,
}

/// What to do with a resource that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationFailureAction {
    /// Block the admission request.
    #[serde(alias = "Enforce")]
    Enforce,
    /// Allow the request and record a violation.
    #[default]
    #[serde(alias = "Audit")]
    Audit,
}

impl std::fmt::Display for ValidationFailureAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enforce => write!(f, "enforce"),
            Self::Audit => write!(f, "audit"),
        }
    }
}

/// A single rule: match/exclude filters plus optional mutate, validate and
/// generate bodies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,

    #[serde(rename = "match", default)]
    pub match_resources: MatchResources,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<MatchResources>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutate: Option<Mutation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<Validation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<Generation>,
}

impl Rule {
    pub fn has_mutate(&self) -> bool {
        self.mutate.as_ref().is_some_and(|m| !m.is_empty())
    }

    pub fn has_validate(&self) -> bool {
        self.validate.as_ref().is_some_and(|v| !v.is_empty())
    }

    pub fn has_generate(&self) -> bool {
        self.generate.is_some()
    }
}

/// Resource description plus identity filter. Used for both `match` and
/// `exclude`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResources {
    #[serde(flatten)]
    pub user_info: UserInfoFilter,

    #[serde(default)]
    pub resources: ResourceDescription,
}

impl MatchResources {
    /// True when neither the resource description nor the identity filter
    /// constrains anything.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.user_info.is_empty()
    }
}

/// Identity filter: roles, cluster roles and subjects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,
}

impl UserInfoFilter {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.cluster_roles.is_empty() && self.subjects.is_empty()
    }
}

/// An RBAC subject reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// `User`, `Group` or `ServiceAccount`.
    pub kind: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
}

/// Describes the set of resources a rule applies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescription {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<String>,

    /// Name glob (`*` and `?` wildcards).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
}

impl ResourceDescription {
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
            && self.name.is_none()
            && self.namespaces.is_empty()
            && self.selector.is_none()
    }
}

/// Standard equality/set-based label selector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Mutation body: an overlay document, explicit patches, or both
/// (overlay first, then patches).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
}

impl Mutation {
    pub fn is_empty(&self) -> bool {
        self.overlay.is_none() && self.patches.is_empty()
    }
}

/// A single RFC 6902 style patch operation as written in a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub path: String,

    #[serde(rename = "op")]
    pub operation: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

/// Validation body: a pattern or a list of alternative patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_pattern: Vec<Value>,
}

impl Validation {
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none() && self.any_pattern.is_empty()
    }
}

/// Generation body: a target kind/name with inline data or a clone source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub kind: String,

    pub name: String,

    /// Target namespace. Defaults to the triggering namespace (or the
    /// trigger itself when it is a `Namespace`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone: Option<CloneFrom>,
}

/// Location of a Secret or ConfigMap used as a clone source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloneFrom {
    pub namespace: String,
    pub name: String,
}

/// Aggregated policy statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    #[serde(default)]
    pub violation_count: u64,

    /// Count of rules that were applied.
    #[serde(default)]
    pub rules_applied_count: u64,

    /// Count of resources whose request was blocked by an enforcing rule.
    #[serde(default)]
    pub resources_blocked_count: u64,

    #[serde(default, rename = "averageMutationRulesExecutionTime")]
    pub avg_execution_time_mutation: String,

    #[serde(default, rename = "averageValidationRulesExecutionTime")]
    pub avg_execution_time_validation: String,

    #[serde(default, rename = "averageGenerationRulesExecutionTime")]
    pub avg_execution_time_generation: String,

    #[serde(default, rename = "ruleStatus")]
    pub rules: Vec<RuleStats>,
}

impl PolicyStatus {
    pub fn rule(&self, name: &str) -> Option<&RuleStats> {
        self.rules.iter().find(|r| r.name == name)
    }
}

/// Per-rule statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    #[serde(rename = "ruleName")]
    pub name: String,

    #[serde(default, rename = "averageExecutionTime")]
    pub execution_time: String,

    #[serde(default)]
    pub applied_count: u64,

    #[serde(default)]
    pub violation_count: u64,

    #[serde(default, rename = "mutationsCount")]
    pub mutation_count: u64,

    /// Rules that matched but could not be evaluated (bad context, bad
    /// patch, unresolvable clone source).
    #[serde(default)]
    pub failed_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const POLICY: &str = r#"
metadata:
  name: check-host-path
spec:
  validationFailureAction: enforce
  rules:
    - name: no-host-path
      match:
        roles: [admin]
        resources:
          kinds: [Pod]
          namespaces: [prod-*]
          selector:
            matchLabels:
              app: web
            matchExpressions:
              - key: tier
                operator: In
                values: [frontend]
      exclude:
        clusterRoles: [cluster-admin]
        resources:
          kinds: [Pod]
      validate:
        message: "hostPath volumes are not allowed"
        pattern:
          spec:
            volumes:
              hostPath: "X"
    - name: generate-secret
      match:
        resources:
          kinds: [Namespace]
      generate:
        kind: Secret
        name: regcred
        clone:
          namespace: default
          name: regcred
"#;

    #[test]
    fn test_parses_policy_yaml() {
        let policy = Policy::from_yaml(POLICY).unwrap();
        assert_eq!(policy.name(), "check-host-path");
        assert_eq!(
            policy.spec.validation_failure_action,
            ValidationFailureAction::Enforce
        );
        assert_eq!(policy.spec.rules.len(), 2);

        let rule = &policy.spec.rules[0];
        assert_eq!(rule.match_resources.user_info.roles, vec!["admin"]);
        assert_eq!(rule.match_resources.resources.kinds, vec!["Pod"]);
        let selector = rule.match_resources.resources.selector.as_ref().unwrap();
        assert_eq!(selector.match_labels.get("app").unwrap(), "web");
        assert_eq!(
            selector.match_expressions[0].operator,
            SelectorOperator::In
        );
        let exclude = rule.exclude.as_ref().unwrap();
        assert_eq!(exclude.user_info.cluster_roles, vec!["cluster-admin"]);
        assert!(rule.has_validate());
        assert!(!rule.has_mutate());

        let generate = policy.spec.rules[1].generate.as_ref().unwrap();
        assert_eq!(
            generate.clone,
            Some(CloneFrom {
                namespace: "default".to_string(),
                name: "regcred".to_string()
            })
        );
        assert!(policy.has_generate_rules());
    }

    #[test]
    fn test_validation_failure_action_defaults_to_audit() {
        let policy = Policy::from_yaml("spec:\n  rules: []\n").unwrap();
        assert_eq!(
            policy.spec.validation_failure_action,
            ValidationFailureAction::Audit
        );
        assert!(!policy.spec.background);
    }

    #[test]
    fn test_rejects_unknown_failure_action() {
        let result = Policy::from_yaml("spec:\n  validationFailureAction: block\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_patches_serialize_with_op_key() {
        let patch = Patch {
            path: "/metadata/labels/a".to_string(),
            operation: "add".to_string(),
            value: json!("b"),
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"path": "/metadata/labels/a", "op": "add", "value": "b"})
        );
    }

    #[test]
    fn test_status_uses_original_field_names() {
        let status = PolicyStatus {
            rules: vec![RuleStats {
                name: "r".to_string(),
                applied_count: 2,
                ..Default::default()
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["ruleStatus"][0]["ruleName"], json!("r"));
        assert_eq!(value["ruleStatus"][0]["appliedCount"], json!(2));
        assert!(value.get("averageMutationRulesExecutionTime").is_some());
    }
}
