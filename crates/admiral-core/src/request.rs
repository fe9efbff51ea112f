//! Admission evaluation input.
//!
//! These are the only fields the engine consumes from the webhook layer:
//! the raw resource body, the requesting identity and the operation kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The admission operation being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// Raw user info carried by the admission request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdmissionUserInfo {
    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Vec<String>>,
}

/// Permission info for the requester: resolved roles and cluster roles plus
/// the raw user info.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default)]
    pub cluster_roles: Vec<String>,

    #[serde(default, rename = "userInfo")]
    pub user_info: AdmissionUserInfo,
}

/// One admission request as handed over by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub operation: Operation,

    /// The incoming resource body.
    pub resource: Value,

    /// Previous body for updates/deletes, if the transport provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource: Option<Value>,

    #[serde(default)]
    pub request_info: RequestInfo,
}

impl AdmissionRequest {
    pub fn new(operation: Operation, resource: Value, request_info: RequestInfo) -> Self {
        Self {
            operation,
            resource,
            old_resource: None,
            request_info,
        }
    }

    /// Identity of the resource under admission.
    pub fn resource_spec(&self) -> ResourceSpec {
        ResourceSpec::from_resource(&self.resource)
    }
}

/// Information identifying a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    pub name: String,
}

impl ResourceSpec {
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Read `kind`, `metadata.namespace` and `metadata.name` from a resource
    /// body. Missing fields become empty strings.
    pub fn from_resource(resource: &Value) -> Self {
        let text = |v: Option<&Value>| v.and_then(Value::as_str).unwrap_or_default().to_string();
        let metadata = resource.get("metadata");
        Self {
            kind: text(resource.get("kind")),
            namespace: text(metadata.and_then(|m| m.get("namespace"))),
            name: text(metadata.and_then(|m| m.get("name"))),
        }
    }
}

impl fmt::Display for ResourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}
