//! GenerateRequest records.
//!
//! A `GenerateRequest` tracks one generation intent from the moment a
//! generate rule matches until the target resource exists.
//!
//! ```text
//! Pending ──► Completed
//!    │
//!    └──────► Failed ──(retry)──► Pending
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::policy::ObjectMeta;
use crate::request::{RequestInfo, ResourceSpec};

/// State of a generate request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerateRequestState {
    /// Not yet processed, or the target has not been created.
    #[default]
    Pending,
    /// Processing failed; may be reset to Pending for a retry.
    Failed,
    /// The target resources were created.
    Completed,
}

impl fmt::Display for GenerateRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Failed => write!(f, "Failed"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub metadata: ObjectMeta,

    pub spec: GenerateRequestSpec,

    #[serde(default)]
    pub status: GenerateRequestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequestSpec {
    pub policy: String,
    pub resource: ResourceSpec,
    #[serde(default)]
    pub context: GenerateRequestContext,
}

/// Context captured at admission time and replayed by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequestContext {
    #[serde(default, rename = "userInfo")]
    pub user_info: RequestInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequestStatus {
    pub state: GenerateRequestState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// When the state last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl GenerateRequest {
    /// Create a new Pending request with a generated name.
    pub fn pending(policy: impl Into<String>, resource: ResourceSpec, user_info: RequestInfo) -> Self {
        Self {
            metadata: ObjectMeta::named(format!("gr-{}", Uuid::new_v4().simple())),
            spec: GenerateRequestSpec {
                policy: policy.into(),
                resource,
                context: GenerateRequestContext { user_info },
            },
            status: GenerateRequestStatus {
                state: GenerateRequestState::Pending,
                message: String::new(),
                last_transition_time: Some(Utc::now()),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn state(&self) -> GenerateRequestState {
        self.status.state
    }

    /// Whether this request covers the same (policy, resource) pair.
    pub fn is_equivalent(&self, policy: &str, resource: &ResourceSpec) -> bool {
        self.spec.policy == policy && &self.spec.resource == resource
    }

    pub fn mark_completed(&mut self) {
        self.transition(GenerateRequestState::Completed, String::new());
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.transition(GenerateRequestState::Failed, message.into());
    }

    /// Reset a Failed request back to Pending. Returns false for any other
    /// state.
    pub fn reset(&mut self) -> bool {
        if self.status.state != GenerateRequestState::Failed {
            return false;
        }
        self.transition(GenerateRequestState::Pending, String::new());
        true
    }

    fn transition(&mut self, state: GenerateRequestState, message: String) {
        self.status.state = state;
        self.status.message = message;
        self.status.last_transition_time = Some(Utc::now());
    }
}
