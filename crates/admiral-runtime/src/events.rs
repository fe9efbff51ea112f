//! Event records.
//!
//! The orchestrator and reconciler describe what happened as [`Event`]s;
//! an [`EventSink`] decides where they go. Persisting them as cluster
//! events is left to the embedding process.

use admiral_core::ResourceSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A rule mutated, validated or generated successfully.
    PolicyApplied,
    /// A rule's validation failed.
    PolicyViolation,
    /// The admission request was denied by an enforcing rule.
    RequestBlocked,
    /// A rule or a generate request could not be processed.
    PolicyFailed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PolicyApplied => write!(f, "POLICY_APPLIED"),
            Self::PolicyViolation => write!(f, "POLICY_VIOLATION"),
            Self::RequestBlocked => write!(f, "REQUEST_BLOCKED"),
            Self::PolicyFailed => write!(f, "POLICY_FAILED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub kind: EventKind,
    pub policy: String,

    /// Empty for policy-level events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    pub resource: ResourceSpec,
    pub message: String,
}

impl Event {
    pub fn new(
        kind: EventKind,
        policy: impl Into<String>,
        resource: ResourceSpec,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            kind,
            policy: policy.into(),
            rule: None,
            resource,
            message: message.into(),
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: Event) {
        let rule = event.rule.as_deref().unwrap_or("-");
        match event.kind {
            EventKind::PolicyApplied => tracing::info!(
                kind = %event.kind,
                policy = %event.policy,
                rule,
                resource = %event.resource,
                "{}",
                event.message
            ),
            EventKind::PolicyViolation | EventKind::RequestBlocked | EventKind::PolicyFailed => {
                tracing::warn!(
                    kind = %event.kind,
                    policy = %event.policy,
                    rule,
                    resource = %event.resource,
                    "{}",
                    event.message
                )
            }
        }
    }
}

/// Keeps events in memory, for tests and the CLI report.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .map(|e| e.iter().filter(|ev| ev.kind == kind).count())
            .unwrap_or_default()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
