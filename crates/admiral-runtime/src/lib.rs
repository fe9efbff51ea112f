//! Admiral runtime: everything around the evaluation engine that keeps
//! state or talks to collaborators.
//!
//! - [`orchestrator`]: runs a policy's rules against one admission request
//! - [`stats`]: per-policy and per-rule counters
//! - [`store`]: durable queue of generate requests
//! - [`generation`]: resolves generate rules, fetching clone sources
//! - [`reconciler`]: drives pending generate requests to completion
//! - [`events`]: records handed to an external event writer

pub mod adapter;
pub mod cancel;
pub mod error;
pub mod events;
pub mod generation;
pub mod orchestrator;
pub mod reconciler;
pub mod stats;
pub mod store;

pub use adapter::{AccessError, MemoryResourceAccess, ResourceAccess};
pub use cancel::{CancelHandle, CancelToken};
pub use error::RuntimeError;
pub use events::{Event, EventKind, EventSink, MemoryEventSink, TracingEventSink};
pub use generation::GenerationEngine;
pub use orchestrator::{
    AdmissionResponse, EvaluationMode, GenerateIntent, IntentSource, Orchestrator, PolicyResponse,
    RuleResponse, RuleStatus, StageTimings,
};
pub use reconciler::{GenerateReconciler, ReconcileReport};
pub use stats::StatsRegistry;
pub use store::{GenerateRequestStore, MemoryGenerateRequestStore};
