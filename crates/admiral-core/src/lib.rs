//! Shared types for the Admiral policy engine.
//!
//! Everything in this crate is plain data: the declarative policy document,
//! the admission input handed over by the webhook layer, and the records the
//! engine produces (`GenerateRequest`, `PolicyViolation`, rule statistics).

// Configuration types shared across all Admiral crates
pub mod config;

pub mod generate_request;
pub mod policy;
pub mod request;
pub mod violation;
pub mod wildcard;

pub use config::{AdmiralConfig, ConfigError, EngineConfig, ReconcileConfig, ResourceFilter};
pub use generate_request::{
    GenerateRequest, GenerateRequestContext, GenerateRequestSpec, GenerateRequestState,
    GenerateRequestStatus,
};
pub use policy::{
    CloneFrom, Generation, LabelSelector, LabelSelectorRequirement, MatchResources, Mutation,
    ObjectMeta, Patch, Policy, PolicySpec, PolicyStatus, ResourceDescription, Rule, RuleStats,
    SelectorOperator, Subject, UserInfoFilter, Validation, ValidationFailureAction,
};
pub use request::{AdmissionRequest, AdmissionUserInfo, Operation, RequestInfo, ResourceSpec};
pub use violation::{
    ManagedResourceSpec, PolicyViolation, PolicyViolationSpec, PolicyViolationStatus, RuleType,
    ViolatedRule,
};
