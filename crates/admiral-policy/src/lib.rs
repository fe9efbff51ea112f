//! Admiral policy evaluation engine.
//!
//! The engine is a small interpreter over JSON documents. Every operation
//! here is synchronous and free of I/O; the only collaborator call on the
//! generation path (fetching a clone source) lives in `admiral-runtime`.
//!
//! - [`context`]: per-request document store answering path queries
//! - [`variables`]: `{{path}}` substitution inside rule bodies
//! - [`matcher`]: `match` / `exclude` evaluation
//! - [`mutate`]: overlay and patch mutation, compiled to a JSON patch
//! - [`validate`]: `pattern` / `anyPattern` validation
//! - [`generate`]: desired-body resolution for generate rules
//! - [`check`]: load-time policy checks

pub mod anchor;
pub mod check;
pub mod context;
pub mod error;
pub mod generate;
pub mod matcher;
pub mod mutate;
pub mod overlay;
pub mod pattern;
pub mod validate;
pub mod variables;

pub use admiral_core::EngineConfig;
pub use check::{check_policy, check_rule_names};
pub use context::Context;
pub use error::{ContextError, EngineError};
pub use matcher::{is_described, matches, matches_identity};
pub use mutate::{MutationOutcome, PatchOperation, apply_patches, mutate};
pub use validate::{ValidationOutcome, validate};
