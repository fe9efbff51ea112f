//! Error types for the runtime crate.

use admiral_policy::EngineError;
use thiserror::Error;

use crate::adapter::AccessError;

/// Errors surfaced to callers of the orchestrator and reconciler.
///
/// Rule-scoped engine failures are recorded against the rule and do not
/// appear here; only failures that stop an evaluation or a reconcile pass
/// do.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The caller cancelled the evaluation between two rules.
    #[error("evaluation cancelled")]
    Cancelled,

    /// The generate request store failed.
    #[error("generate request store error: {0}")]
    Store(String),

    /// The resource-access collaborator failed.
    #[error("resource access failed: {0}")]
    Access(#[from] AccessError),

    #[error("policy '{0}' not found")]
    PolicyNotFound(String),
}
