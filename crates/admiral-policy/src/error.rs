//! Engine error types.
//!
//! A failed validation is not an error: it is a
//! [`ValidationOutcome`](crate::validate::ValidationOutcome) with
//! `passed == false`. Everything here aborts at most the rule that raised it.

use thiserror::Error;

/// Errors raised by the context store and by variable substitution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The input for a context key is not valid JSON.
    #[error("invalid document for context key '{key}': {message}")]
    InvalidDocument { key: String, message: String },

    /// The key already holds a document and merge was not requested.
    #[error("context key '{0}' already holds a document")]
    DuplicateKey(String),

    /// The query path cannot be parsed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A path segment does not exist.
    #[error("path '{path}' not found: '{segment}' is absent")]
    NotFound { path: String, segment: String },

    /// An index was applied to a non-array or a field access to a
    /// non-object.
    #[error("type mismatch in path '{path}' at '{segment}': expected {expected}")]
    TypeMismatch {
        path: String,
        segment: String,
        expected: &'static str,
    },
}

/// Errors raised while evaluating a rule.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// Malformed policy or rule.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A patch operation addressed a path that does not exist.
    #[error("patch target missing: {0}")]
    PatchTargetMissing(String),

    /// An overlay could not be merged into the resource.
    #[error("merge conflict at '{path}': {reason}")]
    MergeConflict { path: String, reason: String },

    /// A clone source could not be resolved.
    #[error("clone source {namespace}/{name} not found")]
    SourceNotFound { namespace: String, name: String },

    /// A resource-access collaborator failed (I/O, transport).
    #[error("resource access failed: {0}")]
    Access(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the failure is a system-level error that should surface to
    /// the caller rather than being recorded against the rule.
    pub fn is_system(&self) -> bool {
        matches!(self, EngineError::Access(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_errors_convert() {
        let err: EngineError = ContextError::DuplicateKey("resource".to_string()).into();
        assert!(matches!(err, EngineError::Context(_)));
        assert!(!err.is_system());
        assert_eq!(
            err.to_string(),
            "context error: context key 'resource' already holds a document"
        );
    }

    #[test]
    fn test_access_errors_are_system_errors() {
        assert!(EngineError::Access("connection refused".to_string()).is_system());
        assert!(
            !EngineError::SourceNotFound {
                namespace: "default".to_string(),
                name: "regcred".to_string()
            }
            .is_system()
        );
    }
}
