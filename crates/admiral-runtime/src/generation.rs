//! Generate rule resolution against live resources.

use admiral_core::{Generation, ResourceSpec};
use admiral_policy::generate::{self, DesiredResource, GenerateSource};
use admiral_policy::{Context, EngineError};
use serde_json::Value;
use std::sync::Arc;

use crate::adapter::{AccessError, ResourceAccess};

/// Resolves generate rules and materializes their targets.
///
/// Errors are surfaced, never retried here: retry belongs to whoever owns
/// the generate request.
#[derive(Clone)]
pub struct GenerationEngine {
    access: Arc<dyn ResourceAccess>,
}

impl GenerationEngine {
    pub fn new(access: Arc<dyn ResourceAccess>) -> Self {
        Self { access }
    }

    /// Desired child resource for `generation` triggered by `trigger`.
    /// Clone sources are fetched through the resource-access collaborator.
    pub async fn resolve(
        &self,
        generation: &Generation,
        trigger: &Value,
        ctx: &Context,
    ) -> Result<DesiredResource, EngineError> {
        let target = generate::target(generation, trigger, ctx)?;
        let body = match generate::source(generation)? {
            GenerateSource::Data(data) => generate::body_from_data(data, &target, ctx)?,
            GenerateSource::Clone(clone) => {
                let source = generate::clone_source(generation, clone, ctx)?;
                let fetched = self.access.get(&source).await.map_err(access_error)?;
                let Some(fetched) = fetched else {
                    return Err(EngineError::SourceNotFound {
                        namespace: source.namespace,
                        name: source.name,
                    });
                };
                generate::body_from_clone(&fetched, &target)
            }
        };
        Ok(DesiredResource { target, body })
    }

    /// Create the desired resource. Returns `false` when it already
    /// existed, which counts as success.
    pub async fn materialize(&self, desired: &DesiredResource) -> Result<bool, EngineError> {
        if self.exists(&desired.target).await? {
            tracing::debug!(resource = %desired.target, "generated resource already exists");
            return Ok(false);
        }
        match self.access.create(&desired.target, &desired.body).await {
            Ok(()) => {
                tracing::info!(resource = %desired.target, "generated resource created");
                Ok(true)
            }
            Err(AccessError::AlreadyExists(_)) => Ok(false),
            Err(err) => Err(access_error(err)),
        }
    }

    async fn exists(&self, spec: &ResourceSpec) -> Result<bool, EngineError> {
        Ok(self.access.get(spec).await.map_err(access_error)?.is_some())
    }
}

fn access_error(err: AccessError) -> EngineError {
    EngineError::Access(err.to_string())
}
