//! Generate request queue.
//!
//! Requests are delivered at least once: a request stays Pending until a
//! handler marks it Completed or Failed, and a Completed request is never
//! handed out again.

use admiral_core::{GenerateRequest, GenerateRequestState};
use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::RuntimeError;

#[async_trait]
pub trait GenerateRequestStore: Send + Sync {
    /// Store `request` unless an equivalent request (same policy, same
    /// trigger) exists that has not Failed. Returns the stored request, or
    /// `None` when an equivalent one was already queued.
    async fn enqueue_if_absent(
        &self,
        request: GenerateRequest,
    ) -> Result<Option<GenerateRequest>, RuntimeError>;

    /// Up to `limit` Pending requests, oldest first.
    async fn pending(&self, limit: usize) -> Result<Vec<GenerateRequest>, RuntimeError>;

    async fn get(&self, name: &str) -> Result<Option<GenerateRequest>, RuntimeError>;

    /// Replace the stored copy of `request` (matched by name).
    async fn update(&self, request: &GenerateRequest) -> Result<(), RuntimeError>;

    /// Reset every Failed request to Pending. Returns how many were reset.
    async fn retry_failed(&self) -> Result<usize, RuntimeError>;

    async fn list(&self) -> Result<Vec<GenerateRequest>, RuntimeError>;
}

/// In-process queue preserving insertion order.
#[derive(Debug, Default)]
pub struct MemoryGenerateRequestStore {
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MemoryGenerateRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<GenerateRequest>>, RuntimeError> {
        self.requests
            .lock()
            .map_err(|_| RuntimeError::Store("lock poisoned".to_string()))
    }
}

#[async_trait]
impl GenerateRequestStore for MemoryGenerateRequestStore {
    async fn enqueue_if_absent(
        &self,
        request: GenerateRequest,
    ) -> Result<Option<GenerateRequest>, RuntimeError> {
        let mut requests = self.lock()?;
        let duplicate = requests.iter().find(|existing| {
            existing.state() != GenerateRequestState::Failed
                && existing.is_equivalent(&request.spec.policy, &request.spec.resource)
        });
        if let Some(existing) = duplicate {
            tracing::debug!(
                request = %existing.name(),
                policy = %request.spec.policy,
                resource = %request.spec.resource,
                "equivalent generate request already queued"
            );
            return Ok(None);
        }
        requests.push(request.clone());
        Ok(Some(request))
    }

    async fn pending(&self, limit: usize) -> Result<Vec<GenerateRequest>, RuntimeError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|r| r.state() == GenerateRequestState::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Option<GenerateRequest>, RuntimeError> {
        Ok(self.lock()?.iter().find(|r| r.name() == name).cloned())
    }

    async fn update(&self, request: &GenerateRequest) -> Result<(), RuntimeError> {
        let mut requests = self.lock()?;
        match requests.iter_mut().find(|r| r.name() == request.name()) {
            Some(slot) => {
                *slot = request.clone();
                Ok(())
            }
            None => Err(RuntimeError::Store(format!(
                "generate request '{}' not found",
                request.name()
            ))),
        }
    }

    async fn retry_failed(&self) -> Result<usize, RuntimeError> {
        let mut requests = self.lock()?;
        Ok(requests.iter_mut().filter_map(|r| r.reset().then_some(())).count())
    }

    async fn list(&self) -> Result<Vec<GenerateRequest>, RuntimeError> {
        Ok(self.lock()?.clone())
    }
}
