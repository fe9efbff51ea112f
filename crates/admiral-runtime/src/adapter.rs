use admiral_core::ResourceSpec;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Create on a resource that already exists.
    #[error("{0} already exists")]
    AlreadyExists(ResourceSpec),

    /// The backing store could not be reached.
    #[error("resource store unavailable: {0}")]
    Unavailable(String),
}

/// Read/create access to cluster resources.
#[async_trait]
pub trait ResourceAccess: Send + Sync {
    /// Fetch a resource body. `Ok(None)` when it does not exist.
    async fn get(&self, spec: &ResourceSpec) -> Result<Option<Value>, AccessError>;

    /// Create a resource. Fails with [`AccessError::AlreadyExists`] if the
    /// target is already present.
    async fn create(&self, spec: &ResourceSpec, body: &Value) -> Result<(), AccessError>;
}

/// In-process resource store, keyed by kind/namespace/name.
#[derive(Debug, Default)]
pub struct MemoryResourceAccess {
    objects: RwLock<BTreeMap<ResourceSpec, Value>>,
}

impl MemoryResourceAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `resource` under the identity read from its own body.
    pub fn insert(&self, resource: Value) -> Result<ResourceSpec, AccessError> {
        let spec = ResourceSpec::from_resource(&resource);
        self.objects
            .write()
            .map_err(|_| poisoned())?
            .insert(spec.clone(), resource);
        Ok(spec)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored bodies, ordered by identity.
    pub fn objects(&self) -> Vec<Value> {
        self.objects
            .read()
            .map(|o| o.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceAccess for MemoryResourceAccess {
    async fn get(&self, spec: &ResourceSpec) -> Result<Option<Value>, AccessError> {
        Ok(self.objects.read().map_err(|_| poisoned())?.get(spec).cloned())
    }

    async fn create(&self, spec: &ResourceSpec, body: &Value) -> Result<(), AccessError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        if objects.contains_key(spec) {
            return Err(AccessError::AlreadyExists(spec.clone()));
        }
        objects.insert(spec.clone(), body.clone());
        tracing::debug!(resource = %spec, "resource created");
        Ok(())
    }
}

fn poisoned() -> AccessError {
    AccessError::Unavailable("lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_access_round_trip() {
        let access = MemoryResourceAccess::new();
        let spec = access
            .insert(json!({"kind": "Secret", "metadata": {"name": "a", "namespace": "kyverno"}}))
            .unwrap();
        assert_eq!(spec, ResourceSpec::new("Secret", "kyverno", "a"));
        assert!(access.get(&spec).await.unwrap().is_some());

        let missing = ResourceSpec::new("Secret", "kyverno", "b");
        assert_eq!(access.get(&missing).await.unwrap(), None);

        access.create(&missing, &json!({"kind": "Secret"})).await.unwrap();
        assert_eq!(
            access.create(&missing, &json!({})).await,
            Err(AccessError::AlreadyExists(missing.clone()))
        );
        assert_eq!(access.len(), 2);
    }
}
