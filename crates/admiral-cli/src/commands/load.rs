//! Loading policies, resources and configuration from disk.

use admiral_core::{AdmiralConfig, Policy, RequestInfo};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Engine configuration from `path`, or defaults.
pub fn config(path: Option<&Path>) -> Result<AdmiralConfig> {
    match path {
        Some(path) => AdmiralConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(AdmiralConfig::default()),
    }
}

/// Log the settings that shape a run. Cluster connection settings have no
/// effect on commands that work from local files.
pub fn log_config(config: &AdmiralConfig) {
    tracing::info!(
        webhook_timeout_seconds = config.webhook.timeout_seconds,
        profiling_cpu = config.profiling.cpu,
        profiling_memory = config.profiling.memory_enabled(),
        filter_resources = %config.filter_resources,
        "configuration loaded"
    );
    if config.profiling.cpu && config.profiling.memory {
        tracing::warn!("cpu and memory profiling both requested; memory profiling disabled");
    }
    if let Some(path) = &config.kubeconfig {
        tracing::warn!(kubeconfig = %path.display(), "kubeconfig ignored; resources are read from local files");
    }
    if let Some(server_ip) = &config.server_ip {
        tracing::warn!(server_ip = %server_ip, "server_ip ignored; no webhook server is started");
    }
}

/// `path` itself, or every `.yaml`, `.yml` and `.json` file directly
/// inside it, sorted by name.
pub fn document_paths(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(path).with_context(|| format!("failed to read {}", path.display()))? {
        let entry = entry?;
        let file = entry.path();
        if !file.is_file() {
            continue;
        }
        if let Some(ext) = file.extension() {
            if ext == "yaml" || ext == "yml" || ext == "json" {
                paths.push(file);
            }
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn policies(path: &Path) -> Result<Vec<Policy>> {
    let mut policies = Vec::new();
    for file in document_paths(path)? {
        let policy = Policy::from_file(&file)
            .with_context(|| format!("failed to load policy {}", file.display()))?;
        tracing::debug!(policy = %policy.name(), file = %file.display(), "loaded policy");
        policies.push(policy);
    }
    Ok(policies)
}

/// One resource document.
pub fn resource(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse resource {}", path.display()))?;
    if !value.is_object() {
        anyhow::bail!("resource {} is not an object", path.display());
    }
    Ok(value)
}

pub fn resources(path: &Path) -> Result<Vec<Value>> {
    document_paths(path)?.iter().map(|p| resource(p)).collect()
}

pub fn request_info(path: Option<&Path>) -> Result<RequestInfo> {
    let Some(path) = path else {
        return Ok(RequestInfo::default());
    };
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse user info {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_loading_skips_other_files() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("b.yaml"),
            "kind: Pod\nmetadata: {name: b, namespace: default}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"{"kind": "Pod", "metadata": {"name": "a", "namespace": "default"}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a resource").unwrap();

        let loaded = resources(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0]["metadata"]["name"], "a");
        assert_eq!(loaded[1]["metadata"]["name"], "b");
    }

    #[test]
    fn test_scalar_resource_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "just a string\n").unwrap();
        assert!(resource(&path).is_err());
    }

    #[test]
    fn test_request_info_defaults_when_absent() {
        assert_eq!(request_info(None).unwrap(), RequestInfo::default());

        let dir = tempdir().unwrap();
        let path = dir.path().join("user.yaml");
        fs::write(&path, "clusterRoles: [admin]\nuserInfo: {username: alice}\n").unwrap();
        let info = request_info(Some(&path)).unwrap();
        assert_eq!(info.cluster_roles, vec!["admin".to_string()]);
        assert_eq!(info.user_info.username, "alice");
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let config = config(None).unwrap();
        assert_eq!(config.reconcile.batch_size, 32);
    }
}
