//! Configuration types for Admiral.
//!
//! Process-wide settings are loaded once from a YAML file into an
//! [`AdmiralConfig`] and handed by reference to the components that need
//! them. The evaluation engine itself only sees the explicit
//! [`EngineConfig`] options.
//!
//! # Example
//!
//! ```yaml
//! kubeconfig: ~/.kube/config
//! webhook:
//!   timeout_seconds: 5
//! filter_resources: "[Event,*,*],[*,kube-system,*]"
//! engine:
//!   anchor_fields: [name, key]
//! reconcile:
//!   interval_ms: 500
//! ```

pub mod engine;
pub mod filter;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use engine::EngineConfig;
pub use filter::ResourceFilter;

/// Complete Admiral configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmiralConfig {
    /// Path to a kubeconfig. Only required when running out of cluster.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Address the webhook is reachable at when running out of cluster.
    #[serde(default)]
    pub server_ip: Option<String>,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub profiling: ProfilingConfig,

    /// Resources that are never evaluated, in `[Kind,Namespace,Name]` form.
    #[serde(default)]
    pub filter_resources: String,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Webhook transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-request deadline enforced by the transport.
    #[serde(default = "default_webhook_timeout")]
    pub timeout_seconds: u64,
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_webhook_timeout(),
        }
    }
}

/// Profiling feature gates. CPU and memory profiling cannot run together;
/// CPU wins when both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilingConfig {
    #[serde(default)]
    pub cpu: bool,

    #[serde(default)]
    pub memory: bool,
}

impl ProfilingConfig {
    pub fn memory_enabled(&self) -> bool {
        self.memory && !self.cpu
    }
}

/// Generate request reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Delay between passes over the pending queue.
    #[serde(default = "default_reconcile_interval")]
    pub interval_ms: u64,

    /// Maximum requests handled per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_reconcile_interval(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_webhook_timeout() -> u64 {
    2
}

fn default_reconcile_interval() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    32
}

/// Error type for configuration and document loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdmiralConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook.timeout_seconds == 0 {
            return Err(ConfigError::Config(
                "webhook.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.reconcile.batch_size == 0 {
            return Err(ConfigError::Config(
                "reconcile.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.engine.anchor_fields.iter().any(|f| f.is_empty()) {
            return Err(ConfigError::Config(
                "engine.anchor_fields must not contain empty names".to_string(),
            ));
        }
        self.resource_filters()?;
        Ok(())
    }

    /// Parse `filter_resources` into filters.
    pub fn resource_filters(&self) -> Result<Vec<ResourceFilter>, ConfigError> {
        ResourceFilter::parse_list(&self.filter_resources)
    }
}
