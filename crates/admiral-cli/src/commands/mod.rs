//! CLI command implementations.

pub mod apply;
pub mod check;
pub mod generate;
pub mod load;

use admiral_runtime::{CancelHandle, CancelToken};
use serde::Serialize;

use crate::OutputFormat;

/// A token that fires on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancelToken {
    let handle = CancelHandle::new();
    let token = handle.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            handle.cancel();
        }
    });
    token
}

pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}
