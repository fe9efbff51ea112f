//! `admiral generate` command implementation.
//!
//! Loads a set of resources into an in-memory cluster, admits each one as a
//! create and then drives the queued generate requests to completion.

use admiral_core::{
    AdmiralConfig, AdmissionRequest, GenerateRequest, Operation, RequestInfo, ResourceSpec,
};
use admiral_runtime::{
    CancelToken, EvaluationMode, GenerateReconciler, GenerateRequestStore, MemoryGenerateRequestStore,
    MemoryResourceAccess, Orchestrator, ReconcileReport, TracingEventSink,
};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use super::{load, render};
use crate::OutputFormat;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReport {
    pub requests: Vec<GenerateRequest>,
    /// Resources that did not exist before the run.
    pub generated: Vec<Value>,
}

/// Admit `resources`, then reconcile until no request is Pending (or, with
/// `watch`, until `cancel` fires).
pub async fn generate(
    config: &AdmiralConfig,
    policy_path: &Path,
    resources_path: &Path,
    watch: bool,
    cancel: CancelToken,
) -> Result<GenerateReport> {
    let policies = load::policies(policy_path)?;
    for policy in &policies {
        admiral_policy::check_policy(policy)?;
    }
    let resources = load::resources(resources_path)?;

    let access = Arc::new(MemoryResourceAccess::new());
    let mut existing = BTreeSet::new();
    for resource in &resources {
        existing.insert(access.insert(resource.clone())?);
    }

    let store = Arc::new(MemoryGenerateRequestStore::new());
    let events = Arc::new(TracingEventSink);
    let orchestrator = Orchestrator::new(config.engine.clone(), store.clone(), events.clone())
        .with_filters(config.resource_filters()?);

    for resource in resources {
        let request = AdmissionRequest::new(Operation::Create, resource, RequestInfo::default());
        let response = orchestrator
            .admit(&policies, &request, EvaluationMode::Admission, &cancel)
            .await?;
        if !response.allowed {
            tracing::warn!(resource = %request.resource_spec(), "{}", response.message);
        }
    }

    let reconciler = GenerateReconciler::new(
        policies,
        store.clone(),
        access.clone(),
        events,
        config.reconcile.clone(),
    );
    if watch {
        reconciler.run(cancel).await;
    } else {
        loop {
            let report = reconciler.reconcile_once(&cancel).await?;
            if report == ReconcileReport::default() || cancel.is_cancelled() {
                break;
            }
        }
    }

    let generated = access
        .objects()
        .into_iter()
        .filter(|o| !existing.contains(&ResourceSpec::from_resource(o)))
        .collect();
    Ok(GenerateReport {
        requests: store.list().await?,
        generated,
    })
}

pub async fn run(
    config: &AdmiralConfig,
    policy_path: &Path,
    resources_path: &Path,
    watch: bool,
    output: OutputFormat,
) -> Result<()> {
    let cancel = super::cancel_on_ctrl_c();
    let report = generate(config, policy_path, resources_path, watch, cancel).await?;
    println!("{}", render(&report, output)?);
    Ok(())
}
