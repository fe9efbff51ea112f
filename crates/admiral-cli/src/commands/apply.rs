//! `admiral apply` command implementation.
//!
//! Evaluates one resource against a set of policies the way the admission
//! webhook would and prints the decision, the patch list, violations,
//! queued generate requests and the resulting policy statistics.

use admiral_core::{
    AdmiralConfig, AdmissionRequest, GenerateRequest, Operation, PolicyStatus, PolicyViolation,
};
use admiral_policy::PatchOperation;
use admiral_runtime::{
    AdmissionResponse, CancelToken, EvaluationMode, MemoryGenerateRequestStore, Orchestrator,
    RuleStatus, StatsRegistry, TracingEventSink,
};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use super::{load, render};
use crate::OutputFormat;

#[derive(Debug)]
pub struct ApplyArgs {
    pub policy: PathBuf,
    pub resource: PathBuf,
    pub operation: Operation,
    pub user_info: Option<PathBuf>,
    pub background: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub allowed: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub patches: Vec<PatchOperation>,
    pub patched: Value,
    pub policies: Vec<PolicyReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReport {
    pub policy: String,
    pub action: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    pub rules: Vec<RuleReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation: Option<PolicyViolation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_request: Option<GenerateRequest>,
    pub status: PolicyStatus,
}

#[derive(Debug, Serialize)]
pub struct RuleReport {
    pub name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

fn status_label(status: RuleStatus) -> &'static str {
    match status {
        RuleStatus::Skipped => "skip",
        RuleStatus::Pass => "pass",
        RuleStatus::Fail => "fail",
        RuleStatus::Error => "error",
    }
}

pub fn build_report(response: AdmissionResponse, stats: &StatsRegistry) -> ApplyReport {
    let policies = response
        .policies
        .into_iter()
        .map(|p| PolicyReport {
            status: stats.status(&p.policy),
            action: p.action.to_string(),
            skipped: p.skipped,
            rules: p
                .rules
                .into_iter()
                .map(|r| RuleReport {
                    name: r.name,
                    status: status_label(r.status),
                    message: r.message,
                })
                .collect(),
            violation: p.violation,
            generate_request: p.generate_request,
            policy: p.policy,
        })
        .collect();

    ApplyReport {
        allowed: response.allowed,
        message: response.message,
        patches: response.patches,
        patched: response.patched,
        policies,
    }
}

/// Evaluate without printing.
pub async fn evaluate(config: &AdmiralConfig, args: &ApplyArgs, cancel: &CancelToken) -> Result<ApplyReport> {
    let policies = load::policies(&args.policy)?;
    for policy in &policies {
        admiral_policy::check_policy(policy)?;
    }
    let resource = load::resource(&args.resource)?;
    let info = load::request_info(args.user_info.as_deref())?;
    let request = AdmissionRequest::new(args.operation, resource, info);

    let stats = Arc::new(StatsRegistry::new());
    let orchestrator = Orchestrator::new(
        config.engine.clone(),
        Arc::new(MemoryGenerateRequestStore::new()),
        Arc::new(TracingEventSink),
    )
    .with_filters(config.resource_filters()?)
    .with_stats(stats.clone());

    let mode = if args.background {
        EvaluationMode::Background
    } else {
        EvaluationMode::Admission
    };
    // The webhook deadline bounds the whole admission decision.
    let admission = orchestrator.admit(&policies, &request, mode, cancel);
    let response = match tokio::time::timeout(config.webhook.timeout(), admission).await {
        Ok(response) => response?,
        Err(_) => anyhow::bail!(
            "admission evaluation exceeded the {}s webhook timeout",
            config.webhook.timeout_seconds
        ),
    };
    Ok(build_report(response, &stats))
}

pub async fn run(config: &AdmiralConfig, args: &ApplyArgs, output: OutputFormat) -> Result<()> {
    let cancel = super::cancel_on_ctrl_c();
    let report = evaluate(config, args, &cancel).await?;
    println!("{}", render(&report, output)?);

    if !report.allowed {
        anyhow::bail!("request denied");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    const POLICY: &str = r#"
metadata: {name: pod-defaults}
spec:
  validationFailureAction: enforce
  rules:
    - name: default-team
      match: {resources: {kinds: [Pod]}}
      mutate:
        overlay:
          metadata:
            labels:
              +(team): platform
    - name: no-privileged
      match: {resources: {kinds: [Pod]}}
      validate:
        message: "privileged containers are not allowed"
        pattern:
          spec:
            containers:
              - name: "*"
                securityContext:
                  privileged: false
"#;

    fn write_inputs(dir: &std::path::Path, privileged: bool) -> ApplyArgs {
        let policy = dir.join("policy.yaml");
        let resource = dir.join("pod.json");
        fs::write(&policy, POLICY).unwrap();
        fs::write(
            &resource,
            json!({
                "kind": "Pod",
                "metadata": {"name": "web", "namespace": "default"},
                "spec": {"containers": [{
                    "name": "app",
                    "image": "nginx",
                    "securityContext": {"privileged": privileged}
                }]}
            })
            .to_string(),
        )
        .unwrap();
        ApplyArgs {
            policy,
            resource,
            operation: Operation::Create,
            user_info: None,
            background: false,
        }
    }

    #[tokio::test]
    async fn test_apply_reports_patches_and_stats() {
        let dir = tempdir().unwrap();
        let args = write_inputs(dir.path(), false);

        let report = evaluate(&AdmiralConfig::default(), &args, &CancelToken::never())
            .await
            .unwrap();
        assert!(report.allowed);
        assert_eq!(report.patches.len(), 1);
        assert_eq!(report.patched["metadata"]["labels"]["team"], json!("platform"));

        let policy = &report.policies[0];
        assert_eq!(policy.action, "enforce");
        assert_eq!(policy.rules[0].status, "pass");
        assert_eq!(policy.status.rules_applied_count, 2);

        let rendered = render(&report, OutputFormat::Json).unwrap();
        assert!(rendered.contains("\"op\": \"add\""));
    }

    #[tokio::test]
    async fn test_apply_denies_privileged_pod() {
        let dir = tempdir().unwrap();
        let args = write_inputs(dir.path(), true);

        let report = evaluate(&AdmiralConfig::default(), &args, &CancelToken::never())
            .await
            .unwrap();
        assert!(!report.allowed);
        assert!(report.message.contains("privileged containers are not allowed"));
        assert_eq!(report.policies[0].status.resources_blocked_count, 1);
        assert!(run(&AdmiralConfig::default(), &args, OutputFormat::Yaml).await.is_err());
    }

    #[tokio::test]
    async fn test_webhook_timeout_and_cluster_settings_are_accepted() {
        let dir = tempdir().unwrap();
        let args = write_inputs(dir.path(), false);
        let config = AdmiralConfig::from_yaml(
            "kubeconfig: /tmp/kubeconfig\nserver_ip: 10.0.0.1\nwebhook: {timeout_seconds: 1}\nprofiling: {cpu: true}\n",
        )
        .unwrap();
        load::log_config(&config);

        let report = evaluate(&config, &args, &CancelToken::never()).await.unwrap();
        assert!(report.allowed);
        assert_eq!(report.patches.len(), 1);
    }

    #[tokio::test]
    async fn test_filtered_resources_are_skipped() {
        let dir = tempdir().unwrap();
        let args = write_inputs(dir.path(), true);
        let config = AdmiralConfig::from_yaml("filter_resources: \"[Pod,default,*]\"").unwrap();

        let report = evaluate(&config, &args, &CancelToken::never()).await.unwrap();
        assert!(report.allowed);
        assert!(report.policies[0].skipped);
        assert!(report.patches.is_empty());
    }
}
