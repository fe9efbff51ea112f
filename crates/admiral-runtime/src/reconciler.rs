//! Generate request reconciliation.
//!
//! Drains Pending requests: re-reads the trigger, replays the captured
//! identity, resolves every matching generate rule of the policy and
//! creates the targets. Business failures (missing policy, missing clone
//! source, bad rule) mark the request Failed; access failures leave it
//! Pending and end the pass so the next one retries.

use admiral_core::{AdmissionRequest, GenerateRequest, Operation, Policy, ReconcileConfig};
use admiral_policy::{Context, EngineError, check_rule_names, matcher};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::ResourceAccess;
use crate::cancel::CancelToken;
use crate::error::RuntimeError;
use crate::events::{Event, EventKind, EventSink};
use crate::generation::GenerationEngine;
use crate::store::GenerateRequestStore;

/// Outcome of one pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub completed: usize,
    pub failed: usize,
    /// Targets actually created (existing targets are not counted).
    pub created: usize,
}

pub struct GenerateReconciler {
    policies: HashMap<String, Policy>,
    store: Arc<dyn GenerateRequestStore>,
    access: Arc<dyn ResourceAccess>,
    generation: GenerationEngine,
    events: Arc<dyn EventSink>,
    config: ReconcileConfig,
}

enum Processed {
    Completed { created: usize },
    Failed,
}

impl GenerateReconciler {
    pub fn new(
        policies: impl IntoIterator<Item = Policy>,
        store: Arc<dyn GenerateRequestStore>,
        access: Arc<dyn ResourceAccess>,
        events: Arc<dyn EventSink>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            policies: policies
                .into_iter()
                .map(|p| (p.name().to_string(), p))
                .collect(),
            store,
            generation: GenerationEngine::new(access.clone()),
            access,
            events,
            config,
        }
    }

    /// Process up to `batch_size` Pending requests.
    pub async fn reconcile_once(&self, cancel: &CancelToken) -> Result<ReconcileReport, RuntimeError> {
        let mut report = ReconcileReport::default();
        let batch = self.store.pending(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(report);
        }
        tracing::debug!(requests = batch.len(), "reconciling generate requests");

        for request in batch {
            if cancel.is_cancelled() {
                tracing::info!("reconcile pass cancelled");
                break;
            }
            match self.process(request).await? {
                Processed::Completed { created } => {
                    report.completed += 1;
                    report.created += created;
                }
                Processed::Failed => report.failed += 1,
            }
        }
        Ok(report)
    }

    /// Reconcile until `cancel` fires, sleeping `interval_ms` between
    /// passes. Access failures are logged and retried on the next pass.
    pub async fn run(&self, mut cancel: CancelToken) {
        let interval = Duration::from_millis(self.config.interval_ms);
        tracing::info!(interval_ms = self.config.interval_ms, "generate reconciler started");

        loop {
            match self.reconcile_once(&cancel).await {
                Ok(report) if report != ReconcileReport::default() => {
                    tracing::info!(
                        completed = report.completed,
                        failed = report.failed,
                        created = report.created,
                        "reconcile pass finished"
                    );
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "reconcile pass aborted"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        tracing::info!("generate reconciler stopped");
    }

    async fn process(&self, mut request: GenerateRequest) -> Result<Processed, RuntimeError> {
        match self.generate(&request).await {
            Ok(created) => {
                request.mark_completed();
                self.store.update(&request).await?;
                tracing::info!(request = %request.name(), created, "generate request completed");
                self.events.record(Event::new(
                    EventKind::PolicyApplied,
                    request.spec.policy.clone(),
                    request.spec.resource.clone(),
                    format!("generated {} resource(s)", created),
                ));
                Ok(Processed::Completed { created })
            }
            Err(RuntimeError::Engine(err)) if !err.is_system() => {
                self.fail(&mut request, err.to_string()).await?;
                Ok(Processed::Failed)
            }
            Err(RuntimeError::PolicyNotFound(name)) => {
                self.fail(&mut request, format!("policy '{}' not found", name))
                    .await?;
                Ok(Processed::Failed)
            }
            Err(err) => Err(err),
        }
    }

    async fn fail(&self, request: &mut GenerateRequest, message: String) -> Result<(), RuntimeError> {
        tracing::warn!(request = %request.name(), reason = %message, "generate request failed");
        request.mark_failed(message.clone());
        self.store.update(request).await?;
        self.events.record(Event::new(
            EventKind::PolicyFailed,
            request.spec.policy.clone(),
            request.spec.resource.clone(),
            message,
        ));
        Ok(())
    }

    /// Create every target of the request. Returns how many were created.
    async fn generate(&self, request: &GenerateRequest) -> Result<usize, RuntimeError> {
        let policy = self
            .policies
            .get(&request.spec.policy)
            .ok_or_else(|| RuntimeError::PolicyNotFound(request.spec.policy.clone()))?;
        check_rule_names(policy)?;

        let Some(trigger) = self.access.get(&request.spec.resource).await? else {
            return Err(EngineError::Configuration(format!(
                "trigger resource {} no longer exists",
                request.spec.resource
            ))
            .into());
        };

        let user_info = &request.spec.context.user_info;
        let admission = AdmissionRequest::new(Operation::Create, trigger.clone(), user_info.clone());
        let ctx = Context::for_admission(&admission).map_err(EngineError::from)?;

        let mut created = 0;
        for rule in &policy.spec.rules {
            let Some(generation) = &rule.generate else {
                continue;
            };
            if !matcher::matches(rule, &trigger, user_info) {
                continue;
            }
            let desired = self.generation.resolve(generation, &trigger, &ctx).await?;
            if self.generation.materialize(&desired).await? {
                created += 1;
            }
        }
        Ok(created)
    }
}
