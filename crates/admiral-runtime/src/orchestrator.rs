//! Rule orchestration.
//!
//! One evaluation walks a policy's rules in order. Per rule:
//!
//! ```text
//! Start ─► Skipped
//!   └───► Matched ─► Mutated? ─► Validated? ─► Generated? ─► Done
//! ```
//!
//! Mutations accumulate: each rule sees the resource as left by the rules
//! before it. Every rule runs even after an enforcing failure so that the
//! statistics are complete; the deny decision is taken at the end.
//! A rule whose mutation errors is still validated against the unmutated
//! resource. Generate requests are only queued once the whole request is
//! allowed.

use admiral_core::{
    AdmissionRequest, EngineConfig, GenerateRequest, Operation, Policy, PolicyViolation,
    ResourceFilter, ResourceSpec, Rule, RuleType, ValidationFailureAction, ViolatedRule,
};
use admiral_policy::generate::{self, GenerateSource};
use admiral_policy::{Context, ContextError, EngineError, PatchOperation, check_rule_names, matcher};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancel::CancelToken;
use crate::error::RuntimeError;
use crate::events::{Event, EventKind, EventSink};
use crate::stats::StatsRegistry;
use crate::store::GenerateRequestStore;

/// Whether the evaluation serves a live admission request or a pass over
/// existing resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    Admission,
    /// Policies with `background: false` are skipped.
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    /// Did not match; excluded from all counts.
    Skipped,
    Pass,
    /// Validation failed.
    Fail,
    /// The rule could not be evaluated.
    Error,
}

/// Time spent in each stage of one rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub mutation: Option<Duration>,
    pub validation: Option<Duration>,
    pub generation: Option<Duration>,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        [self.mutation, self.validation, self.generation]
            .into_iter()
            .flatten()
            .sum()
    }
}

/// Where a generated resource's body comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentSource {
    Data,
    Clone(ResourceSpec),
}

/// A child resource a generate rule asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateIntent {
    pub rule: String,
    pub target: ResourceSpec,
    pub source: IntentSource,
}

#[derive(Debug, Clone)]
pub struct RuleResponse {
    pub name: String,
    pub status: RuleStatus,
    pub message: String,
    pub patches: Vec<PatchOperation>,
    pub generated: Vec<GenerateIntent>,
    pub timings: StageTimings,
}

impl RuleResponse {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: RuleStatus::Pass,
            message: String::new(),
            patches: Vec::new(),
            generated: Vec::new(),
            timings: StageTimings::default(),
        }
    }

    fn skipped(name: &str) -> Self {
        Self {
            status: RuleStatus::Skipped,
            ..Self::new(name)
        }
    }

    /// A validation failure outranks errors from the other stages.
    fn record_error(&mut self, err: &EngineError, messages: &mut Vec<String>) {
        if self.status != RuleStatus::Fail {
            self.status = RuleStatus::Error;
        }
        messages.push(err.to_string());
    }
}

/// Result of evaluating one policy against one request.
#[derive(Debug, Clone)]
pub struct PolicyResponse {
    pub policy: String,
    pub resource: ResourceSpec,
    pub action: ValidationFailureAction,
    /// The resource after all mutations of this policy.
    pub patched: Value,
    /// Mutations in application order.
    pub patches: Vec<PatchOperation>,
    pub rules: Vec<RuleResponse>,
    /// Set for audit-mode validation failures.
    pub violation: Option<PolicyViolation>,
    /// Newly queued generate request, if any.
    pub generate_request: Option<GenerateRequest>,
    /// The resource was filtered out or the policy does not run in this mode.
    pub skipped: bool,
}

impl PolicyResponse {
    fn new(policy: &Policy, resource: ResourceSpec, patched: Value) -> Self {
        Self {
            policy: policy.name().to_string(),
            resource,
            action: policy.spec.validation_failure_action,
            patched,
            patches: Vec::new(),
            rules: Vec::new(),
            violation: None,
            generate_request: None,
            skipped: false,
        }
    }

    pub fn rule(&self, name: &str) -> Option<&RuleResponse> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn failed_rules(&self) -> impl Iterator<Item = &RuleResponse> {
        self.rules.iter().filter(|r| r.status == RuleStatus::Fail)
    }

    /// Whether an enforcing validation failed.
    pub fn is_blocked(&self) -> bool {
        self.action == ValidationFailureAction::Enforce && self.failed_rules().next().is_some()
    }

    pub fn intents(&self) -> impl Iterator<Item = &GenerateIntent> {
        self.rules.iter().flat_map(|r| r.generated.iter())
    }
}

/// Aggregate decision over several policies.
#[derive(Debug, Clone)]
pub struct AdmissionResponse {
    pub allowed: bool,
    /// Enforcing failure messages, one per failed rule.
    pub message: String,
    pub patched: Value,
    pub patches: Vec<PatchOperation>,
    pub policies: Vec<PolicyResponse>,
}

pub struct Orchestrator {
    engine: EngineConfig,
    filters: Vec<ResourceFilter>,
    stats: Arc<StatsRegistry>,
    store: Arc<dyn GenerateRequestStore>,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    pub fn new(
        engine: EngineConfig,
        store: Arc<dyn GenerateRequestStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            engine,
            filters: Vec::new(),
            stats: Arc::new(StatsRegistry::new()),
            store,
            events,
        }
    }

    /// Resources matching any filter are never evaluated.
    pub fn with_filters(mut self, filters: Vec<ResourceFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_stats(mut self, stats: Arc<StatsRegistry>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    /// Evaluate every policy in order, threading the mutated resource from
    /// one policy to the next. Denies if any policy blocks; generate
    /// requests are queued only when the request is allowed.
    pub async fn admit(
        &self,
        policies: &[Policy],
        request: &AdmissionRequest,
        mode: EvaluationMode,
        cancel: &CancelToken,
    ) -> Result<AdmissionResponse, RuntimeError> {
        for policy in policies {
            check_rule_names(policy)?;
        }

        let mut current = request.clone();
        let mut patches = Vec::new();
        let mut responses = Vec::with_capacity(policies.len());
        let mut denials = Vec::new();

        for policy in policies {
            let response = self.run_policy(policy, &current, mode, cancel)?;
            if response.is_blocked() {
                denials.extend(
                    response
                        .failed_rules()
                        .map(|r| format!("{}/{}: {}", response.policy, r.name, r.message)),
                );
            }
            patches.extend(response.patches.iter().cloned());
            current.resource = response.patched.clone();
            responses.push(response);
        }

        let allowed = denials.is_empty();
        for (policy, response) in policies.iter().zip(responses.iter_mut()) {
            if allowed {
                self.queue_generation(policy, request, response).await?;
            } else if response.intents().next().is_some() {
                tracing::debug!(
                    policy = %policy.name(),
                    resource = %response.resource,
                    "request denied; generation dropped"
                );
            }
        }

        Ok(AdmissionResponse {
            allowed,
            message: denials.join("\n"),
            patched: current.resource,
            patches,
            policies: responses,
        })
    }

    /// Evaluate one policy against one request, queueing generation when
    /// the policy does not block it.
    ///
    /// Rule-scoped failures are recorded in the response; an `Err` means
    /// the evaluation itself could not complete (malformed policy,
    /// cancellation, store failure). Statistics for rules already run are
    /// kept either way.
    pub async fn evaluate(
        &self,
        policy: &Policy,
        request: &AdmissionRequest,
        mode: EvaluationMode,
        cancel: &CancelToken,
    ) -> Result<PolicyResponse, RuntimeError> {
        check_rule_names(policy)?;
        let mut response = self.run_policy(policy, request, mode, cancel)?;
        if !response.is_blocked() {
            self.queue_generation(policy, request, &mut response).await?;
        }
        Ok(response)
    }

    fn run_policy(
        &self,
        policy: &Policy,
        request: &AdmissionRequest,
        mode: EvaluationMode,
        cancel: &CancelToken,
    ) -> Result<PolicyResponse, RuntimeError> {
        let resource = request.resource_spec();
        let mut response = PolicyResponse::new(policy, resource.clone(), request.resource.clone());

        if self.filters.iter().any(|f| f.matches(&resource)) {
            tracing::debug!(policy = %policy.name(), resource = %resource, "resource filtered out");
            response.skipped = true;
            return Ok(response);
        }
        if mode == EvaluationMode::Background && !policy.spec.background {
            tracing::debug!(policy = %policy.name(), "policy does not run in background");
            response.skipped = true;
            return Ok(response);
        }

        let started = Instant::now();
        let mut ctx = context_for(request, &response.patched).map_err(EngineError::from)?;

        for rule in &policy.spec.rules {
            if cancel.is_cancelled() {
                tracing::info!(policy = %policy.name(), rule = %rule.name, "evaluation cancelled");
                return Err(RuntimeError::Cancelled);
            }

            if !matcher::matches(rule, &response.patched, &request.request_info) {
                tracing::trace!(policy = %policy.name(), rule = %rule.name, "rule skipped");
                response.rules.push(RuleResponse::skipped(&rule.name));
                continue;
            }

            let rule_response = self.apply_rule(rule, request, &mut response.patched, &mut ctx);
            self.stats.record_rule(policy.name(), &rule_response);
            self.emit(policy, &resource, &rule_response);

            response.patches.extend(rule_response.patches.iter().cloned());
            response.rules.push(rule_response);
        }

        if response.is_blocked() {
            self.stats.record_blocked(policy.name());
            self.events.record(Event::new(
                EventKind::RequestBlocked,
                policy.name(),
                resource.clone(),
                format!("{} {} blocked", request.operation, resource),
            ));
        } else {
            self.record_violation(policy, &mut response);
        }

        tracing::debug!(
            policy = %policy.name(),
            resource = %resource,
            rules = response.rules.len(),
            blocked = response.is_blocked(),
            elapsed = ?started.elapsed(),
            "policy evaluated"
        );
        Ok(response)
    }

    fn apply_rule(
        &self,
        rule: &Rule,
        request: &AdmissionRequest,
        resource: &mut Value,
        ctx: &mut Context,
    ) -> RuleResponse {
        let mut out = RuleResponse::new(&rule.name);
        let mut messages = Vec::new();

        if let Some(mutation) = rule.mutate.as_ref().filter(|m| !m.is_empty()) {
            let start = Instant::now();
            let result = admiral_policy::mutate(resource, mutation, ctx, &self.engine);
            out.timings.mutation = Some(start.elapsed());
            // On error the resource stays as it was and validation still runs.
            match result {
                Ok(outcome) if outcome.is_unchanged() => {}
                Ok(outcome) => match context_for(request, &outcome.resource) {
                    Ok(updated) => {
                        messages.push(format!("{} patch operation(s)", outcome.patches.len()));
                        *resource = outcome.resource;
                        *ctx = updated;
                        out.patches = outcome.patches;
                    }
                    Err(err) => out.record_error(&err.into(), &mut messages),
                },
                Err(err) => out.record_error(&err, &mut messages),
            }
        }

        if let Some(validation) = rule.validate.as_ref().filter(|v| !v.is_empty()) {
            let start = Instant::now();
            let result = admiral_policy::validate(resource, validation, ctx, &self.engine);
            out.timings.validation = Some(start.elapsed());
            match result {
                Ok(outcome) => {
                    if !outcome.passed {
                        out.status = RuleStatus::Fail;
                    }
                    messages.push(outcome.message);
                }
                Err(err) => out.record_error(&err, &mut messages),
            }
        }

        if let Some(generation) = &rule.generate {
            if request.operation == Operation::Create && out.status == RuleStatus::Pass {
                let start = Instant::now();
                let result = resolve_intent(&rule.name, generation, resource, ctx);
                out.timings.generation = Some(start.elapsed());
                match result {
                    Ok(intent) => {
                        messages.push(format!("generate {}", intent.target));
                        out.generated.push(intent);
                    }
                    Err(err) => out.record_error(&err, &mut messages),
                }
            }
        }

        out.message = messages.join("; ");
        out
    }

    fn emit(&self, policy: &Policy, resource: &ResourceSpec, rule: &RuleResponse) {
        let kind = match rule.status {
            RuleStatus::Skipped => return,
            RuleStatus::Pass => EventKind::PolicyApplied,
            RuleStatus::Fail => EventKind::PolicyViolation,
            RuleStatus::Error => EventKind::PolicyFailed,
        };
        self.events.record(
            Event::new(kind, policy.name(), resource.clone(), rule.message.clone())
                .with_rule(rule.name.clone()),
        );
    }

    fn record_violation(&self, policy: &Policy, response: &mut PolicyResponse) {
        let rules: Vec<ViolatedRule> = response
            .failed_rules()
            .map(|r| ViolatedRule {
                name: r.name.clone(),
                rule_type: RuleType::Validation,
                message: r.message.clone(),
                managed_resource: Default::default(),
            })
            .collect();
        if rules.is_empty() {
            return;
        }
        tracing::info!(
            policy = %policy.name(),
            resource = %response.resource,
            rules = rules.len(),
            "policy violation recorded"
        );
        response.violation = Some(PolicyViolation::new(
            policy.name(),
            response.resource.clone(),
            rules,
        ));
    }

    async fn queue_generation(
        &self,
        policy: &Policy,
        request: &AdmissionRequest,
        response: &mut PolicyResponse,
    ) -> Result<(), RuntimeError> {
        if response.intents().next().is_none() {
            return Ok(());
        }
        let candidate = GenerateRequest::pending(
            policy.name(),
            response.resource.clone(),
            request.request_info.clone(),
        );
        if let Some(queued) = self.store.enqueue_if_absent(candidate).await? {
            tracing::info!(
                policy = %policy.name(),
                resource = %response.resource,
                request = %queued.name(),
                "generate request queued"
            );
            response.generate_request = Some(queued);
        }
        Ok(())
    }
}

/// Check a generate rule against the current resource and describe the
/// child it asks for. Clone sources are fetched later by the reconciler.
fn resolve_intent(
    rule: &str,
    generation: &admiral_core::Generation,
    resource: &Value,
    ctx: &Context,
) -> Result<GenerateIntent, EngineError> {
    let target = generate::target(generation, resource, ctx)?;
    let source = match generate::source(generation)? {
        GenerateSource::Data(data) => {
            generate::body_from_data(data, &target, ctx)?;
            IntentSource::Data
        }
        GenerateSource::Clone(clone) => {
            IntentSource::Clone(generate::clone_source(generation, clone, ctx)?)
        }
    };
    Ok(GenerateIntent {
        rule: rule.to_string(),
        target,
        source,
    })
}

/// Context for a request whose resource has been replaced by `resource`.
pub(crate) fn context_for(request: &AdmissionRequest, resource: &Value) -> Result<Context, ContextError> {
    let mut snapshot =
        AdmissionRequest::new(request.operation, resource.clone(), request.request_info.clone());
    snapshot.old_resource = request.old_resource.clone();
    Context::for_admission(&snapshot)
}
