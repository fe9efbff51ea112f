//! Policy statistics.
//!
//! Counters only grow. The orchestrator records each matched rule as soon
//! as it finishes, so a status read at any point reflects every rule that
//! completed, even for evaluations abandoned halfway.

use admiral_core::{PolicyStatus, RuleStats};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::orchestrator::{RuleResponse, RuleStatus};

#[derive(Debug, Default, Clone, Copy)]
struct Average {
    total: Duration,
    samples: u32,
}

impl Average {
    fn add(&mut self, sample: Duration) {
        self.total += sample;
        self.samples = self.samples.saturating_add(1);
    }

    fn render(&self) -> String {
        if self.samples == 0 {
            return String::new();
        }
        format!("{:?}", self.total / self.samples)
    }
}

#[derive(Debug, Default)]
struct RuleCounters {
    name: String,
    execution: Average,
    applied: u64,
    violations: u64,
    mutations: u64,
    failed: u64,
}

#[derive(Debug, Default)]
struct PolicyCounters {
    violations: u64,
    rules_applied: u64,
    blocked: u64,
    mutation: Average,
    validation: Average,
    generation: Average,
    rules: Vec<RuleCounters>,
}

impl PolicyCounters {
    fn rule_mut(&mut self, name: &str) -> &mut RuleCounters {
        let idx = match self.rules.iter().position(|r| r.name == name) {
            Some(idx) => idx,
            None => {
                self.rules.push(RuleCounters {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.rules.len() - 1
            }
        };
        &mut self.rules[idx]
    }
}

/// Shared statistics for every policy the process evaluates.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    policies: Mutex<HashMap<String, PolicyCounters>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one matched rule. Skipped rules are ignored.
    pub fn record_rule(&self, policy: &str, rule: &RuleResponse) {
        if rule.status == RuleStatus::Skipped {
            return;
        }
        let Ok(mut policies) = self.policies.lock() else {
            tracing::warn!(policy, "statistics lock poisoned; dropping sample");
            return;
        };
        let counters = policies.entry(policy.to_string()).or_default();

        if let Some(d) = rule.timings.mutation {
            counters.mutation.add(d);
        }
        if let Some(d) = rule.timings.validation {
            counters.validation.add(d);
        }
        if let Some(d) = rule.timings.generation {
            counters.generation.add(d);
        }
        match rule.status {
            RuleStatus::Pass => counters.rules_applied += 1,
            RuleStatus::Fail => counters.violations += 1,
            RuleStatus::Error | RuleStatus::Skipped => {}
        }

        let stats = counters.rule_mut(&rule.name);
        stats.execution.add(rule.timings.total());
        match rule.status {
            RuleStatus::Pass => stats.applied += 1,
            RuleStatus::Fail => stats.violations += 1,
            RuleStatus::Error => stats.failed += 1,
            RuleStatus::Skipped => {}
        }
        if !rule.patches.is_empty() {
            stats.mutations += 1;
        }
    }

    /// Account for a request denied by the policy.
    pub fn record_blocked(&self, policy: &str) {
        if let Ok(mut policies) = self.policies.lock() {
            policies.entry(policy.to_string()).or_default().blocked += 1;
        }
    }

    /// Current status of `policy`; all zero if it never matched.
    pub fn status(&self, policy: &str) -> PolicyStatus {
        let Ok(policies) = self.policies.lock() else {
            return PolicyStatus::default();
        };
        let Some(counters) = policies.get(policy) else {
            return PolicyStatus::default();
        };

        PolicyStatus {
            violation_count: counters.violations,
            rules_applied_count: counters.rules_applied,
            resources_blocked_count: counters.blocked,
            avg_execution_time_mutation: counters.mutation.render(),
            avg_execution_time_validation: counters.validation.render(),
            avg_execution_time_generation: counters.generation.render(),
            rules: counters
                .rules
                .iter()
                .map(|r| RuleStats {
                    name: r.name.clone(),
                    execution_time: r.execution.render(),
                    applied_count: r.applied,
                    violation_count: r.violations,
                    mutation_count: r.mutations,
                    failed_count: r.failed,
                })
                .collect(),
        }
    }

    /// Names of every policy with recorded statistics, sorted.
    pub fn policies(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .policies
            .lock()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::StageTimings;
    use admiral_policy::PatchOperation;
    use serde_json::json;

    fn response(name: &str, status: RuleStatus, mutated: bool, millis: u64) -> RuleResponse {
        let mut r = RuleResponse {
            name: name.to_string(),
            status,
            message: String::new(),
            patches: Vec::new(),
            generated: Vec::new(),
            timings: StageTimings {
                validation: Some(Duration::from_millis(millis)),
                ..Default::default()
            },
        };
        if mutated {
            r.patches.push(PatchOperation::Add {
                path: "/metadata/labels/a".to_string(),
                value: json!("b"),
            });
            r.timings.mutation = Some(Duration::from_millis(millis));
        }
        r
    }

    #[test]
    fn test_counts_by_outcome() {
        let stats = StatsRegistry::new();
        stats.record_rule("p", &response("r1", RuleStatus::Pass, true, 2));
        stats.record_rule("p", &response("r1", RuleStatus::Pass, false, 4));
        stats.record_rule("p", &response("r2", RuleStatus::Fail, false, 1));
        stats.record_rule("p", &response("r3", RuleStatus::Error, false, 1));
        stats.record_rule("p", &response("r4", RuleStatus::Skipped, false, 1));
        stats.record_blocked("p");

        let status = stats.status("p");
        assert_eq!(status.rules_applied_count, 2);
        assert_eq!(status.violation_count, 1);
        assert_eq!(status.resources_blocked_count, 1);
        assert_eq!(status.rules.len(), 3);

        let r1 = status.rule("r1").unwrap();
        assert_eq!(r1.applied_count, 2);
        assert_eq!(r1.mutation_count, 1);
        // (2ms + 2ms) and 4ms
        assert_eq!(r1.execution_time, "4ms");
        assert_eq!(status.rule("r3").unwrap().failed_count, 1);
        assert!(status.rule("r4").is_none());
        assert_eq!(status.avg_execution_time_mutation, "2ms");
        assert_eq!(status.avg_execution_time_generation, "");
    }

    #[test]
    fn test_unknown_policy_has_empty_status() {
        let stats = StatsRegistry::new();
        assert_eq!(stats.status("nope"), PolicyStatus::default());
        assert!(stats.policies().is_empty());
    }
}
