//! Job Orchestrator
//!
//! Per-event pipeline: detect -> normalize -> evaluate policy -> decide
//! persistence -> notify. Every failure here is scoped to the one event
//! being processed; other jobs and workers are never affected.

use std::collections::HashSet;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::JobError;
use crate::logic::config::RuntimeConfig;
use crate::logic::detector::{ChainResult, DetectorChain, Severity};
use crate::logic::event::{summarize, RawEvent};
use crate::logic::history::AuditRecord;
use crate::logic::notify::NotifyMessage;
use crate::logic::policy::{ActionDescriptor, MatchedRule, PolicyRequest, PolicyVerdict};

use super::JobSinks;

// ============================================================================
// OUTCOME
// ============================================================================

/// What happened to one processed event, for logging and tests
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub event_id: Uuid,
    pub chain_result: ChainResult,
    pub incident: bool,
    pub severity: Severity,
    pub block: bool,
    pub persisted: bool,
    pub notified_targets: Vec<String>,
    pub block_rule_ids: Vec<String>,
    pub notify_rule_ids: Vec<String>,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Process one event end to end.
///
/// The policy enforcer is only consulted when the chain found threats.
/// Blocking enforcement is recorded via the block flag and rule ids but
/// never executed here.
pub fn run_job(
    chain: &mut DetectorChain,
    event: &RawEvent,
    config: &RwLock<RuntimeConfig>,
    sinks: &JobSinks,
) -> Result<JobOutcome, JobError> {
    let event_id = Uuid::new_v4();

    // 1. Detect
    let chain_result = chain.detect(event);

    // 2. Normalize
    let summary = summarize(event);

    // 3. Policy evaluation, threats only
    let verdict = if chain_result.has_threats() {
        let request = PolicyRequest {
            actor_uid: summary.uid,
            action: ActionDescriptor::from_summary(&summary),
            threat_severities: chain_result.threats.iter().map(|t| t.severity).collect(),
        };
        sinks.policy.evaluate(&request).map_err(JobError::Policy)?
    } else {
        PolicyVerdict::default()
    };

    // A rule can appear via both block and notify lists; collapse to unique
    // sets before computing notification targets and persisted id lists.
    let block_rules = dedup_rules(&verdict.block_rules);
    let notify_rules = dedup_rules(&verdict.notify_rules);
    let block_rule_ids: Vec<String> = block_rules.iter().map(|r| r.id.clone()).collect();
    let notify_rule_ids: Vec<String> = notify_rules.iter().map(|r| r.id.clone()).collect();

    let incident = verdict.is_incident();
    let block = !block_rules.is_empty();
    let severity = chain_result.max_severity().max(verdict.severity);

    // 4. Persistence decision; config is read once per job
    let history_control = config.read().history_control;
    let persisted = history_control.should_persist(chain_result.has_threats());
    if persisted {
        let record = AuditRecord {
            event_id,
            recorded_at: chrono::Utc::now(),
            event: event.clone(),
            chain_result: chain_result.clone(),
            incident,
            severity,
            block_rule_ids: block_rule_ids.clone(),
            notify_rule_ids: notify_rule_ids.clone(),
        };
        sinks.history.publish(&record)?;
    }

    // 5. One notification per distinct target; keep going on a failed
    // target and surface the last error for the job.
    let mut notified_targets = Vec::new();
    let mut notify_failure: Option<JobError> = None;
    let mut seen_targets: HashSet<&str> = HashSet::new();

    for rule in &notify_rules {
        for target in &rule.targets {
            if !seen_targets.insert(target.as_str()) {
                continue;
            }

            let message = NotifyMessage {
                event_id,
                summary: summary.clone(),
                threats: chain_result.threats.clone(),
                severity,
                block,
                rule_name: rule.name.clone(),
            };
            match sinks.notifier.notify(target, &message) {
                Ok(()) => notified_targets.push(target.clone()),
                Err(source) => {
                    log::warn!("notification to {} failed: {}", target, source);
                    notify_failure = Some(JobError::Notify {
                        target: target.clone(),
                        source,
                    });
                }
            }
        }
    }
    if let Some(err) = notify_failure {
        return Err(err);
    }

    Ok(JobOutcome {
        event_id,
        chain_result,
        incident,
        severity,
        block,
        persisted,
        notified_targets,
        block_rule_ids,
        notify_rule_ids,
    })
}

/// Collapse rules with duplicate identifiers, preserving first-seen order
fn dedup_rules(rules: &[MatchedRule]) -> Vec<&MatchedRule> {
    let mut seen = HashSet::new();
    rules
        .iter()
        .filter(|rule| seen.insert(rule.id.as_str()))
        .collect()
}

// ============================================================================
// TEST DOUBLES
// ============================================================================


// ============================================================================
// TESTS
// ============================================================================
