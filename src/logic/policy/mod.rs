//! Policy Enforcer Boundary
//!
//! The policy engine is an external RPC collaborator. This module owns the
//! request/response types and the `PolicyEnforcer` trait the orchestrator
//! calls, plus an HTTP client implementation.
//!
//! Blocking enforcement is not performed here: a matched block rule is
//! recorded and forwarded, the isolation action itself is an external
//! responsibility.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RpcError;
use crate::logic::detector::Severity;
use crate::logic::event::EventSummary;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Where the event happened, as the policy engine scopes its rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
    pub node_name: String,
    pub image: String,
    pub registry: String,
    pub binary_path: String,
}

impl ActionDescriptor {
    pub fn from_summary(summary: &EventSummary) -> Self {
        Self {
            namespace: summary.namespace.clone(),
            pod_name: summary.pod_name.clone(),
            container_name: summary.container_name.clone(),
            node_name: summary.node_name.clone(),
            image: summary.image.clone(),
            registry: summary.registry.clone(),
            binary_path: summary.binary_path.clone(),
        }
    }
}

/// Evaluation request: who did what, and how bad the detectors think it is
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRequest {
    /// Actor identity (uid of the subject process)
    pub actor_uid: u32,
    pub action: ActionDescriptor,
    /// One severity per detected threat
    pub threat_severities: Vec<Severity>,
}

/// One rule the policy engine matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    /// Notification targets referenced by this rule (notify rules only)
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Matched rule sets split into block/notify, plus the resulting severity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub block_rules: Vec<MatchedRule>,
    pub notify_rules: Vec<MatchedRule>,
    pub severity: Severity,
}

impl PolicyVerdict {
    /// An incident is any event where at least one rule matched
    pub fn is_incident(&self) -> bool {
        !self.block_rules.is_empty() || !self.notify_rules.is_empty()
    }
}

// ============================================================================
// TRAIT + HTTP CLIENT
// ============================================================================

/// External policy engine boundary
pub trait PolicyEnforcer: Send + Sync {
    fn evaluate(&self, request: &PolicyRequest) -> Result<PolicyVerdict, RpcError>;
}

/// HTTP client for a remote policy enforcer
pub struct HttpPolicyClient {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpPolicyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl PolicyEnforcer for HttpPolicyClient {
    fn evaluate(&self, request: &PolicyRequest) -> Result<PolicyVerdict, RpcError> {
        let url = format!("{}/api/v1/policy/evaluate", self.base_url);
        let body =
            serde_json::to_string(request).map_err(|e| RpcError::Parse(e.to_string()))?;

        let mut req = ureq::post(&url)
            .timeout(self.timeout)
            .set("Content-Type", "application/json");
        if let Some(token) = &self.token {
            req = req.set("Authorization", &format!("Bearer {}", token));
        }

        match req.send_string(&body) {
            Ok(resp) => {
                let text = resp
                    .into_string()
                    .map_err(|e| RpcError::Transport(e.to_string()))?;
                serde_json::from_str(&text).map_err(|e| RpcError::Parse(e.to_string()))
            }
            Err(ureq::Error::Status(code, _)) => Err(RpcError::Status(code)),
            Err(e) => Err(RpcError::Transport(e.to_string())),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_incident_flag() {
        assert!(!PolicyVerdict::default().is_incident());

        let verdict = PolicyVerdict {
            block_rules: vec![],
            notify_rules: vec![MatchedRule {
                id: "r1".to_string(),
                name: "notify security".to_string(),
                severity: Severity::High,
                targets: vec!["https://hooks.internal/sec".to_string()],
            }],
            severity: Severity::High,
        };
        assert!(verdict.is_incident());
    }

    #[test]
    fn test_verdict_parses_without_targets() {
        // Block rules come back without a targets field
        let verdict: PolicyVerdict = serde_json::from_str(
            r#"{
                "block_rules": [{"id": "b1", "name": "block ncat", "severity": "critical"}],
                "notify_rules": [],
                "severity": "critical"
            }"#,
        )
        .unwrap();
        assert_eq!(verdict.block_rules[0].id, "b1");
        assert!(verdict.block_rules[0].targets.is_empty());
    }
}
