//! Notifier Boundary
//!
//! One message per distinct notification target for events where a notify
//! rule matched. The `Notifier` trait is the boundary the orchestrator
//! calls; the webhook implementation posts JSON to the target URL.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RpcError;
use crate::logic::detector::{Severity, Threat};
use crate::logic::event::EventSummary;

// ============================================================================
// MESSAGE
// ============================================================================

/// Payload delivered to one notification target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyMessage {
    /// Opaque identifier of the processed event
    pub event_id: Uuid,
    pub summary: EventSummary,
    pub threats: Vec<Threat>,
    pub severity: Severity,
    /// True when a block rule also matched this event
    pub block: bool,
    /// Name of the notify rule that referenced this target
    pub rule_name: String,
}

// ============================================================================
// TRAIT + WEBHOOK IMPLEMENTATION
// ============================================================================

/// External notification boundary
pub trait Notifier: Send + Sync {
    fn notify(&self, target: &str, message: &NotifyMessage) -> Result<(), RpcError>;
}

/// Posts the message as JSON to the target URL
pub struct WebhookNotifier {
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, target: &str, message: &NotifyMessage) -> Result<(), RpcError> {
        let body =
            serde_json::to_string(message).map_err(|e| RpcError::Parse(e.to_string()))?;

        match ureq::post(target)
            .timeout(self.timeout)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(_) => {
                log::debug!("notification delivered to {}", target);
                Ok(())
            }
            Err(ureq::Error::Status(code, _)) => Err(RpcError::Status(code)),
            Err(e) => Err(RpcError::Transport(e.to_string())),
        }
    }
}
