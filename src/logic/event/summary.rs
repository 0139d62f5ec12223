//! Event Normalizer
//!
//! Flattens a raw kernel event into the serializable summary record used by
//! policy evaluation, notification and audit. Derived once per job, then
//! immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::RawEvent;

// ============================================================================
// EVENT SUMMARY
// ============================================================================

/// Flat view of one raw event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_type: String,
    pub node_name: String,

    // Workload identity
    pub namespace: String,
    pub pod_name: String,
    pub container_id: String,
    pub container_name: String,
    pub image: String,
    pub registry: String,

    // Subject process
    pub pid: u32,
    pub uid: u32,
    pub binary_path: String,
    pub arguments: Vec<String>,
    pub capabilities: Vec<String>,
    pub setuid: bool,
    pub setgid: bool,

    // Parent process (zeroed/empty when unknown)
    pub parent_pid: u32,
    pub parent_uid: u32,
    pub parent_binary_path: String,
    pub parent_arguments: Vec<String>,
    pub parent_capabilities: Vec<String>,
    pub parent_setuid: bool,
    pub parent_setgid: bool,

    // Kernel call details (empty for exec/exit events)
    pub kernel_function: String,
    pub kernel_arguments: Vec<String>,
    pub kernel_return_value: i64,

    pub registered_at: DateTime<Utc>,
}

/// Build the flat summary from a raw event.
///
/// Events arriving without a node name (single-node deployments) are
/// attributed to the local host.
pub fn summarize(event: &RawEvent) -> EventSummary {
    let parent = event.parent.clone().unwrap_or_default();
    let kernel = event.kernel.clone().unwrap_or_default();
    let node_name = if event.node_name.is_empty() {
        local_node_name()
    } else {
        event.node_name.clone()
    };

    EventSummary {
        event_type: event.kind.as_str().to_string(),
        node_name,

        namespace: event.workload.namespace.clone(),
        pod_name: event.workload.pod_name.clone(),
        container_id: event.workload.container_id.clone(),
        container_name: event.workload.container_name.clone(),
        image: event.workload.image.clone(),
        registry: event.workload.registry.clone(),

        pid: event.process.pid,
        uid: event.process.uid,
        binary_path: event.process.binary_path.clone(),
        arguments: event.process.arguments.clone(),
        capabilities: event.process.capabilities.clone(),
        setuid: event.process.setuid,
        setgid: event.process.setgid,

        parent_pid: parent.pid,
        parent_uid: parent.uid,
        parent_binary_path: parent.binary_path,
        parent_arguments: parent.arguments,
        parent_capabilities: parent.capabilities,
        parent_setuid: parent.setuid,
        parent_setgid: parent.setgid,

        kernel_function: kernel.function,
        kernel_arguments: kernel.arguments,
        kernel_return_value: kernel.return_value,

        registered_at: event.observed_at,
    }
}

/// Node name for events that arrive without one
pub fn local_node_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

// ============================================================================
// TESTS
// ============================================================================
