//! Raw Event Types
//!
//! Mirror of the upstream kernel-event schema (process exec/exit, kprobe,
//! tracepoint variants). No logic here - data structures only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// EVENT KIND
// ============================================================================

/// Kind of kernel event delivered by the upstream source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProcessExec,
    ProcessExit,
    Kprobe,
    Tracepoint,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ProcessExec => "process_exec",
            EventKind::ProcessExit => "process_exit",
            EventKind::Kprobe => "kprobe",
            EventKind::Tracepoint => "tracepoint",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// IDENTITIES
// ============================================================================

/// Workload (pod/container/image) identity of the event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadIdentity {
    pub namespace: String,
    pub pod_name: String,
    pub container_id: String,
    pub container_name: String,
    pub image: String,
    pub registry: String,
}

/// Process identity, used for both the subject process and its parent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub uid: u32,
    pub binary_path: String,
    pub arguments: Vec<String>,
    /// Effective capability set, e.g. ["CAP_NET_ADMIN"]
    pub capabilities: Vec<String>,
    pub setuid: bool,
    pub setgid: bool,
}

/// Kernel function call details, present for kprobe/tracepoint events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelCall {
    pub function: String,
    pub arguments: Vec<String>,
    pub return_value: i64,
}

// ============================================================================
// RAW EVENT
// ============================================================================

/// One raw event as delivered by the upstream job source.
///
/// This is the payload handed to detectors (serialized) and the record
/// persisted by the history sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventKind,
    pub node_name: String,
    pub workload: WorkloadIdentity,
    pub process: ProcessIdentity,
    pub parent: Option<ProcessIdentity>,
    pub kernel: Option<KernelCall>,
    pub observed_at: DateTime<Utc>,
}

impl RawEvent {
    /// Minimal constructor used by tests and the upstream adapter.
    pub fn new(kind: EventKind, node_name: impl Into<String>) -> Self {
        Self {
            kind,
            node_name: node_name.into(),
            workload: WorkloadIdentity::default(),
            process: ProcessIdentity::default(),
            parent: None,
            kernel: None,
            observed_at: Utc::now(),
        }
    }
}
