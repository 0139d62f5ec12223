//! Runtime & Agent Configuration
//!
//! `RuntimeConfig` is the versioned, hot-swappable record held by the worker
//! pool. `AgentConfig` is the process-level configuration read from the
//! environment at startup.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_SCHEMA_VERSION, DEFAULT_QUEUE_CAPACITY, DEFAULT_RECONCILE_INTERVAL_SECS, MIN_WORKERS,
};

// ============================================================================
// HISTORY CONTROL
// ============================================================================

/// Governs whether a processed event is persisted to the history sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryControl {
    /// Never persist
    None,
    /// Persist every processed event
    All,
    /// Persist only events with at least one detected threat
    #[default]
    WithThreats,
}

impl HistoryControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryControl::None => "none",
            HistoryControl::All => "all",
            HistoryControl::WithThreats => "with_threats",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(HistoryControl::None),
            "all" => Some(HistoryControl::All),
            "with_threats" => Some(HistoryControl::WithThreats),
            _ => None,
        }
    }

    /// Persistence decision for one processed event
    pub fn should_persist(&self, has_threats: bool) -> bool {
        match self {
            HistoryControl::None => false,
            HistoryControl::All => true,
            HistoryControl::WithThreats => has_threats,
        }
    }
}

impl std::fmt::Display for HistoryControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RUNTIME CONFIG
// ============================================================================

/// Versioned pipeline configuration. Replaced wholesale on update; the pool
/// rejects records whose schema version it does not understand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub schema_version: String,
    pub history_control: HistoryControl,
}

impl RuntimeConfig {
    pub fn new(history_control: HistoryControl) -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            history_control,
        }
    }

    pub fn schema_matches(&self) -> bool {
        self.schema_version == CONFIG_SCHEMA_VERSION
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(HistoryControl::default())
    }
}

// ============================================================================
// AGENT CONFIG
// ============================================================================

/// Process-level configuration, read from environment with fallbacks
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Worker count; `None` means auto (available parallelism)
    pub workers: Option<usize>,
    /// Bounded job queue capacity
    pub queue_capacity: usize,
    /// Reconcile interval in seconds
    pub reconcile_interval_secs: u64,
    /// Path of the detector/config repository database
    pub db_path: String,
    /// Policy enforcer endpoint
    pub policy_url: String,
    /// History sink directory
    pub history_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workers: std::env::var("PODSENTRY_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok()),
            queue_capacity: std::env::var("PODSENTRY_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            reconcile_interval_secs: std::env::var("PODSENTRY_RECONCILE_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
            db_path: std::env::var("PODSENTRY_DB_PATH")
                .unwrap_or_else(|_| "podsentry.db".to_string()),
            policy_url: std::env::var("PODSENTRY_POLICY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9110".to_string()),
            history_dir: std::env::var("PODSENTRY_HISTORY_DIR")
                .unwrap_or_else(|_| "history".to_string()),
        }
    }
}

impl AgentConfig {
    /// Effective worker count: configured value or available parallelism,
    /// never below the hard floor.
    pub fn effective_workers(&self) -> usize {
        let auto = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(MIN_WORKERS);
        self.workers.unwrap_or(auto).max(MIN_WORKERS)
    }
}

// ============================================================================
// TESTS
// ============================================================================
