//! PodSentry - Runtime Threat Detection Pipeline
//!
//! Kernel-level security events from containerized workloads are evaluated
//! against a hot-reloadable set of sandboxed detector modules, correlated
//! with an external policy engine, and forwarded for notification and
//! historical storage.

pub mod constants;
pub mod error;
pub mod logic;

pub use logic::config::{AgentConfig, HistoryControl, RuntimeConfig};
pub use logic::detector::{
    ChainResult, DetectorChain, DetectorDescriptor, DetectorLoader, Severity, Threat,
    WasmDetectorRuntime,
};
pub use logic::event::{EventSummary, RawEvent};
pub use logic::pool::{JobSinks, PoolOptions, WorkerPool};
pub use logic::reconciler::Reconciler;
