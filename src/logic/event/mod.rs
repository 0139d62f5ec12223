//! Event Model & Normalizer
//!
//! - `types` - raw kernel event schema (exec/exit, kprobe, tracepoint)
//! - `summary` - flat `EventSummary` consumed by policy/notify/audit

pub mod summary;
pub mod types;

pub use summary::{summarize, EventSummary};
pub use types::{EventKind, KernelCall, ProcessIdentity, RawEvent, WorkloadIdentity};
