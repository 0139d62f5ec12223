//! Logic Module - Detection Pipeline Engines
//!
//! - `detector/` - sandbox runtime, chain, content hashing
//! - `event/` - raw event model and normalizer
//! - `pool/` - worker pool and per-job orchestration
//! - `policy/`, `notify/`, `history/` - external collaborator boundaries
//! - `repo/` - durable detector/config storage
//! - `reconciler` - background drift convergence

pub mod config;
pub mod detector;
pub mod event;
pub mod history;
pub mod notify;
pub mod policy;
pub mod pool;
pub mod reconciler;
pub mod repo;
