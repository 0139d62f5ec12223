//! Crate-wide constants

/// Config schema version the pipeline understands. Stored configs with a
/// different version are rejected on update.
pub const CONFIG_SCHEMA_VERSION: &str = "v1";

/// Fuel budget for a single `detect` call into a sandboxed detector.
/// A detector that runs out of fuel traps; the trap is captured as a
/// per-detector error, not a host failure.
pub const DETECT_FUEL: u64 = 50_000_000;

/// Fuel budget for the one-shot `info` call at load time.
pub const INFO_FUEL: u64 = 10_000_000;

/// Hard floor on worker count so a single slow detector cannot serialize
/// the whole pool onto one thread.
pub const MIN_WORKERS: usize = 2;

/// Default bounded capacity of the job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default reconcile interval in seconds.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Idle sleep between queue polls in the worker loop (milliseconds).
pub const WORKER_POLL_INTERVAL_MS: u64 = 20;
