//! Error handling
//!
//! One enum per failure domain, scoped as narrowly as the failure itself:
//! a detector error becomes a chain-result entry, a job error is reported
//! to the queue consumer, and only startup failures are allowed to take
//! the pool down.

use thiserror::Error;

/// Failures loading or calling a single sandboxed detector.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("malformed detector binary: {0}")]
    BadBinary(String),

    #[error("detector is missing required export `{0}`")]
    MissingExport(&'static str),

    #[error("detector trapped during `{call}`: {message}")]
    Trap { call: &'static str, message: String },

    #[error("detector returned an out-of-bounds result (ptr={ptr}, len={len})")]
    BadResultRegion { ptr: u32, len: u32 },

    #[error("detector returned invalid {what}: {message}")]
    BadPayload { what: &'static str, message: String },

    #[error("failed to write event into detector memory: {0}")]
    MemoryWrite(String),
}

/// Failures constructing a detector chain.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("failed to load detector at position {index}: {source}")]
    Load {
        index: usize,
        #[source]
        source: DetectorError,
    },

    #[error("duplicate detector (id={id}, version={version}) in binary set")]
    DuplicateDetector { id: String, version: u32 },
}

/// Failures at the worker-pool boundary.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("initial chain build failed, worker {worker} cannot start: {source}")]
    InitialBuild {
        worker: usize,
        #[source]
        source: ChainError,
    },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error("job queue is full")]
    Backpressure,

    #[error("pool is shut down")]
    ShutDown,

    #[error("config schema version {got:?} does not match expected {expected:?}")]
    ConfigSchema { got: String, expected: String },
}

/// Failures talking to an external RPC collaborator.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("failed to parse response: {0}")]
    Parse(String),
}

/// Failures orchestrating a single job. Scoped to that one event.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("policy evaluation failed: {0}")]
    Policy(#[source] RpcError),

    #[error("history publish failed: {0}")]
    History(String),

    #[error("notification to {target:?} failed: {source}")]
    Notify {
        target: String,
        #[source]
        source: RpcError,
    },
}

/// Failures in the detector/config repository.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(String),

    #[error("detector {0:?} already exists")]
    AlreadyExists(String),

    #[error("stored config is invalid: {0}")]
    BadConfig(String),
}

impl From<rusqlite::Error> for RepoError {
    fn from(err: rusqlite::Error) -> Self {
        RepoError::Database(err.to_string())
    }
}
