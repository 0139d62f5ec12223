//! Detector/Config Repository
//!
//! Durable storage boundary for detector binaries, their content hashes and
//! runtime configs. Used by the reconciler and the update entry points; the
//! embedded SQLite implementation lives in `sqlite`.

pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::error::RepoError;
use crate::logic::config::RuntimeConfig;

pub use sqlite::SqliteRepository;

// ============================================================================
// RECORDS
// ============================================================================

/// One stored detector: id, opaque binary, precomputed content hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorRecord {
    pub id: String,
    pub version: u32,
    pub binary: Vec<u8>,
    pub checksum: String,
}

// ============================================================================
// TRAIT
// ============================================================================

/// Durable storage contract.
///
/// `detector_binaries` and `detector_checksums` return rows ordered by
/// detector id so root hashes computed from either agree across replicas.
pub trait DetectorRepository: Send + Sync {
    /// All stored detectors with their binaries, ordered by id
    fn detector_binaries(&self) -> Result<Vec<DetectorRecord>, RepoError>;

    /// `(id, checksum)` pairs for all stored detectors, ordered by id.
    /// Cheap drift query: no binaries are fetched.
    fn detector_checksums(&self) -> Result<Vec<(String, String)>, RepoError>;

    /// Most recently added runtime config, if any
    fn latest_config(&self) -> Result<Option<RuntimeConfig>, RepoError>;

    /// Store a detector binary; the content hash is computed here
    fn add_detector(&self, id: &str, version: u32, binary: &[u8]) -> Result<(), RepoError>;

    /// Remove a detector; returns whether it existed
    fn remove_detector(&self, id: &str) -> Result<bool, RepoError>;

    /// Append a new runtime config as the latest
    fn add_config(&self, config: &RuntimeConfig) -> Result<(), RepoError>;
}
