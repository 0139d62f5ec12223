//! Detector Chain
//!
//! Immutable, keyed collection of loaded detector instances. Built once per
//! worker from the active binary set; evaluates every detector against one
//! event and aggregates results. A single failing detector never aborts the
//! chain or the event.

use std::collections::HashSet;

use crate::error::ChainError;
use crate::logic::event::RawEvent;

use super::runtime::{Detector, DetectorLoader};
use super::types::{ChainResult, DetectError, Threat};

// ============================================================================
// CHAIN
// ============================================================================

/// The full set of currently-loaded detectors for one worker.
///
/// Owned exclusively by that worker; no shared-mutation state. Evaluation
/// order is binary load order, which keeps results deterministic for tests
/// even though consumers must not rely on it.
#[derive(Debug)]
pub struct DetectorChain {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorChain {
    /// Load every binary, query its metadata and reject duplicates.
    ///
    /// A duplicate `(id, version)` pair signals a data-integrity bug in the
    /// detector repository, so construction fails hard and the chain is
    /// unusable.
    pub fn build(loader: &dyn DetectorLoader, binaries: &[Vec<u8>]) -> Result<Self, ChainError> {
        let mut detectors: Vec<Box<dyn Detector>> = Vec::with_capacity(binaries.len());
        let mut keys: HashSet<(String, u32)> = HashSet::with_capacity(binaries.len());

        for (index, binary) in binaries.iter().enumerate() {
            let detector = loader
                .load(binary)
                .map_err(|source| ChainError::Load { index, source })?;

            let key = detector.descriptor().key();
            if !keys.insert(key.clone()) {
                return Err(ChainError::DuplicateDetector {
                    id: key.0,
                    version: key.1,
                });
            }
            detectors.push(detector);
        }

        Ok(Self { detectors })
    }

    /// Evaluate every detector against one event.
    ///
    /// Per-detector failures become `errors` entries and evaluation
    /// continues; a severity above `none` contributes exactly one threat.
    pub fn detect(&mut self, event: &RawEvent) -> ChainResult {
        let mut result = ChainResult::default();

        for detector in &mut self.detectors {
            let descriptor = detector.descriptor().clone();
            match detector.detect(event) {
                Ok(verdict) if verdict.severity.is_threat() => {
                    result.threats.push(Threat {
                        detector: descriptor,
                        severity: verdict.severity,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    log::debug!(
                        "detector {} v{} failed: {}",
                        descriptor.id,
                        descriptor.version,
                        err
                    );
                    result.errors.push(DetectError {
                        detector: descriptor,
                        message: err.to_string(),
                    });
                }
            }
        }

        result
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
