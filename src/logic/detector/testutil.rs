//! Test support: in-process fake detectors
//!
//! Chain/pool/orchestrator tests need detectors with scripted behavior
//! (fixed severity, path matching, deliberate failures) without shipping
//! real wasm modules. The fake loader parses a small JSON "binary" format
//! and satisfies the same `DetectorLoader` contract as the wasm runtime.

use serde::{Deserialize, Serialize};

use crate::error::DetectorError;
use crate::logic::event::RawEvent;

use super::runtime::{Detector, DetectorLoader};
use super::types::{DetectVerdict, DetectorDescriptor, Severity};

/// Scripted behavior encoded as the detector "binary"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeSpec {
    pub id: String,
    pub version: u32,
    #[serde(default)]
    pub severity: Severity,
    /// When set, the severity only fires if the event's process binary
    /// path equals this value; everything else reports `none`.
    #[serde(default)]
    pub match_binary_path: Option<String>,
    /// Every `detect` call fails.
    #[serde(default)]
    pub fail_detect: bool,
    /// Loading the binary fails.
    #[serde(default)]
    pub fail_load: bool,
    /// Sleep this long inside every `detect` call.
    #[serde(default)]
    pub delay_ms: u64,
}

pub struct FakeDetector {
    spec: FakeSpec,
    descriptor: DetectorDescriptor,
}

impl Detector for FakeDetector {
    fn descriptor(&self) -> &DetectorDescriptor {
        &self.descriptor
    }

    fn detect(&mut self, event: &RawEvent) -> Result<DetectVerdict, DetectorError> {
        if self.spec.delay_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(self.spec.delay_ms));
        }
        if self.spec.fail_detect {
            return Err(DetectorError::Trap {
                call: "detect",
                message: "scripted failure".to_string(),
            });
        }

        let severity = match &self.spec.match_binary_path {
            Some(path) if *path != event.process.binary_path => Severity::None,
            _ => self.spec.severity,
        };

        Ok(DetectVerdict {
            id: self.spec.id.clone(),
            version: self.spec.version,
            severity,
            ..DetectVerdict::default()
        })
    }
}

pub struct FakeLoader;

impl DetectorLoader for FakeLoader {
    fn load(&self, binary: &[u8]) -> Result<Box<dyn Detector>, DetectorError> {
        let spec: FakeSpec =
            serde_json::from_slice(binary).map_err(|e| DetectorError::BadBinary(e.to_string()))?;
        if spec.fail_load {
            return Err(DetectorError::BadBinary("scripted load failure".to_string()));
        }

        let descriptor = DetectorDescriptor {
            id: spec.id.clone(),
            version: spec.version,
            name: spec.id.clone(),
            ..DetectorDescriptor::default()
        };
        Ok(Box::new(FakeDetector { spec, descriptor }))
    }
}

/// Binary for a detector that always reports `severity`
pub fn fake_binary(id: &str, version: u32, severity: Severity) -> Vec<u8> {
    serde_json::to_vec(&FakeSpec {
        id: id.to_string(),
        version,
        severity,
        match_binary_path: None,
        fail_detect: false,
        fail_load: false,
        delay_ms: 0,
    })
    .expect("fake spec serializes")
}

/// Binary for a detector that flags `severity` only on one binary path
pub fn fake_matching_binary(id: &str, version: u32, severity: Severity, path: &str) -> Vec<u8> {
    serde_json::to_vec(&FakeSpec {
        id: id.to_string(),
        version,
        severity,
        match_binary_path: Some(path.to_string()),
        fail_detect: false,
        fail_load: false,
        delay_ms: 0,
    })
    .expect("fake spec serializes")
}

/// Binary for a detector whose every `detect` call errors
pub fn fake_failing_binary(id: &str, version: u32) -> Vec<u8> {
    serde_json::to_vec(&FakeSpec {
        id: id.to_string(),
        version,
        severity: Severity::None,
        match_binary_path: None,
        fail_detect: true,
        fail_load: false,
        delay_ms: 0,
    })
    .expect("fake spec serializes")
}

/// Binary that fails at load time
pub fn fake_unloadable_binary(id: &str) -> Vec<u8> {
    serde_json::to_vec(&FakeSpec {
        id: id.to_string(),
        version: 1,
        severity: Severity::None,
        match_binary_path: None,
        fail_detect: false,
        fail_load: true,
        delay_ms: 0,
    })
    .expect("fake spec serializes")
}

/// Binary for a detector that sleeps inside every `detect` call
pub fn fake_slow_binary(id: &str, version: u32, delay_ms: u64) -> Vec<u8> {
    serde_json::to_vec(&FakeSpec {
        id: id.to_string(),
        version,
        severity: Severity::None,
        match_binary_path: None,
        fail_detect: false,
        fail_load: false,
        delay_ms,
    })
    .expect("fake spec serializes")
}
