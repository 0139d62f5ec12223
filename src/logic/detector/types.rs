//! Detector Types
//!
//! Descriptor, severity scale and chain result records.
//! No logic here - data structures only.

use serde::{Deserialize, Serialize};

// ============================================================================
// SEVERITY
// ============================================================================

/// Ordered severity scale reported by detectors and policy rules
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// True when the detector actually flagged something
    pub fn is_threat(&self) -> bool {
        *self != Severity::None
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// DESCRIPTOR
// ============================================================================

/// Static metadata of one loaded detector, as reported by its `info` export.
///
/// `(id, version)` is the uniqueness key within a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorDescriptor {
    pub id: String,
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub license: String,
}

impl DetectorDescriptor {
    /// Chain uniqueness key
    pub fn key(&self) -> (String, u32) {
        (self.id.clone(), self.version)
    }
}

// ============================================================================
// DETECT VERDICT (ABI result)
// ============================================================================

/// Result record returned by a detector's `detect` export. Mirrors the
/// descriptor so detectors stay self-describing on the wire; only severity
/// is semantically required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectVerdict {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub contact: String,
    pub severity: Severity,
}

// ============================================================================
// CHAIN RESULT
// ============================================================================

/// One detector that reported severity above `none`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    pub detector: DetectorDescriptor,
    pub severity: Severity,
}

/// One detector whose evaluation failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectError {
    pub detector: DetectorDescriptor,
    pub message: String,
}

/// Output of running one event through a chain. Either list may be empty;
/// order follows binary load order but is not semantically significant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainResult {
    pub threats: Vec<Threat>,
    pub errors: Vec<DetectError>,
}

impl ChainResult {
    pub fn has_threats(&self) -> bool {
        !self.threats.is_empty()
    }

    /// Highest severity among detected threats, `none` when clean
    pub fn max_severity(&self) -> Severity {
        self.threats
            .iter()
            .map(|t| t.severity)
            .max()
            .unwrap_or(Severity::None)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::None < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        let parsed: Severity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, Severity::Critical);
    }

    #[test]
    fn test_max_severity_empty_is_none() {
        assert_eq!(ChainResult::default().max_severity(), Severity::None);
    }

    #[test]
    fn test_max_severity_picks_highest() {
        let result = ChainResult {
            threats: vec![
                Threat {
                    detector: DetectorDescriptor::default(),
                    severity: Severity::Low,
                },
                Threat {
                    detector: DetectorDescriptor::default(),
                    severity: Severity::High,
                },
            ],
            errors: vec![],
        };
        assert_eq!(result.max_severity(), Severity::High);
    }
}
