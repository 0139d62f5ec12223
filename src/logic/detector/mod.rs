//! Detector Subsystem
//!
//! - `types` - descriptor, severity scale, chain results
//! - `hash` - content hashing of binaries and of the active set
//! - `runtime` - the sandboxed plugin runtime (wasm host embedding)
//! - `chain` - per-worker chain of loaded detectors

pub mod chain;
pub mod hash;
pub mod runtime;
pub mod types;

#[cfg(test)]
pub mod testutil;

pub use chain::DetectorChain;
pub use runtime::{Detector, DetectorLoader, WasmDetectorRuntime};
pub use types::{ChainResult, DetectError, DetectVerdict, DetectorDescriptor, Severity, Threat};
