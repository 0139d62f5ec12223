//! Detector Plugin Runtime
//!
//! Loads detector binaries into isolated WebAssembly sandboxes and drives
//! the two-entry ABI: `info` (static metadata) and `detect` (per-event
//! evaluation). The sandbox imports nothing from the host, so a detector
//! has no ambient capabilities beyond pure computation on the event it is
//! handed. Every call is fuel-metered so a runaway detector traps instead
//! of stalling its worker.
//!
//! ABI: exported `memory`, `alloc(size: i32) -> i32`,
//! `info() -> i64` and `detect(ptr: i32, len: i32) -> i64`, where the
//! returned i64 packs a guest pointer in the high 32 bits and a byte length
//! in the low 32 bits of a JSON payload.

use wasmtime::{Config, Engine, Instance, Memory, Module, Store, TypedFunc};

use crate::constants::{DETECT_FUEL, INFO_FUEL};
use crate::error::DetectorError;
use crate::logic::event::RawEvent;

use super::types::{DetectVerdict, DetectorDescriptor};

// ============================================================================
// CAPABILITY INTERFACE
// ============================================================================

/// Uniform interface over heterogeneous loaded detectors.
///
/// One instance is only ever driven by its owning worker thread, so `detect`
/// takes `&mut self` and needs no internal locking.
pub trait Detector: Send {
    fn descriptor(&self) -> &DetectorDescriptor;
    fn detect(&mut self, event: &RawEvent) -> Result<DetectVerdict, DetectorError>;
}

impl std::fmt::Debug for dyn Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("descriptor", self.descriptor())
            .finish()
    }
}

/// Loads an opaque detector binary into a fresh sandbox instance.
pub trait DetectorLoader: Send + Sync {
    fn load(&self, binary: &[u8]) -> Result<Box<dyn Detector>, DetectorError>;
}

// ============================================================================
// WASM RUNTIME
// ============================================================================

/// Shared compilation engine. Cheap to clone, safe to share across workers;
/// every loaded detector still gets its own store, instance and memory.
pub struct WasmDetectorRuntime {
    engine: Engine,
}

impl WasmDetectorRuntime {
    pub fn new() -> Result<Self, DetectorError> {
        let mut config = Config::new();
        config.consume_fuel(true);

        let engine =
            Engine::new(&config).map_err(|e| DetectorError::BadBinary(e.to_string()))?;
        Ok(Self { engine })
    }
}

impl DetectorLoader for WasmDetectorRuntime {
    fn load(&self, binary: &[u8]) -> Result<Box<dyn Detector>, DetectorError> {
        let module = Module::new(&self.engine, binary)
            .map_err(|e| DetectorError::BadBinary(e.to_string()))?;

        let mut store = Store::new(&self.engine, ());
        store
            .set_fuel(INFO_FUEL)
            .map_err(|e| DetectorError::BadBinary(e.to_string()))?;

        // No imports: detectors get no host capabilities.
        let instance = Instance::new(&mut store, &module, &[]).map_err(|e| {
            DetectorError::Trap {
                call: "instantiate",
                message: e.to_string(),
            }
        })?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(DetectorError::MissingExport("memory"))?;
        let alloc: TypedFunc<i32, i32> = instance
            .get_typed_func(&mut store, "alloc")
            .map_err(|_| DetectorError::MissingExport("alloc"))?;
        let info: TypedFunc<(), i64> = instance
            .get_typed_func(&mut store, "info")
            .map_err(|_| DetectorError::MissingExport("info"))?;
        let detect: TypedFunc<(i32, i32), i64> = instance
            .get_typed_func(&mut store, "detect")
            .map_err(|_| DetectorError::MissingExport("detect"))?;

        let packed = info.call(&mut store, ()).map_err(|e| DetectorError::Trap {
            call: "info",
            message: e.to_string(),
        })?;
        let raw = read_packed(&store, &memory, packed)?;

        let descriptor: DetectorDescriptor =
            serde_json::from_slice(&raw).map_err(|e| DetectorError::BadPayload {
                what: "info",
                message: e.to_string(),
            })?;
        if descriptor.id.is_empty() {
            return Err(DetectorError::BadPayload {
                what: "info",
                message: "empty detector id".to_string(),
            });
        }

        Ok(Box::new(WasmDetector {
            store,
            memory,
            alloc,
            detect,
            descriptor,
        }))
    }
}

/// One loaded detector instance with its own linear memory.
struct WasmDetector {
    store: Store<()>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    detect: TypedFunc<(i32, i32), i64>,
    descriptor: DetectorDescriptor,
}

impl Detector for WasmDetector {
    fn descriptor(&self) -> &DetectorDescriptor {
        &self.descriptor
    }

    fn detect(&mut self, event: &RawEvent) -> Result<DetectVerdict, DetectorError> {
        self.store
            .set_fuel(DETECT_FUEL)
            .map_err(|e| DetectorError::Trap {
                call: "detect",
                message: e.to_string(),
            })?;

        let payload = serde_json::to_vec(event).map_err(|e| DetectorError::BadPayload {
            what: "event",
            message: e.to_string(),
        })?;

        let ptr = self
            .alloc
            .call(&mut self.store, payload.len() as i32)
            .map_err(|e| DetectorError::Trap {
                call: "alloc",
                message: e.to_string(),
            })?;
        if ptr < 0 {
            return Err(DetectorError::MemoryWrite(format!(
                "allocator returned invalid pointer {ptr}"
            )));
        }

        self.memory
            .write(&mut self.store, ptr as usize, &payload)
            .map_err(|e| DetectorError::MemoryWrite(e.to_string()))?;

        let packed = self
            .detect
            .call(&mut self.store, (ptr, payload.len() as i32))
            .map_err(|e| DetectorError::Trap {
                call: "detect",
                message: e.to_string(),
            })?;
        let raw = read_packed(&self.store, &self.memory, packed)?;

        serde_json::from_slice(&raw).map_err(|e| DetectorError::BadPayload {
            what: "detect result",
            message: e.to_string(),
        })
    }
}

// ============================================================================
// MARSHALING
// ============================================================================

/// Decode a packed ptr/len pair and copy the region out of guest memory.
/// Zero-length or out-of-bounds regions are detector bugs surfaced as
/// typed errors, never host panics.
fn read_packed(
    store: &Store<()>,
    memory: &Memory,
    packed: i64,
) -> Result<Vec<u8>, DetectorError> {
    let ptr = (packed as u64 >> 32) as u32;
    let len = (packed as u64 & 0xffff_ffff) as u32;

    if len == 0 {
        return Err(DetectorError::BadResultRegion { ptr, len });
    }

    let end = ptr as u64 + len as u64;
    if end > memory.data_size(store) as u64 {
        return Err(DetectorError::BadResultRegion { ptr, len });
    }

    let mut buf = vec![0u8; len as usize];
    memory
        .read(store, ptr as usize, &mut buf)
        .map_err(|_| DetectorError::BadResultRegion { ptr, len })?;
    Ok(buf)
}

// ============================================================================
// TESTS
// ============================================================================
