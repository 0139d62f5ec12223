//! Worker Pool
//!
//! Owns the bounded job queue, the worker threads (each with its own
//! detector chain) and the two pieces of shared mutable state: the active
//! binary set and the active runtime config, each behind its own
//! read/write lock and always swapped wholesale. Multiple pools can
//! coexist in one process; nothing here is global.

pub mod orchestrator;
pub mod worker;

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::constants::{CONFIG_SCHEMA_VERSION, DEFAULT_QUEUE_CAPACITY, MIN_WORKERS};
use crate::error::PoolError;
use crate::logic::config::RuntimeConfig;
use crate::logic::detector::{hash, DetectorChain, DetectorLoader};
use crate::logic::event::RawEvent;
use crate::logic::history::HistorySink;
use crate::logic::notify::Notifier;
use crate::logic::policy::PolicyEnforcer;

pub use orchestrator::JobOutcome;
pub use worker::WorkerState;

pub(crate) type JobReceiver = Receiver<RawEvent>;

// ============================================================================
// BINARY SET
// ============================================================================

/// The ordered collection of active detector binaries plus its root hash
#[derive(Debug, Clone, Default)]
pub struct BinarySet {
    pub binaries: Vec<Vec<u8>>,
    pub root_hash: String,
}

impl BinarySet {
    pub fn new(binaries: Vec<Vec<u8>>) -> Self {
        let root_hash = hash::root_hash_of_binaries(&binaries);
        Self { binaries, root_hash }
    }
}

// ============================================================================
// SINKS & OPTIONS
// ============================================================================

/// External collaborators the orchestrator calls per job
pub struct JobSinks {
    pub policy: Arc<dyn PolicyEnforcer>,
    pub history: Arc<dyn HistorySink>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Worker count; `None` means auto (available parallelism)
    pub workers: Option<usize>,
    pub queue_capacity: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PoolOptions {
    fn effective_workers(&self) -> usize {
        let auto = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(MIN_WORKERS);
        self.workers.unwrap_or(auto).max(MIN_WORKERS)
    }
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Default)]
pub(crate) struct PoolCounters {
    pub jobs_processed: AtomicU64,
    pub job_errors: AtomicU64,
    pub rebuilds: AtomicU64,
    pub rebuild_failures: AtomicU64,
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub jobs_processed: u64,
    pub job_errors: u64,
    pub rebuilds: u64,
    pub rebuild_failures: u64,
    pub root_hash: String,
}

// ============================================================================
// SHARED STATE
// ============================================================================

pub(crate) struct SharedState {
    pub binary_set: RwLock<BinarySet>,
    pub config: RwLock<RuntimeConfig>,
    pub rebuild_flags: Vec<AtomicBool>,
    pub shutdown: AtomicBool,
    pub worker_states: Vec<AtomicU8>,
    pub stats: PoolCounters,
}

// ============================================================================
// POOL
// ============================================================================

pub struct WorkerPool {
    job_tx: SyncSender<RawEvent>,
    shared: Arc<SharedState>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Build the initial chains and start the workers.
    ///
    /// There is no usable worker without at least a valid initial chain, so
    /// any initial build failure fails pool startup.
    pub fn start(
        options: PoolOptions,
        loader: Arc<dyn DetectorLoader>,
        initial_binaries: Vec<Vec<u8>>,
        initial_config: RuntimeConfig,
        sinks: JobSinks,
    ) -> Result<Self, PoolError> {
        if !initial_config.schema_matches() {
            return Err(PoolError::ConfigSchema {
                got: initial_config.schema_version,
                expected: CONFIG_SCHEMA_VERSION.to_string(),
            });
        }

        let workers = options.effective_workers();
        let binary_set = BinarySet::new(initial_binaries);

        let mut chains = Vec::with_capacity(workers);
        for worker in 0..workers {
            let chain = DetectorChain::build(loader.as_ref(), &binary_set.binaries)
                .map_err(|source| PoolError::InitialBuild { worker, source })?;
            chains.push(chain);
        }

        log::info!(
            "starting worker pool: {} worker(s), queue capacity {}, root hash {}",
            workers,
            options.queue_capacity,
            binary_set.root_hash
        );

        let shared = Arc::new(SharedState {
            binary_set: RwLock::new(binary_set),
            config: RwLock::new(initial_config),
            rebuild_flags: (0..workers).map(|_| AtomicBool::new(false)).collect(),
            shutdown: AtomicBool::new(false),
            worker_states: (0..workers)
                .map(|_| AtomicU8::new(WorkerState::Ready.as_u8()))
                .collect(),
            stats: PoolCounters::default(),
        });

        let (job_tx, job_rx) = mpsc::sync_channel::<RawEvent>(options.queue_capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let sinks = Arc::new(sinks);

        let mut handles = Vec::with_capacity(workers);
        for (index, chain) in chains.into_iter().enumerate() {
            let ctx = worker::WorkerContext {
                index,
                chain,
                loader: loader.clone(),
                shared: shared.clone(),
                jobs: job_rx.clone(),
                sinks: sinks.clone(),
            };
            let handle = std::thread::Builder::new()
                .name(format!("podsentry-worker-{index}"))
                .spawn(move || worker::run(ctx))
                .map_err(|e| PoolError::Spawn(e.to_string()))?;
            handles.push(handle);
        }

        Ok(Self {
            job_tx,
            shared,
            handles: Mutex::new(handles),
        })
    }

    /// Enqueue one event; blocks when the queue is full. This is the
    /// system's flow control against a faster upstream source.
    pub fn submit(&self, event: RawEvent) -> Result<(), PoolError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        self.job_tx.send(event).map_err(|_| PoolError::ShutDown)
    }

    /// Non-blocking enqueue; a full queue surfaces as explicit backpressure
    pub fn try_submit(&self, event: RawEvent) -> Result<(), PoolError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        match self.job_tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PoolError::Backpressure),
            Err(TrySendError::Disconnected(_)) => Err(PoolError::ShutDown),
        }
    }

    /// Swap the active binary set and signal every worker to rebuild.
    ///
    /// The per-worker signal coalesces: a worker with a pending rebuild
    /// notice simply keeps the one notice. At-least-one-rebuild-eventually
    /// is the guarantee, not exactly-once.
    pub fn update_detectors(&self, binaries: Vec<Vec<u8>>) -> String {
        let set = BinarySet::new(binaries);
        let root_hash = set.root_hash.clone();
        *self.shared.binary_set.write() = set;

        for flag in &self.shared.rebuild_flags {
            flag.store(true, Ordering::Release);
        }

        log::info!("detector set updated, root hash {}", root_hash);
        root_hash
    }

    /// Swap the runtime config. Takes effect on the next job each worker
    /// processes; in-flight jobs are unaffected.
    pub fn set_config(&self, config: RuntimeConfig) -> Result<(), PoolError> {
        if !config.schema_matches() {
            return Err(PoolError::ConfigSchema {
                got: config.schema_version,
                expected: CONFIG_SCHEMA_VERSION.to_string(),
            });
        }
        log::info!("runtime config updated: history_control={}", config.history_control);
        *self.shared.config.write() = config;
        Ok(())
    }

    pub fn config(&self) -> RuntimeConfig {
        self.shared.config.read().clone()
    }

    /// Root hash of the currently active binary set
    pub fn root_hash(&self) -> String {
        self.shared.binary_set.read().root_hash.clone()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.shared
            .worker_states
            .iter()
            .map(|s| WorkerState::from_u8(s.load(Ordering::Acquire)))
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.shared.worker_states.len(),
            jobs_processed: self.shared.stats.jobs_processed.load(Ordering::Relaxed),
            job_errors: self.shared.stats.job_errors.load(Ordering::Relaxed),
            rebuilds: self.shared.stats.rebuilds.load(Ordering::Relaxed),
            rebuild_failures: self.shared.stats.rebuild_failures.load(Ordering::Relaxed),
            root_hash: self.root_hash(),
        }
    }

    /// Broadcast the shutdown signal and join every worker.
    ///
    /// Queued-but-undequeued jobs are dropped; the upstream source provides
    /// durability and redelivery.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.join() {
                log::error!("worker thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::orchestrator::mocks::{MemoryHistory, MemoryNotifier, MockPolicy};
    use super::*;
    use crate::logic::config::HistoryControl;
    use crate::logic::detector::testutil::{
        fake_binary, fake_slow_binary, fake_unloadable_binary, FakeLoader,
    };
    use crate::logic::detector::Severity;
    use crate::logic::event::{EventKind, RawEvent};
    use crate::logic::policy::PolicyVerdict;
    use std::time::{Duration, Instant};

    fn test_sinks() -> (JobSinks, Arc<MemoryHistory>) {
        let history = Arc::new(MemoryHistory::default());
        let sinks = JobSinks {
            policy: Arc::new(MockPolicy::returning(PolicyVerdict::default())),
            history: history.clone(),
            notifier: Arc::new(MemoryNotifier::default()),
        };
        (sinks, history)
    }

    fn small_pool(
        binaries: Vec<Vec<u8>>,
        history_control: HistoryControl,
        sinks: JobSinks,
    ) -> WorkerPool {
        WorkerPool::start(
            PoolOptions {
                workers: Some(2),
                queue_capacity: 8,
            },
            Arc::new(FakeLoader),
            binaries,
            RuntimeConfig::new(history_control),
            sinks,
        )
        .unwrap()
    }

    fn event() -> RawEvent {
        RawEvent::new(EventKind::ProcessExec, "node-1")
    }

    fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_pool_processes_submitted_events() {
        let (sinks, history) = test_sinks();
        let pool = small_pool(
            vec![fake_binary("rule", 1, Severity::Low)],
            HistoryControl::All,
            sinks,
        );

        for _ in 0..5 {
            pool.submit(event()).unwrap();
        }

        assert!(wait_until(Duration::from_secs(5), || {
            pool.stats().jobs_processed >= 5
        }));
        assert_eq!(history.records.lock().len(), 5);
        pool.shutdown();
    }

    #[test]
    fn test_worker_floor_applies() {
        let (sinks, _) = test_sinks();
        let pool = WorkerPool::start(
            PoolOptions {
                workers: Some(1),
                queue_capacity: 4,
            },
            Arc::new(FakeLoader),
            vec![],
            RuntimeConfig::default(),
            sinks,
        )
        .unwrap();
        assert_eq!(pool.stats().workers, 2);
        pool.shutdown();
    }

    #[test]
    fn test_initial_build_failure_is_fatal() {
        let (sinks, _) = test_sinks();
        let err = WorkerPool::start(
            PoolOptions {
                workers: Some(2),
                queue_capacity: 4,
            },
            Arc::new(FakeLoader),
            vec![fake_unloadable_binary("broken")],
            RuntimeConfig::default(),
            sinks,
        )
        .unwrap_err();
        assert!(matches!(err, PoolError::InitialBuild { worker: 0, .. }));
    }

    #[test]
    fn test_backpressure_when_queue_full() {
        let (sinks, _) = test_sinks();
        // Slow detectors keep both workers busy while the queue fills.
        let pool = WorkerPool::start(
            PoolOptions {
                workers: Some(2),
                queue_capacity: 2,
            },
            Arc::new(FakeLoader),
            vec![fake_slow_binary("slow", 1, 300)],
            RuntimeConfig::new(HistoryControl::None),
            sinks,
        )
        .unwrap();

        // Saturate workers plus queue; eventually try_submit must reject.
        let mut saw_backpressure = false;
        for _ in 0..16 {
            match pool.try_submit(event()) {
                Ok(()) => {}
                Err(PoolError::Backpressure) => {
                    saw_backpressure = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(saw_backpressure);
        pool.shutdown();
    }

    #[test]
    fn test_hot_reload_reaches_all_workers() {
        let (sinks, history) = test_sinks();
        let pool = small_pool(
            vec![fake_binary("old", 1, Severity::Low)],
            HistoryControl::All,
            sinks,
        );

        let old_hash = pool.root_hash();
        let new_hash = pool.update_detectors(vec![fake_binary("new", 2, Severity::High)]);
        assert_ne!(old_hash, new_hash);
        assert_eq!(pool.root_hash(), new_hash);

        // Within a bounded number of job cycles every worker must produce
        // results consistent with the new set.
        let produced_new = wait_until(Duration::from_secs(5), || {
            pool.submit(event()).unwrap();
            history
                .records
                .lock()
                .iter()
                .any(|r| r.chain_result.threats.iter().any(|t| t.detector.id == "new"))
        });
        assert!(produced_new);

        // And no permanent retention of the old set: after the rebuilds
        // settle, fresh events only ever hit the new detector.
        assert!(wait_until(Duration::from_secs(5), || {
            pool.stats().rebuilds >= 2
        }));
        let before = history.records.lock().len();
        for _ in 0..4 {
            pool.submit(event()).unwrap();
        }
        assert!(wait_until(Duration::from_secs(5), || {
            history.records.lock().len() >= before + 4
        }));
        let records = history.records.lock();
        for record in records.iter().skip(before) {
            assert!(record
                .chain_result
                .threats
                .iter()
                .all(|t| t.detector.id == "new"));
        }
        drop(records);
        pool.shutdown();
    }

    #[test]
    fn test_failed_rebuild_keeps_old_chain() {
        let (sinks, history) = test_sinks();
        let pool = small_pool(
            vec![fake_binary("good", 1, Severity::Medium)],
            HistoryControl::All,
            sinks,
        );

        pool.update_detectors(vec![fake_unloadable_binary("broken")]);
        assert!(wait_until(Duration::from_secs(5), || {
            pool.stats().rebuild_failures >= 2
        }));

        // Workers keep serving with the previous chain.
        let before = history.records.lock().len();
        pool.submit(event()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            history.records.lock().len() > before
        }));
        let records = history.records.lock();
        let last = records.last().unwrap();
        assert_eq!(last.chain_result.threats[0].detector.id, "good");
        drop(records);
        pool.shutdown();
    }

    #[test]
    fn test_config_swap_applies_to_next_job() {
        let (sinks, history) = test_sinks();
        let pool = small_pool(
            vec![fake_binary("rule", 1, Severity::Low)],
            HistoryControl::None,
            sinks,
        );

        pool.submit(event()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            pool.stats().jobs_processed >= 1
        }));
        assert!(history.records.lock().is_empty());

        pool.set_config(RuntimeConfig::new(HistoryControl::All))
            .unwrap();
        pool.submit(event()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            !history.records.lock().is_empty()
        }));
        pool.shutdown();
    }

    #[test]
    fn test_config_schema_rejected() {
        let (sinks, _) = test_sinks();
        let pool = small_pool(vec![], HistoryControl::None, sinks);

        let stale = RuntimeConfig {
            schema_version: "v0".to_string(),
            history_control: HistoryControl::All,
        };
        let err = pool.set_config(stale).unwrap_err();
        assert!(matches!(err, PoolError::ConfigSchema { .. }));
        // Current config untouched
        assert_eq!(pool.config().history_control, HistoryControl::None);
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_stops_all_workers() {
        let (sinks, _) = test_sinks();
        let pool = small_pool(vec![], HistoryControl::None, sinks);

        pool.shutdown();
        assert!(pool
            .worker_states()
            .iter()
            .all(|s| *s == WorkerState::Stopped));
        assert!(matches!(pool.submit(event()), Err(PoolError::ShutDown)));
    }
}
