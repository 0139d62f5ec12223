//! Worker Loop
//!
//! Each worker thread privately owns one detector chain and runs the
//! detect-loop state machine: Ready -> Processing / Rebuilding -> Ready,
//! Stopped terminal. Rebuild signals are coalescing per-worker flags; the
//! shutdown signal is a shared flag observed at the next loop iteration.

use std::sync::atomic::Ordering;
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::constants::WORKER_POLL_INTERVAL_MS;
use crate::logic::detector::{DetectorChain, DetectorLoader};
use crate::logic::event::RawEvent;

use super::orchestrator;
use super::{JobReceiver, JobSinks, SharedState};

// ============================================================================
// STATE MACHINE
// ============================================================================

/// Observable worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Ready,
    Processing,
    Rebuilding,
    Stopped,
}

impl WorkerState {
    pub(super) fn as_u8(self) -> u8 {
        match self {
            WorkerState::Ready => 0,
            WorkerState::Processing => 1,
            WorkerState::Rebuilding => 2,
            WorkerState::Stopped => 3,
        }
    }

    pub(super) fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Processing,
            2 => WorkerState::Rebuilding,
            3 => WorkerState::Stopped,
            _ => WorkerState::Ready,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Ready => "ready",
            WorkerState::Processing => "processing",
            WorkerState::Rebuilding => "rebuilding",
            WorkerState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// LOOP
// ============================================================================

pub(super) struct WorkerContext {
    pub index: usize,
    pub chain: DetectorChain,
    pub loader: Arc<dyn DetectorLoader>,
    pub shared: Arc<SharedState>,
    pub jobs: Arc<Mutex<JobReceiver>>,
    pub sinks: Arc<JobSinks>,
}

pub(super) fn run(mut ctx: WorkerContext) {
    let shared = ctx.shared.clone();
    let index = ctx.index;
    let states = ctx.shared.clone();
    let set_state = move |state: WorkerState| {
        states.worker_states[index].store(state.as_u8(), Ordering::Release);
    };
    set_state(WorkerState::Ready);
    log::info!(
        "worker {} started with {} detector(s)",
        ctx.index,
        ctx.chain.len()
    );

    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        // Coalescing rebuild signal: one pending flag, however many updates
        // arrived since the last look.
        if shared.rebuild_flags[ctx.index].swap(false, Ordering::AcqRel) {
            set_state(WorkerState::Rebuilding);
            rebuild(&mut ctx);
            set_state(WorkerState::Ready);
            continue;
        }

        let job = ctx.jobs.lock().try_recv();
        match job {
            Ok(event) => {
                set_state(WorkerState::Processing);
                process(&mut ctx, &event);
                set_state(WorkerState::Ready);
            }
            Err(TryRecvError::Empty) => {
                std::thread::sleep(Duration::from_millis(WORKER_POLL_INTERVAL_MS));
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }

    set_state(WorkerState::Stopped);
    log::info!("worker {} stopped", ctx.index);
}

/// Rebuild the chain from the current binary set. A failed rebuild keeps
/// the previous (stale but valid) chain; it never takes the worker down.
fn rebuild(ctx: &mut WorkerContext) {
    ctx.shared.stats.rebuilds.fetch_add(1, Ordering::Relaxed);

    let (binaries, root_hash) = {
        let set = ctx.shared.binary_set.read();
        (set.binaries.clone(), set.root_hash.clone())
    };

    match DetectorChain::build(ctx.loader.as_ref(), &binaries) {
        Ok(chain) => {
            log::info!(
                "worker {} rebuilt chain: {} detector(s), root hash {}",
                ctx.index,
                chain.len(),
                root_hash
            );
            ctx.chain = chain;
        }
        Err(e) => {
            ctx.shared
                .stats
                .rebuild_failures
                .fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "worker {} chain rebuild failed, keeping previous chain: {}",
                ctx.index,
                e
            );
        }
    }
}

fn process(ctx: &mut WorkerContext, event: &RawEvent) {
    match orchestrator::run_job(&mut ctx.chain, event, &ctx.shared.config, &ctx.sinks) {
        Ok(outcome) => {
            ctx.shared
                .stats
                .jobs_processed
                .fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "worker {} processed event {}: threats={} errors={} persisted={} incident={}",
                ctx.index,
                outcome.event_id,
                outcome.chain_result.threats.len(),
                outcome.chain_result.errors.len(),
                outcome.persisted,
                outcome.incident
            );
        }
        Err(e) => {
            ctx.shared.stats.job_errors.fetch_add(1, Ordering::Relaxed);
            log::warn!("worker {} job failed: {}", ctx.index, e);
        }
    }
}
