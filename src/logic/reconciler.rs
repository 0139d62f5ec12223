//! Background Reconciler
//!
//! Periodically polls durable storage for config and detector-set drift and
//! pushes updates into the worker pool. Multiple pool replicas can each
//! accept direct update requests; this loop is the convergence mechanism
//! that makes them eventually consistent without a restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::sleep;

use crate::logic::detector::hash;
use crate::logic::pool::WorkerPool;
use crate::logic::repo::DetectorRepository;

// ============================================================================
// STATUS
// ============================================================================

/// Reconciler status snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileStatus {
    pub last_tick: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub config_updates: u64,
    pub detector_updates: u64,
    pub errors: u64,
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    pool: Arc<WorkerPool>,
    repo: Arc<dyn DetectorRepository>,
    interval: Duration,
    status: RwLock<ReconcileStatus>,
    stop: AtomicBool,
}

impl Reconciler {
    pub fn new(
        pool: Arc<WorkerPool>,
        repo: Arc<dyn DetectorRepository>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            repo,
            interval,
            status: RwLock::new(ReconcileStatus::default()),
            stop: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> ReconcileStatus {
        self.status.read().clone()
    }

    /// Request the loop to stop at its next wakeup
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Drive the reconcile loop until stopped
    pub async fn run(&self) {
        log::info!(
            "reconciler started, interval {}s",
            self.interval.as_secs()
        );
        'outer: loop {
            // Sleep in short slices so a stop request is honored promptly.
            let mut remaining = self.interval;
            while remaining > Duration::ZERO {
                if self.stop.load(Ordering::Acquire) {
                    break 'outer;
                }
                let step = remaining.min(Duration::from_millis(250));
                sleep(step).await;
                remaining = remaining.saturating_sub(step);
            }
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            self.tick();
        }
        log::info!("reconciler stopped");
    }

    /// One reconcile pass: config drift first, then detector-set drift.
    /// Storage failures are logged and retried on the next tick.
    pub fn tick(&self) {
        let mut status = self.status.write();
        status.ticks += 1;
        status.last_tick = Some(Utc::now());
        drop(status);

        if let Err(e) = self.reconcile_config() {
            self.status.write().errors += 1;
            log::warn!("config reconcile failed: {}", e);
        }
        if let Err(e) = self.reconcile_detectors() {
            self.status.write().errors += 1;
            log::warn!("detector reconcile failed: {}", e);
        }
    }

    fn reconcile_config(&self) -> Result<(), String> {
        let stored = self.repo.latest_config().map_err(|e| e.to_string())?;
        let Some(stored) = stored else {
            return Ok(());
        };

        // Field-level comparison against the pool's current config
        if stored == self.pool.config() {
            return Ok(());
        }

        log::info!(
            "config drift detected, applying stored config (history_control={})",
            stored.history_control
        );
        self.pool.set_config(stored).map_err(|e| e.to_string())?;
        self.status.write().config_updates += 1;
        Ok(())
    }

    fn reconcile_detectors(&self) -> Result<(), String> {
        // Cheap drift query first: checksums only, sorted by id before
        // hashing so storage ordering can never fake a mismatch.
        let checksums = self.repo.detector_checksums().map_err(|e| e.to_string())?;
        let stored_root = hash::root_hash_sorted(&checksums);
        if stored_root == self.pool.root_hash() {
            return Ok(());
        }

        log::info!(
            "detector drift detected (stored root {}), fetching binaries",
            stored_root
        );
        let records = self.repo.detector_binaries().map_err(|e| e.to_string())?;
        let binaries: Vec<Vec<u8>> = records.into_iter().map(|r| r.binary).collect();
        self.pool.update_detectors(binaries);
        self.status.write().detector_updates += 1;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
