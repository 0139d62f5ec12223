//! PodSentry Node Agent - Main Entry Point

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use podsentry::logic::config::AgentConfig;
use podsentry::logic::detector::WasmDetectorRuntime;
use podsentry::logic::history::JsonlHistorySink;
use podsentry::logic::notify::WebhookNotifier;
use podsentry::logic::policy::HttpPolicyClient;
use podsentry::logic::pool::{JobSinks, PoolOptions, WorkerPool};
use podsentry::logic::reconciler::Reconciler;
use podsentry::logic::repo::{DetectorRepository, SqliteRepository};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AgentConfig::default();
    log::info!("Starting PodSentry node agent v{}...", env!("CARGO_PKG_VERSION"));
    log::info!("  Workers: {}", config.effective_workers());
    log::info!("  Queue capacity: {}", config.queue_capacity);
    log::info!("  Repository: {}", config.db_path);
    log::info!("  Reconcile interval: {}s", config.reconcile_interval_secs);

    let repo: Arc<dyn DetectorRepository> = Arc::new(
        SqliteRepository::open(&config.db_path).context("failed to open detector repository")?,
    );

    let initial_binaries: Vec<Vec<u8>> = repo
        .detector_binaries()
        .context("failed to load detector set")?
        .into_iter()
        .map(|r| r.binary)
        .collect();
    let initial_config = repo
        .latest_config()
        .context("failed to load runtime config")?
        .unwrap_or_default();
    log::info!(
        "Loaded {} detector(s), history_control={}",
        initial_binaries.len(),
        initial_config.history_control
    );

    let loader = Arc::new(WasmDetectorRuntime::new().context("failed to create wasm runtime")?);
    let sinks = JobSinks {
        policy: Arc::new(HttpPolicyClient::new(config.policy_url.clone())),
        history: Arc::new(
            JsonlHistorySink::new(&config.history_dir).context("failed to open history sink")?,
        ),
        notifier: Arc::new(WebhookNotifier::new()),
    };

    let pool = Arc::new(
        WorkerPool::start(
            PoolOptions {
                workers: config.workers,
                queue_capacity: config.queue_capacity,
            },
            loader,
            initial_binaries,
            initial_config,
            sinks,
        )
        .context("failed to start worker pool")?,
    );

    // Reconciler runs on its own thread with a small dedicated runtime.
    let reconciler = Arc::new(Reconciler::new(
        pool.clone(),
        repo,
        Duration::from_secs(config.reconcile_interval_secs),
    ));
    let reconciler_handle = {
        let reconciler = reconciler.clone();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to create tokio runtime for reconciler");
            rt.block_on(reconciler.run());
        })
    };

    // Block until ctrl-c, then shut down cooperatively.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    rt.block_on(async {
        tokio::signal::ctrl_c().await.ok();
    });

    log::info!("Shutdown signal received");
    reconciler.stop();
    pool.shutdown();
    let _ = reconciler_handle.join();

    let stats = pool.stats();
    log::info!(
        "Stopped. jobs={} errors={} rebuilds={}",
        stats.jobs_processed,
        stats.job_errors,
        stats.rebuilds
    );
    Ok(())
}
