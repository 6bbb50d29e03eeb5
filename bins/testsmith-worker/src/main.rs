mod config;
mod pipeline;
mod provision;
mod report;
mod runner;
mod workspace;


use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info, instrument, warn};

use testsmith_common::queue::{JobQueue, RedisQueue};
use testsmith_common::store::{JobStore, RedisStore};

use config::{RunnerRegistry, WorkerConfig};
use pipeline::Pipeline;
use provision::Provisioner;
use runner::CoverageRunner;
use workspace::WorkspaceManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Testsmith worker booting...");

    let cfg = WorkerConfig::from_env();

    let registry = match RunnerRegistry::load_default() {
        Ok(registry) => registry,
        Err(e) => {
            warn!("No runner config loaded ({}), using built-in profiles", e);
            RunnerRegistry::builtin()
        }
    };
    info!("Runner profiles: {:?}", registry.list_languages());
    info!("Scratch root: {}", cfg.scratch_root.display());
    info!("Execution timeout: {}s", cfg.exec_timeout.as_secs());

    let conn = testsmith_common::config::connect(&cfg.redis_url).await?;
    info!("Connected to Redis: {}", cfg.redis_url);

    let store: Arc<dyn JobStore> = Arc::new(RedisStore::new(conn.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(RedisQueue::new(conn));

    let workspaces = Arc::new(WorkspaceManager::new(&cfg.scratch_root)?);
    let provisioner = Arc::new(Provisioner::new(
        cfg.testgen_cmd
            .clone()
            .map(|command| (command, cfg.testgen_spec.clone())),
    ));
    let runner = Arc::new(CoverageRunner::new(registry, cfg.exec_timeout));

    let pipeline = Arc::new(Pipeline::new(
        store,
        workspaces,
        provisioner,
        runner,
        cfg.cleanup_workspaces,
    ));

    info!("Starting {} workers", cfg.worker_count);

    // Setup graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        warn!("Received shutdown signal, stopping workers...");
    };

    tokio::select! {
        _ = run_workers(pipeline, queue, cfg.worker_count) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

/// Spawn the fixed-size pool; dropping the future (shutdown) aborts the
/// loops between jobs.
async fn run_workers(pipeline: Arc<Pipeline>, queue: Arc<dyn JobQueue>, count: usize) {
    let mut pool = tokio::task::JoinSet::new();
    for worker_id in 0..count {
        let pipeline = pipeline.clone();
        let queue = queue.clone();
        pool.spawn(worker_loop(worker_id, pipeline, queue));
    }
    while pool.join_next().await.is_some() {}
}

#[instrument(skip(pipeline, queue))]
async fn worker_loop(worker_id: usize, pipeline: Arc<Pipeline>, queue: Arc<dyn JobQueue>) {
    loop {
        // Short pop timeout keeps the loop responsive to shutdown.
        match queue.pop(Duration::from_secs(5)).await {
            Ok(Some(job_id)) => {
                info!(worker_id, job_id, "picked up job");
                pipeline.process_job(job_id).await;
            }
            Ok(None) => continue,
            Err(e) => {
                error!(worker_id, error = %e, "queue error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
