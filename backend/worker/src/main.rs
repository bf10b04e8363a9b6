use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use model::Config;
use queue::{box_handler, Job, JobName, QueueRepository};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod bank_pipeline;
mod context;
mod metrics;
mod operations;
mod pipeline;
mod repo;

use context::AppContext;
use metrics::WorkerMetrics;

/// Job-queue worker for the reconciliation engine (spec.md §4.I): no HTTP
/// surface, it only pulls jobs and runs the pipelines in `pipeline` and
/// `bank_pipeline`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Stable identifier for this worker process, used for job locking
    #[arg(long, default_value_t = default_worker_id())]
    worker_id: String,
}

fn default_worker_id() -> String {
    format!("worker-{}", std::process::id())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    info!("starting reconciliation worker v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&args.config)?;
    info!(path = %args.config, "configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connection_timeout_seconds))
        .connect(&config.database.url)
        .await?;
    info!("database pool established");

    let ctx = Arc::new(AppContext::new(config.clone(), pool));
    ctx.refresh_aggregates().await?;
    info!("initial aggregate refresh complete");

    let metrics = Arc::new(WorkerMetrics::new()?);
    let handlers = build_handlers(ctx.clone(), metrics.clone());
    let worker_config = queue::WorkerConfig {
        worker_id: args.worker_id.clone(),
        concurrency: config.queue.concurrency,
        rate_limit_per_second: config.queue.rate_limit_per_second,
        job_lock_seconds: config.queue.job_lock_seconds as i64,
        poll_interval: Duration::from_secs(1),
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let maintenance_handle = tokio::spawn(run_maintenance(ctx.clone(), metrics.clone(), shutdown_rx.clone()));
    let shutdown_handle = tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    info!(worker_id = %args.worker_id, concurrency = config.queue.concurrency, "worker loop starting");
    queue::run(ctx.queue_repo.clone(), handlers, worker_config, shutdown_rx).await;

    let _ = shutdown_handle.await;
    let _ = maintenance_handle.await;
    info!(metrics = %metrics.render_text(), "worker shutdown complete");
    Ok(())
}

fn build_handlers(ctx: Arc<AppContext>, metrics: Arc<WorkerMetrics>) -> HashMap<JobName, queue::Handler> {
    let mut handlers = HashMap::new();

    let new_upload_ctx = ctx.clone();
    let new_upload_metrics = metrics.clone();
    handlers.insert(
        JobName::ProcessNewUpload,
        box_handler(move |job: Job| {
            let ctx = new_upload_ctx.clone();
            let metrics = new_upload_metrics.clone();
            async move {
                let started = std::time::Instant::now();
                let result = pipeline::process_new_upload(ctx, job).await;
                record_outcome(&metrics, JobName::ProcessNewUpload, started.elapsed(), result)
            }
        }),
    );

    let resume_ctx = ctx.clone();
    let resume_metrics = metrics.clone();
    handlers.insert(
        JobName::ResumeAfterApproval,
        box_handler(move |job: Job| {
            let ctx = resume_ctx.clone();
            let metrics = resume_metrics.clone();
            async move {
                let started = std::time::Instant::now();
                let result = pipeline::resume_after_approval(ctx, job).await;
                record_outcome(&metrics, JobName::ResumeAfterApproval, started.elapsed(), result)
            }
        }),
    );

    let bank_ctx = ctx;
    handlers.insert(
        JobName::ProcessBankUpload,
        box_handler(move |job: Job| {
            let ctx = bank_ctx.clone();
            let metrics = metrics.clone();
            async move {
                let started = std::time::Instant::now();
                let result = bank_pipeline::process_bank_upload(ctx, job).await;
                record_outcome(&metrics, JobName::ProcessBankUpload, started.elapsed(), result)
            }
        }),
    );

    handlers
}

/// Records a job handler's outcome in `metrics` and passes the result
/// through unchanged, so the queue worker's own retry/backoff logic still
/// sees the real `Result`.
fn record_outcome(
    metrics: &WorkerMetrics,
    job_name: JobName,
    duration: std::time::Duration,
    result: anyhow::Result<()>,
) -> anyhow::Result<()> {
    let outcome = if result.is_ok() { "success" } else { "failure" };
    metrics.record(job_name.as_str(), outcome, duration);
    result
}

/// Periodic retention purge of completed/failed jobs (spec.md §4.I's
/// ambient queue-hygiene concern) and metrics exposition logging,
/// running independently of the job poll/dispatch loop above.
async fn run_maintenance(ctx: Arc<AppContext>, metrics: Arc<WorkerMetrics>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(3600));
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let retention = &ctx.config.queue;
                match ctx.queue_repo.purge_completed(retention.completed_retention_count, retention.completed_retention_hours).await {
                    Ok(n) if n > 0 => info!(count = n, "purged completed jobs"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "completed-job purge failed"),
                }
                match ctx.queue_repo.purge_failed(retention.failed_retention_count, retention.failed_retention_days).await {
                    Ok(n) if n > 0 => info!(count = n, "purged failed jobs"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "failed-job purge failed"),
                }
                info!(metrics = %metrics.render_text(), "periodic metrics snapshot");
            }
        }
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("worker={level}").into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received ctrl+c signal"); },
        _ = terminate => { info!("received terminate signal"); },
    }

    info!("starting graceful shutdown");
}
