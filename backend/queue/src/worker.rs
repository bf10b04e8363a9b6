//! The worker loop: concurrency-limited, rate-limited polling of
//! [`QueueRepository::dequeue`], lock renewal at half the lock interval
//! while a handler runs, and exponential-backoff retry up to
//! `max_attempts` (spec.md §4.I).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use crate::backoff::{next_run_at, should_retry};
use crate::job::{Job, JobName};
use crate::repository::QueueRepository;

pub type Handler = Arc<dyn Fn(Job) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub struct WorkerConfig {
    pub worker_id: String,
    pub concurrency: usize,
    pub rate_limit_per_second: u32,
    pub job_lock_seconds: i64,
    pub poll_interval: Duration,
}

/// Runs until `shutdown` signals true, then lets in-flight jobs finish
/// before returning (graceful shutdown, spec.md's ambient operational
/// stack).
pub async fn run(
    repo: Arc<dyn QueueRepository>,
    handlers: HashMap<JobName, Handler>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let rate_period = Duration::from_secs_f64(1.0 / config.rate_limit_per_second.max(1) as f64);
    let mut rate_ticker = tokio::time::interval(rate_period);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = rate_ticker.tick() => {
                let Ok(permit) = semaphore.clone().acquire_owned().await else { continue };
                match repo.dequeue(&config.worker_id, config.job_lock_seconds).await {
                    Ok(Some(job)) => {
                        let repo = repo.clone();
                        let handlers = handlers.clone();
                        let worker_id = config.worker_id.clone();
                        let job_lock_seconds = config.job_lock_seconds;
                        tokio::spawn(async move {
                            run_one(repo, handlers, job, worker_id, job_lock_seconds).await;
                            drop(permit);
                        });
                    }
                    Ok(None) => {
                        drop(permit);
                        tokio::time::sleep(config.poll_interval).await;
                    }
                    Err(e) => {
                        drop(permit);
                        error!(error = %e, "queue dequeue failed");
                        tokio::time::sleep(config.poll_interval).await;
                    }
                }
            }
        }
    }
}

async fn run_one(
    repo: Arc<dyn QueueRepository>,
    handlers: HashMap<JobName, Handler>,
    job: Job,
    worker_id: String,
    job_lock_seconds: i64,
) {
    let Some(handler) = handlers.get(&job.name).cloned() else {
        warn!(job_name = job.name.as_str(), "no handler registered for job name");
        return;
    };

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let renew_repo = repo.clone();
    let renew_job_id = job.id;
    let renew_worker_id = worker_id.clone();
    let renew_task = tokio::spawn(async move {
        let interval = Duration::from_secs((job_lock_seconds / 2).max(1) as u64);
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(interval) => {
                    if renew_repo.renew_lock(renew_job_id, &renew_worker_id, job_lock_seconds).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let result = (handler)(job.clone()).await;
    let _ = stop_tx.send(true);
    let _ = renew_task.await;

    match result {
        Ok(()) => {
            if let Err(e) = repo.complete(job.id).await {
                error!(error = %e, job_id = %job.id, "failed to mark job complete");
            }
            info!(job_id = %job.id, job_name = job.name.as_str(), "job completed");
        }
        Err(e) => {
            let attempts = job.attempts + 1;
            if should_retry(attempts, job.max_attempts) {
                let run_at = next_run_at(Utc::now(), attempts);
                if let Err(db_err) = repo.fail_and_reschedule(job.id, &e.to_string(), run_at).await {
                    error!(error = %db_err, job_id = %job.id, "failed to reschedule job");
                }
                warn!(job_id = %job.id, attempts, error = %e, "job failed, rescheduled");
            } else {
                if let Err(db_err) = repo.fail_terminal(job.id, &e.to_string()).await {
                    error!(error = %db_err, job_id = %job.id, "failed to mark job terminally failed");
                }
                error!(job_id = %job.id, attempts, error = %e, "job exhausted retries");
            }
        }
    }
}

pub fn box_handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |job| -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> { Box::pin(f(job)) })
}
