use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CrawlJob, JobContext, JobOutcome, QueuedJob, WorkerConfig};
use crate::job_queue::JobQueue;
use crate::traits::JobHandler;

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job: &'a QueuedJob,
    },
    JobCompleted {
        job_id: Uuid,
        outcome: JobOutcome,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        will_retry: bool,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(
                    job_id = %job.id,
                    job_type = %job.envelope.job_type,
                    queue = %job.envelope.queue,
                    retry_count = job.retry_count,
                    "Job claimed"
                );
            }
            WorkerEvent::JobCompleted { job_id, outcome } => {
                tracing::info!(
                    %job_id,
                    persisted = outcome.persisted,
                    duplicates = outcome.duplicates,
                    enqueued = outcome.enqueued,
                    "Job completed"
                );
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%job_id, %error, %will_retry, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Worker that polls the job queue and hands decoded crawl jobs to a handler.
pub struct WorkerService<Q, H>
where
    Q: JobQueue,
    H: JobHandler,
{
    queue: Q,
    handler: H,
    config: WorkerConfig,
}

impl<Q, H> WorkerService<Q, H>
where
    Q: JobQueue,
    H: JobHandler,
{
    pub fn new(queue: Q, handler: H, config: WorkerConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            match self.process_next(reporter).await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        // Graceful shutdown: hand back anything still claimed
        let released = self
            .queue
            .release_worker_jobs(&self.config.worker_id)
            .await
            .unwrap_or(0);

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    /// Claim and process at most one job. Returns `false` when nothing was due.
    pub async fn process_next<WR: WorkerReporter>(&self, reporter: &WR) -> Result<bool, AppError> {
        reporter.report(WorkerEvent::Polling);

        let Some(job) = self
            .queue
            .claim_job(&self.config.worker_id, &self.config.queues)
            .await?
        else {
            return Ok(false);
        };

        reporter.report(WorkerEvent::JobClaimed { job: &job });
        self.process_job(&job, reporter).await;
        Ok(true)
    }

    async fn process_job<WR: WorkerReporter>(&self, job: &QueuedJob, reporter: &WR) {
        let crawl_job = match CrawlJob::from_envelope(&job.envelope) {
            Ok(crawl_job) => crawl_job,
            Err(e) => {
                // A payload that cannot be decoded never will be.
                let error_msg = e.to_string();
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error_msg,
                    will_retry: false,
                });
                if let Err(e) = self.queue.fail_job(job.id, &error_msg, None).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                }
                return;
            }
        };

        let ctx = JobContext {
            job_id: job.id,
            started_at: Utc::now(),
        };

        match self.handler.handle(&crawl_job, &ctx).await {
            Ok(outcome) => {
                reporter.report(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    outcome,
                });
                if let Err(e) = self.queue.complete_job(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                }
            }
            Err(e) => {
                let error_msg = e.to_string();
                let can_retry = job.can_retry() && e.is_retryable();
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error_msg,
                    will_retry: can_retry,
                });

                let next_retry = if can_retry {
                    Some(job.calculate_next_retry(&self.config.retry_config))
                } else {
                    None
                };

                if let Err(e) = self.queue.fail_job(job.id, &error_msg, next_retry).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                }
            }
        }
    }
}
