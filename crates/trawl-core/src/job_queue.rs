use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{JobStatus, NewJob, QueuedJob};

/// Persistent queue the crawl jobs travel through.
///
/// Implementations must support atomic claiming via `SELECT FOR UPDATE SKIP LOCKED`
/// or equivalent to prevent multiple workers from claiming the same job, and must
/// not hand out a job before its `scheduled_at`.
pub trait JobQueue: Send + Sync + Clone {
    /// Enqueue a job. Returns `None` when a job with the same dedupe key
    /// already exists, in which case nothing is written.
    fn enqueue(
        &self,
        job: NewJob,
    ) -> impl Future<Output = Result<Option<QueuedJob>, AppError>> + Send;

    /// Atomically claim the next due job on any of `queues`.
    ///
    /// Returns `None` if no jobs are available.
    fn claim_job(
        &self,
        worker_id: &str,
        queues: &[String],
    ) -> impl Future<Output = Result<Option<QueuedJob>, AppError>> + Send;

    fn complete_job(&self, job_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Mark a job as failed. If `next_retry_at` is provided, the job is
    /// reset to `pending` for retry; otherwise it is marked as permanently `failed`.
    fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<QueuedJob>, AppError>> + Send;

    /// Release all jobs held by a specific worker (for graceful shutdown).
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn count_by_status(
        &self,
        status: JobStatus,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;
}
