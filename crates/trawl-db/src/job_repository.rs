use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use trawl_core::error::AppError;
use trawl_core::job::{JobEnvelope, JobStatus, NewJob, QueuedJob};
use trawl_core::job_queue::JobQueue;

/// How long a claimed job may stay `running` before another worker may take it.
pub const DEFAULT_JOB_LEASE: Duration = Duration::from_secs(600);

/// PostgreSQL-backed crawl job queue using `SELECT FOR UPDATE SKIP LOCKED`.
///
/// A `running` job whose `started_at` is older than the lease is treated as
/// abandoned by a crashed worker and is handed out again by `claim_job`.
#[derive(Clone)]
pub struct CrawlJobRepository {
    pool: Pool<Postgres>,
    lease: Duration,
}

impl CrawlJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_JOB_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Delete completed jobs finished before `older_than` ago. Returns the number removed.
    ///
    /// Their dedupe keys go with them, so `older_than` must outlast any retry
    /// of the parent that emitted them.
    pub async fn purge_completed(&self, older_than: TimeDelta) -> Result<u64, AppError> {
        let cutoff = Utc::now() - older_than;
        let result = sqlx::query(
            r#"
            DELETE FROM crawl_jobs
            WHERE status = 'completed' AND completed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    /// Fetch a single job by id.
    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<QueuedJob>, AppError> {
        let row = sqlx::query_as::<_, CrawlJobRow>(r#"SELECT * FROM crawl_jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct CrawlJobRow {
    id: Uuid,
    job_type: String,
    args: serde_json::Value,
    queue: String,
    run_at: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    max_retries: i32,
    next_retry_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    worker_id: Option<String>,
    dedupe_key: Option<String>,
}

impl From<CrawlJobRow> for QueuedJob {
    fn from(row: CrawlJobRow) -> Self {
        let args = match row.args {
            serde_json::Value::Array(args) => args,
            other => vec![other],
        };

        QueuedJob {
            id: row.id,
            envelope: JobEnvelope {
                job_type: row.job_type,
                args,
                queue: row.queue,
                scheduled_at: row.run_at,
            },
            status: row.status.parse().unwrap_or(JobStatus::Pending),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            next_retry_at: row.next_retry_at,
            error_message: row.error_message,
            worker_id: row.worker_id,
            dedupe_key: row.dedupe_key,
        }
    }
}

impl JobQueue for CrawlJobRepository {
    async fn enqueue(&self, request: NewJob) -> Result<Option<QueuedJob>, AppError> {
        let envelope = request.envelope;
        let row = sqlx::query_as::<_, CrawlJobRow>(
            r#"
            INSERT INTO crawl_jobs (job_type, args, queue, run_at, max_retries, dedupe_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (dedupe_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&envelope.job_type)
        .bind(serde_json::Value::Array(envelope.args))
        .bind(&envelope.queue)
        .bind(envelope.scheduled_at)
        .bind(request.max_retries.unwrap_or(3) as i32)
        .bind(&request.dedupe_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn claim_job(
        &self,
        worker_id: &str,
        queues: &[String],
    ) -> Result<Option<QueuedJob>, AppError> {
        let row = sqlx::query_as::<_, CrawlJobRow>(
            r#"
            UPDATE crawl_jobs
            SET status = 'running', worker_id = $1, started_at = NOW(), updated_at = NOW(),
                retry_count = CASE WHEN status = 'running' THEN retry_count + 1 ELSE retry_count END
            WHERE id = (
                SELECT id FROM crawl_jobs
                WHERE queue = ANY($2)
                  AND (
                    (status = 'pending'
                      AND (run_at IS NULL OR run_at <= NOW())
                      AND (next_retry_at IS NULL OR next_retry_at <= NOW()))
                    OR (status = 'running'
                      AND started_at < NOW() - ($3 || ' seconds')::INTERVAL)
                  )
                ORDER BY run_at NULLS FIRST, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(queues)
        .bind(self.lease.as_secs().to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                error_message = NULL, worker_id = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        // A retry time puts the job back to pending; otherwise it is dead-lettered.
        sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET
                status = CASE WHEN $3::timestamptz IS NOT NULL THEN 'pending' ELSE 'failed' END,
                retry_count = CASE WHEN $3::timestamptz IS NOT NULL THEN retry_count + 1 ELSE retry_count END,
                next_retry_at = $3,
                error_message = $2,
                updated_at = NOW(),
                worker_id = NULL,
                started_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE started_at END
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<QueuedJob>, AppError> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, CrawlJobRow>(
                r#"
                SELECT * FROM crawl_jobs
                WHERE status = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, CrawlJobRow>(
                r#"
                SELECT * FROM crawl_jobs
                ORDER BY created_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL, updated_at = NOW()
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(r#"SELECT COUNT(*) FROM crawl_jobs WHERE status = $1"#)
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }
}
