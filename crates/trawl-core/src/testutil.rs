//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CrawlJob, JobContext, JobOutcome, JobStatus, NewJob, QueuedJob};
use crate::job_queue::JobQueue;
use crate::models::{ItemRecord, Page, RedditComment, RedditPost, ThreadPost, WriteOutcome};
use crate::traits::{JobHandler, RecordStore, SubredditSource, ThreadSource};

// ---------------------------------------------------------------------------
// MockThreadSource
// ---------------------------------------------------------------------------

/// Mock imageboard API. Each call pops the first queued response.
#[derive(Clone, Default)]
pub struct MockThreadSource {
    listings: Arc<Mutex<Vec<Result<Vec<u64>, AppError>>>>,
    threads: Arc<Mutex<Vec<Result<Vec<ThreadPost>, AppError>>>>,
    pub listing_calls: Arc<Mutex<Vec<String>>>,
    pub thread_calls: Arc<Mutex<Vec<(String, u64)>>>,
}

impl MockThreadSource {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_listing(ids: &[u64]) -> Self {
        Self::with_listing_result(Ok(ids.to_vec()))
    }

    pub fn with_listing_result(result: Result<Vec<u64>, AppError>) -> Self {
        let source = Self::default();
        source.listings.lock().unwrap().push(result);
        source
    }

    pub fn with_thread(result: Result<Vec<ThreadPost>, AppError>) -> Self {
        let source = Self::default();
        source.threads.lock().unwrap().push(result);
        source
    }
}

impl ThreadSource for MockThreadSource {
    async fn list_threads(&self, board: &str) -> Result<Vec<u64>, AppError> {
        self.listing_calls.lock().unwrap().push(board.to_string());
        let mut listings = self.listings.lock().unwrap();
        if listings.is_empty() {
            Ok(Vec::new())
        } else {
            listings.remove(0)
        }
    }

    async fn get_thread(&self, board: &str, thread: u64) -> Result<Vec<ThreadPost>, AppError> {
        self.thread_calls
            .lock()
            .unwrap()
            .push((board.to_string(), thread));
        let mut threads = self.threads.lock().unwrap();
        if threads.is_empty() {
            Ok(Vec::new())
        } else {
            threads.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockSubredditSource
// ---------------------------------------------------------------------------

/// Mock subreddit API with separate queues for posts and comments.
#[derive(Clone, Default)]
pub struct MockSubredditSource {
    post_pages: Arc<Mutex<Vec<Result<Page<RedditPost>, AppError>>>>,
    comment_pages: Arc<Mutex<Vec<Result<Page<RedditComment>, AppError>>>>,
    /// Cursor passed to each call, in order.
    pub cursors: Arc<Mutex<Vec<Option<String>>>>,
}

impl MockSubredditSource {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_posts(result: Result<Page<RedditPost>, AppError>) -> Self {
        let source = Self::default();
        source.post_pages.lock().unwrap().push(result);
        source
    }

    pub fn with_comments(result: Result<Page<RedditComment>, AppError>) -> Self {
        let source = Self::default();
        source.comment_pages.lock().unwrap().push(result);
        source
    }

    pub fn call_count(&self) -> usize {
        self.cursors.lock().unwrap().len()
    }
}

impl SubredditSource for MockSubredditSource {
    async fn list_posts(
        &self,
        _subreddit: &str,
        _limit: u32,
        after: Option<&str>,
    ) -> Result<Page<RedditPost>, AppError> {
        self.cursors.lock().unwrap().push(after.map(str::to_owned));
        let mut pages = self.post_pages.lock().unwrap();
        if pages.is_empty() {
            Ok(Page::empty())
        } else {
            pages.remove(0)
        }
    }

    async fn list_comments(
        &self,
        _subreddit: &str,
        _limit: u32,
        after: Option<&str>,
    ) -> Result<Page<RedditComment>, AppError> {
        self.cursors.lock().unwrap().push(after.map(str::to_owned));
        let mut pages = self.comment_pages.lock().unwrap();
        if pages.is_empty() {
            Ok(Page::empty())
        } else {
            pages.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockRecordStore
// ---------------------------------------------------------------------------

/// In-memory store enforcing the same uniqueness rule as the database.
#[derive(Clone, Default)]
pub struct MockRecordStore {
    records: Arc<Mutex<Vec<ItemRecord>>>,
    /// Identifiers whose writes fail.
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MockRecordStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failing_on(identifiers: &[&str]) -> Self {
        let store = Self::default();
        store
            .failing
            .lock()
            .unwrap()
            .extend(identifiers.iter().map(|s| s.to_string()));
        store
    }

    pub fn stored(&self) -> Vec<ItemRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn stored_ids(&self) -> Vec<String> {
        self.stored().iter().map(ItemRecord::listing_id).collect()
    }
}

impl RecordStore for MockRecordStore {
    async fn write(&self, record: &ItemRecord) -> Result<WriteOutcome, AppError> {
        let key = record.key();
        if self.failing.lock().unwrap().contains(&key.identifier) {
            return Err(AppError::DatabaseError(format!("write refused for {key}")));
        }

        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.key() == key) {
            return Ok(WriteOutcome::Duplicate);
        }
        records.push(record.clone());
        Ok(WriteOutcome::Inserted)
    }
}

// ---------------------------------------------------------------------------
// MockJobQueue
// ---------------------------------------------------------------------------

/// Recorded failure: (job_id, error_message, next_retry_at).
pub type FailedJobRecord = (Uuid, String, Option<DateTime<Utc>>);

/// Mock job queue backed by an in-memory Vec.
#[derive(Clone, Default)]
pub struct MockJobQueue {
    jobs: Arc<Mutex<Vec<QueuedJob>>>,
    claim_error: Arc<Mutex<Option<AppError>>>,
    pub failed_jobs: Arc<Mutex<Vec<FailedJobRecord>>>,
    pub completed_jobs: Arc<Mutex<Vec<Uuid>>>,
    pub released_workers: Arc<Mutex<Vec<String>>>,
}

impl MockJobQueue {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Queue with one pending job ready to be claimed.
    pub fn with_job(job: QueuedJob) -> Self {
        let queue = Self::default();
        queue.jobs.lock().unwrap().push(job);
        queue
    }

    pub fn with_claim_error(error: AppError) -> Self {
        let queue = Self::default();
        *queue.claim_error.lock().unwrap() = Some(error);
        queue
    }

    /// Every job ever enqueued, oldest first.
    pub fn enqueued(&self) -> Vec<QueuedJob> {
        self.jobs.lock().unwrap().clone()
    }

    /// Enqueued jobs decoded back into crawl jobs.
    pub fn enqueued_crawl_jobs(&self) -> Vec<CrawlJob> {
        self.enqueued()
            .iter()
            .map(|j| CrawlJob::from_envelope(&j.envelope).unwrap())
            .collect()
    }
}

impl JobQueue for MockJobQueue {
    async fn enqueue(&self, request: NewJob) -> Result<Option<QueuedJob>, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        let duplicate = request
            .dedupe_key
            .as_ref()
            .is_some_and(|key| jobs.iter().any(|j| j.dedupe_key.as_ref() == Some(key)));
        if duplicate {
            return Ok(None);
        }

        let job = QueuedJob {
            id: Uuid::new_v4(),
            envelope: request.envelope,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(3),
            next_retry_at: None,
            error_message: None,
            worker_id: None,
            dedupe_key: request.dedupe_key,
        };
        jobs.push(job.clone());
        Ok(Some(job))
    }

    async fn claim_job(
        &self,
        worker_id: &str,
        queues: &[String],
    ) -> Result<Option<QueuedJob>, AppError> {
        let mut err = self.claim_error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }

        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let due = jobs.iter().position(|j| {
            j.status == JobStatus::Pending
                && queues.contains(&j.envelope.queue)
                && j.envelope.scheduled_at.is_none_or(|at| at <= now)
                && j.next_retry_at.is_none_or(|at| at <= now)
        });

        if let Some(pos) = due {
            jobs[pos].status = JobStatus::Running;
            jobs[pos].worker_id = Some(worker_id.to_string());
            jobs[pos].started_at = Some(now);
            Ok(Some(jobs[pos].clone()))
        } else {
            Ok(None)
        }
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<(), AppError> {
        self.completed_jobs.lock().unwrap().push(job_id);

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.worker_id = None;
        }
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.failed_jobs
            .lock()
            .unwrap()
            .push((job_id, error.to_string(), next_retry_at));

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            if next_retry_at.is_some() {
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.next_retry_at = next_retry_at;
            } else {
                job.status = JobStatus::Failed;
            }
            job.error_message = Some(error.to_string());
            job.worker_id = None;
        }
        Ok(())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<QueuedJob>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        self.released_workers
            .lock()
            .unwrap()
            .push(worker_id.to_string());

        let mut jobs = self.jobs.lock().unwrap();
        let mut count = 0u64;
        for job in jobs.iter_mut() {
            if job.worker_id.as_deref() == Some(worker_id) && job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().filter(|j| j.status == status).count() as i64)
    }
}

// ---------------------------------------------------------------------------
// MockHandler
// ---------------------------------------------------------------------------

/// Handler returning queued results and recording what it was asked to run.
#[derive(Clone, Default)]
pub struct MockHandler {
    results: Arc<Mutex<Vec<Result<JobOutcome, AppError>>>>,
    pub handled: Arc<Mutex<Vec<CrawlJob>>>,
}

impl MockHandler {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn with_error(error: AppError) -> Self {
        let handler = Self::default();
        handler.results.lock().unwrap().push(Err(error));
        handler
    }
}

impl JobHandler for MockHandler {
    async fn handle(&self, job: &CrawlJob, _ctx: &JobContext) -> Result<JobOutcome, AppError> {
        self.handled.lock().unwrap().push(job.clone());
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            Ok(JobOutcome::default())
        } else {
            results.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock worker reporter that records events.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl crate::worker::WorkerReporter for MockReporter {
    fn report(&self, event: crate::worker::WorkerEvent<'_>) {
        use crate::worker::WorkerEvent;

        let label = match &event {
            WorkerEvent::Started { .. } => "Started",
            WorkerEvent::Polling => "Polling",
            WorkerEvent::JobClaimed { .. } => "JobClaimed",
            WorkerEvent::JobCompleted { .. } => "JobCompleted",
            WorkerEvent::JobFailed { .. } => "JobFailed",
            WorkerEvent::ShuttingDown { .. } => "ShuttingDown",
            WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn reddit_post(name: &str) -> RedditPost {
    RedditPost {
        subreddit_id: "t5_y".to_string(),
        name: name.to_string(),
        title: format!("title of {name}"),
        body: Some(String::new()),
        flair: None,
        author: Some("t2_author".to_string()),
        url: None,
        media: None,
        created_at: test_time(),
        raw: serde_json::json!({ "name": name }),
    }
}

pub fn reddit_comment(name: &str) -> RedditComment {
    RedditComment {
        subreddit_id: "t5_y".to_string(),
        name: name.to_string(),
        body: format!("body of {name}"),
        author: Some("t2_author".to_string()),
        link_id: "t3_link".to_string(),
        parent_id: "t3_link".to_string(),
        created_at: test_time(),
        raw: serde_json::json!({ "name": name }),
    }
}

pub fn make_reddit_post(subreddit_id: &str, name: &str) -> ItemRecord {
    let mut post = reddit_post(name);
    post.subreddit_id = subreddit_id.to_string();
    ItemRecord::RedditPost(post)
}

pub fn thread_post(board: &str, thread: u64, post_number: u64) -> ThreadPost {
    ThreadPost {
        board: board.to_string(),
        thread_number: thread,
        post_number,
        title: (post_number == thread).then(|| "OP".to_string()),
        body: Some(format!("post {post_number}")),
        reply_count: None,
        created_at: test_time(),
        parent_ref: if post_number == thread { 0 } else { thread },
        raw: serde_json::json!({ "no": post_number }),
    }
}

pub fn make_test_job(job: &CrawlJob) -> QueuedJob {
    QueuedJob {
        id: Uuid::new_v4(),
        envelope: job.to_envelope(None).unwrap(),
        status: JobStatus::Pending,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        started_at: None,
        completed_at: None,
        retry_count: 0,
        max_retries: 3,
        next_retry_at: None,
        error_message: None,
        worker_id: None,
        dedupe_key: None,
    }
}

pub fn test_context() -> JobContext {
    JobContext {
        job_id: Uuid::new_v4(),
        started_at: test_time(),
    }
}
