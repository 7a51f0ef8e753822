use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::baseline::Baseline;
use crate::error::AppError;

/// Status of a crawl job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Which subreddit stream a scan walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    Posts,
    Comments,
}

impl Listing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Listing::Posts => "posts",
            Listing::Comments => "comments",
        }
    }
}

/// The six job types understood by the crawler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    CrawlThread,
    CrawlThreadListing,
    Scan(Listing),
    Process(Listing),
}

impl JobKind {
    pub const ALL: [JobKind; 6] = [
        JobKind::CrawlThread,
        JobKind::CrawlThreadListing,
        JobKind::Scan(Listing::Posts),
        JobKind::Scan(Listing::Comments),
        JobKind::Process(Listing::Posts),
        JobKind::Process(Listing::Comments),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::CrawlThread => "crawl_thread",
            JobKind::CrawlThreadListing => "crawl_thread_listing",
            JobKind::Scan(Listing::Posts) => "scan_posts",
            JobKind::Scan(Listing::Comments) => "scan_comments",
            JobKind::Process(Listing::Posts) => "process_posts",
            JobKind::Process(Listing::Comments) => "process_comments",
        }
    }

    /// Queue a job of this kind is pushed to.
    pub fn queue(&self) -> &'static str {
        match self {
            JobKind::CrawlThread => "crawl-thread",
            JobKind::CrawlThreadListing => "crawl-thread-listing",
            other => other.as_str(),
        }
    }

    /// Names of every queue the crawler uses.
    pub fn all_queues() -> Vec<String> {
        Self::ALL.iter().map(|k| k.queue().to_string()).collect()
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AppError::InvalidJob(format!("Unknown job type: {}", s)))
    }
}

/// Wire shape of a queued job: `{ type, args, queue, scheduled_at? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(rename = "type")]
    pub job_type: String,
    pub args: Vec<serde_json::Value>,
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// A decoded crawl job. All cross-cycle state lives in these fields.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlJob {
    /// Fetch and persist every post of one thread. One-shot.
    CrawlThread { board: String, thread: u64 },
    /// Poll a board's live thread list and chase threads that dropped off it.
    CrawlThreadListing {
        board: String,
        baseline: Baseline<u64>,
    },
    /// Top-level subreddit scan; owns baseline continuity.
    Scan {
        listing: Listing,
        subreddit: String,
        baseline: Baseline<String>,
    },
    /// A deeper page within a scan cycle.
    Process {
        listing: Listing,
        subreddit: String,
        baseline: Baseline<String>,
        after: Option<String>,
    },
}

impl CrawlJob {
    pub fn kind(&self) -> JobKind {
        match self {
            CrawlJob::CrawlThread { .. } => JobKind::CrawlThread,
            CrawlJob::CrawlThreadListing { .. } => JobKind::CrawlThreadListing,
            CrawlJob::Scan { listing, .. } => JobKind::Scan(*listing),
            CrawlJob::Process { listing, .. } => JobKind::Process(*listing),
        }
    }

    /// Board or subreddit this job polls.
    pub fn entity(&self) -> &str {
        match self {
            CrawlJob::CrawlThread { board, .. } | CrawlJob::CrawlThreadListing { board, .. } => {
                board
            }
            CrawlJob::Scan { subreddit, .. } | CrawlJob::Process { subreddit, .. } => subreddit,
        }
    }

    /// Identity of this job when emitted as a follow-up. Two emissions with the
    /// same parent and the same key describe the same unit of work.
    pub fn follow_up_key(&self) -> String {
        match self {
            CrawlJob::CrawlThread { board, thread } => {
                format!("{}:{}:{}", self.kind(), board, thread)
            }
            CrawlJob::Process {
                subreddit, after, ..
            } => format!(
                "{}:{}:{}",
                self.kind(),
                subreddit,
                after.as_deref().unwrap_or("")
            ),
            _ => format!("{}:{}", self.kind(), self.entity()),
        }
    }

    pub fn args(&self) -> Result<Vec<serde_json::Value>, AppError> {
        let args = match self {
            CrawlJob::CrawlThread { board, thread } => {
                vec![serde_json::to_value(board)?, serde_json::to_value(thread)?]
            }
            CrawlJob::CrawlThreadListing { board, baseline } => {
                vec![serde_json::to_value(board)?, serde_json::to_value(baseline)?]
            }
            CrawlJob::Scan {
                subreddit,
                baseline,
                ..
            } => vec![
                serde_json::to_value(subreddit)?,
                serde_json::to_value(baseline)?,
            ],
            CrawlJob::Process {
                subreddit,
                baseline,
                after,
                ..
            } => vec![
                serde_json::to_value(subreddit)?,
                serde_json::to_value(baseline)?,
                serde_json::to_value(after)?,
            ],
        };
        Ok(args)
    }

    pub fn to_envelope(&self, scheduled_at: Option<DateTime<Utc>>) -> Result<JobEnvelope, AppError> {
        let kind = self.kind();
        Ok(JobEnvelope {
            job_type: kind.as_str().to_string(),
            args: self.args()?,
            queue: kind.queue().to_string(),
            scheduled_at,
        })
    }

    pub fn from_envelope(envelope: &JobEnvelope) -> Result<Self, AppError> {
        let kind: JobKind = envelope.job_type.parse()?;
        let job = match kind {
            JobKind::CrawlThread => CrawlJob::CrawlThread {
                board: required_arg(envelope, 0, "board")?,
                thread: required_arg(envelope, 1, "thread number")?,
            },
            JobKind::CrawlThreadListing => CrawlJob::CrawlThreadListing {
                board: required_arg(envelope, 0, "board")?,
                baseline: optional_arg(envelope, 1, "old thread ids")?.unwrap_or_default(),
            },
            JobKind::Scan(listing) => CrawlJob::Scan {
                listing,
                subreddit: required_arg(envelope, 0, "subreddit")?,
                baseline: optional_arg(envelope, 1, "old names")?.unwrap_or_default(),
            },
            JobKind::Process(listing) => CrawlJob::Process {
                listing,
                subreddit: required_arg(envelope, 0, "subreddit")?,
                baseline: optional_arg(envelope, 1, "old names")?.unwrap_or_default(),
                after: optional_arg::<String>(envelope, 2, "after cursor")?
                    .filter(|c| !c.is_empty()),
            },
        };
        Ok(job)
    }
}

fn optional_arg<T: DeserializeOwned>(
    envelope: &JobEnvelope,
    index: usize,
    name: &str,
) -> Result<Option<T>, AppError> {
    match envelope.args.get(index) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
            AppError::InvalidJob(format!("{}: bad {}: {}", envelope.job_type, name, e))
        }),
    }
}

fn required_arg<T: DeserializeOwned>(
    envelope: &JobEnvelope,
    index: usize,
    name: &str,
) -> Result<T, AppError> {
    optional_arg(envelope, index, name)?.ok_or_else(|| {
        AppError::InvalidJob(format!(
            "{}: missing argument {} ({})",
            envelope.job_type, index, name
        ))
    })
}

/// Retry configuration with exponential backoff.
///
/// Delay schedule: 1min, 5min, 30min, 60min (capped).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub max_delay: TimeDelta,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_delay: TimeDelta::minutes(60),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> TimeDelta {
        let delay = match attempt {
            0 | 1 => TimeDelta::minutes(1),
            2 => TimeDelta::minutes(5),
            3 => TimeDelta::minutes(30),
            _ => TimeDelta::minutes(60),
        };
        std::cmp::min(delay, self.max_delay)
    }
}

/// A job as stored in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub envelope: JobEnvelope,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub dedupe_key: Option<String>,
}

impl QueuedJob {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn calculate_next_retry(&self, config: &RetryConfig) -> DateTime<Utc> {
        let delay = config.delay_for_attempt(self.retry_count + 1);
        Utc::now() + delay
    }
}

/// Request to enqueue a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub envelope: JobEnvelope,
    pub max_retries: Option<u32>,
    /// Jobs sharing a key are enqueued at most once.
    pub dedupe_key: Option<String>,
}

impl NewJob {
    pub fn new(envelope: JobEnvelope) -> Self {
        Self {
            envelope,
            max_retries: None,
            dedupe_key: None,
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }
}

/// Per-execution context handed to a job handler.
#[derive(Debug, Clone, Copy)]
pub struct JobContext {
    pub job_id: Uuid,
    /// When this execution started; follow-up run times are computed from it.
    pub started_at: DateTime<Utc>,
}

/// What a handler did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub persisted: usize,
    pub duplicates: usize,
    pub enqueued: usize,
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub retry_config: RetryConfig,
    pub queues: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(5),
            retry_config: RetryConfig::default(),
            queues: JobKind::all_queues(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }
}
