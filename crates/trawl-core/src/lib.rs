pub mod baseline;
pub mod config;
pub mod crawl;
pub mod dead;
pub mod error;
pub mod job;
pub mod job_queue;
pub mod models;
pub mod pagination;
pub mod schedule;
pub mod sink;
pub mod traits;
pub mod worker;

#[cfg(test)]
pub mod testutil;

pub use baseline::Baseline;
pub use config::CrawlConfig;
pub use crawl::CrawlService;
pub use error::AppError;
pub use job::{CrawlJob, JobEnvelope, JobKind, JobStatus, Listing, NewJob, QueuedJob, WorkerConfig};
pub use job_queue::JobQueue;
pub use models::{ItemRecord, Page, RecordKey, RedditComment, RedditPost, ThreadPost, WriteOutcome};
pub use pagination::ColdStartPolicy;
pub use traits::{JobHandler, RecordStore, SubredditSource, ThreadSource};
pub use worker::{TracingWorkerReporter, WorkerService};
