use std::future::Future;

use crate::error::AppError;
use crate::job::{CrawlJob, JobContext, JobOutcome};
use crate::models::{ItemRecord, Page, RedditComment, RedditPost, ThreadPost, WriteOutcome};

/// Imageboard API: live thread list and thread contents.
pub trait ThreadSource: Send + Sync + Clone {
    /// Numbers of every thread currently on the board's live listing.
    fn list_threads(&self, board: &str) -> impl Future<Output = Result<Vec<u64>, AppError>> + Send;

    /// Every post of one thread. A thread that no longer exists is `AppError::NotFound`.
    fn get_thread(
        &self,
        board: &str,
        thread: u64,
    ) -> impl Future<Output = Result<Vec<ThreadPost>, AppError>> + Send;
}

/// Cursor-paginated subreddit listings, newest first.
pub trait SubredditSource: Send + Sync + Clone {
    fn list_posts(
        &self,
        subreddit: &str,
        limit: u32,
        after: Option<&str>,
    ) -> impl Future<Output = Result<Page<RedditPost>, AppError>> + Send;

    fn list_comments(
        &self,
        subreddit: &str,
        limit: u32,
        after: Option<&str>,
    ) -> impl Future<Output = Result<Page<RedditComment>, AppError>> + Send;
}

/// Durable storage for crawled records.
///
/// Writes must be idempotent on [`ItemRecord::key`]: a record whose key already
/// exists is left untouched and reported as [`WriteOutcome::Duplicate`].
pub trait RecordStore: Send + Sync + Clone {
    fn write(
        &self,
        record: &ItemRecord,
    ) -> impl Future<Output = Result<WriteOutcome, AppError>> + Send;
}

/// Runs one decoded crawl job to completion.
pub trait JobHandler: Send + Sync + Clone {
    fn handle(
        &self,
        job: &CrawlJob,
        ctx: &JobContext,
    ) -> impl Future<Output = Result<JobOutcome, AppError>> + Send;
}
