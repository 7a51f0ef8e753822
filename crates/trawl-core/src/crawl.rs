use crate::baseline::Baseline;
use crate::config::CrawlConfig;
use crate::dead::diff_listing;
use crate::error::AppError;
use crate::job::{CrawlJob, JobContext, JobOutcome, Listing};
use crate::job_queue::JobQueue;
use crate::models::{ItemRecord, Page};
use crate::pagination::{PageStep, PaginationPolicy};
use crate::schedule::Emitter;
use crate::sink::{BatchReport, IdempotentSink};
use crate::traits::{JobHandler, RecordStore, SubredditSource, ThreadSource};

/// Runs crawl jobs: fetch → diff → persist → emit follow-ups → reschedule.
///
/// Stateless between invocations. Everything a cycle needs arrives in the
/// [`CrawlJob`], and everything the next cycle needs leaves through the queue,
/// so retries and overlapping executions recompute the same diff.
#[derive(Clone)]
pub struct CrawlService<T, R, S, Q>
where
    T: ThreadSource,
    R: SubredditSource,
    S: RecordStore,
    Q: JobQueue,
{
    threads: T,
    subreddits: R,
    sink: IdempotentSink<S>,
    emitter: Emitter<Q>,
    pagination: PaginationPolicy,
    page_limit: u32,
}

impl<T, R, S, Q> CrawlService<T, R, S, Q>
where
    T: ThreadSource,
    R: SubredditSource,
    S: RecordStore,
    Q: JobQueue,
{
    pub fn new(threads: T, subreddits: R, store: S, queue: Q, config: &CrawlConfig) -> Self {
        Self {
            threads,
            subreddits,
            sink: IdempotentSink::new(store),
            emitter: Emitter::new(queue, config.schedule),
            pagination: PaginationPolicy::new(config.cold_start),
            page_limit: config.page_limit,
        }
    }

    pub async fn run(&self, job: &CrawlJob, ctx: &JobContext) -> Result<JobOutcome, AppError> {
        match job {
            CrawlJob::CrawlThread { board, thread } => self.crawl_thread(board, *thread).await,
            CrawlJob::CrawlThreadListing { board, baseline } => {
                self.crawl_thread_listing(board, baseline, ctx).await
            }
            CrawlJob::Scan {
                listing,
                subreddit,
                baseline,
            } => self.scan(*listing, subreddit, baseline, ctx).await,
            CrawlJob::Process {
                listing,
                subreddit,
                baseline,
                after,
            } => {
                self.process(*listing, subreddit, baseline, after.as_deref(), ctx)
                    .await
            }
        }
    }

    async fn crawl_thread(&self, board: &str, thread: u64) -> Result<JobOutcome, AppError> {
        tracing::info!(%board, thread, "Crawling thread");

        let posts = match self.threads.get_thread(board, thread).await {
            Ok(posts) => posts,
            Err(AppError::NotFound(msg)) => {
                tracing::warn!(%board, thread, %msg, "Thread is gone upstream");
                Vec::new()
            }
            Err(e) if e.is_malformed() => {
                tracing::warn!(%board, thread, error = %e, "Unreadable thread, skipping");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if posts.is_empty() {
            tracing::warn!(%board, thread, "Empty thread");
        }

        let records: Vec<ItemRecord> = posts.into_iter().map(ItemRecord::from).collect();
        let report = self.sink.write_batch(&records).await;
        tracing::info!(
            %board,
            thread,
            inserted = report.inserted,
            duplicates = report.duplicates,
            "Finished thread"
        );

        finish(outcome_of(&report), &report)
    }

    async fn crawl_thread_listing(
        &self,
        board: &str,
        baseline: &Baseline<u64>,
        ctx: &JobContext,
    ) -> Result<JobOutcome, AppError> {
        let mut outcome = JobOutcome::default();

        // One fetch serves both the diff and the stored baseline.
        let next_baseline = match self.threads.list_threads(board).await {
            Ok(live) => {
                let diff = diff_listing(baseline, live.into_iter().collect());
                tracing::info!(
                    %board,
                    live = diff.next_baseline.len(),
                    dead = diff.dead.len(),
                    "Polled thread listing"
                );

                for thread in &diff.dead {
                    let one_shot = CrawlJob::CrawlThread {
                        board: board.to_string(),
                        thread: *thread,
                    };
                    if self.emitter.emit(&one_shot, ctx).await? {
                        outcome.enqueued += 1;
                    }
                }
                diff.next_baseline
            }
            Err(e) if e.is_malformed() => {
                tracing::warn!(%board, error = %e, "Unreadable thread listing, keeping previous baseline");
                baseline.clone()
            }
            Err(e) => return Err(e),
        };

        let next_cycle = CrawlJob::CrawlThreadListing {
            board: board.to_string(),
            baseline: next_baseline,
        };
        if self.emitter.emit(&next_cycle, ctx).await? {
            outcome.enqueued += 1;
        }

        Ok(outcome)
    }

    async fn scan(
        &self,
        listing: Listing,
        subreddit: &str,
        baseline: &Baseline<String>,
        ctx: &JobContext,
    ) -> Result<JobOutcome, AppError> {
        tracing::info!(
            %subreddit,
            listing = listing.as_str(),
            baseline = baseline.len(),
            cold_start = baseline.is_empty(),
            "Scanning subreddit"
        );

        let (mut outcome, report, next_baseline) =
            match self.fetch_page(listing, subreddit, None).await? {
                Some(page) => {
                    let (outcome, report, step) =
                        self.walk_page(listing, subreddit, baseline, page, ctx).await?;
                    (outcome, report, Baseline::next_cycle(step.snapshot))
                }
                None => (JobOutcome::default(), BatchReport::default(), baseline.clone()),
            };

        let next_cycle = CrawlJob::Scan {
            listing,
            subreddit: subreddit.to_string(),
            baseline: next_baseline,
        };
        if self.emitter.emit(&next_cycle, ctx).await? {
            outcome.enqueued += 1;
        }

        finish(outcome, &report)
    }

    async fn process(
        &self,
        listing: Listing,
        subreddit: &str,
        baseline: &Baseline<String>,
        after: Option<&str>,
        ctx: &JobContext,
    ) -> Result<JobOutcome, AppError> {
        tracing::info!(%subreddit, listing = listing.as_str(), ?after, "Processing deeper page");

        let Some(page) = self.fetch_page(listing, subreddit, after).await? else {
            return Ok(JobOutcome::default());
        };
        let (outcome, report, _) = self.walk_page(listing, subreddit, baseline, page, ctx).await?;

        finish(outcome, &report)
    }

    /// Fetch one listing page. A malformed response is logged and yields `None`.
    async fn fetch_page(
        &self,
        listing: Listing,
        subreddit: &str,
        after: Option<&str>,
    ) -> Result<Option<Page<ItemRecord>>, AppError> {
        let fetched = match listing {
            Listing::Posts => self
                .subreddits
                .list_posts(subreddit, self.page_limit, after)
                .await
                .map(|page| page.map(ItemRecord::from)),
            Listing::Comments => self
                .subreddits
                .list_comments(subreddit, self.page_limit, after)
                .await
                .map(|page| page.map(ItemRecord::from)),
        };

        match fetched {
            Ok(page) => Ok(Some(page)),
            Err(e) if e.is_malformed() => {
                tracing::warn!(
                    %subreddit,
                    listing = listing.as_str(),
                    error = %e,
                    "Unreadable listing page, treating as empty"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist the page's new items and, if the whole page was new, emit the
    /// next page with the same inherited baseline.
    async fn walk_page(
        &self,
        listing: Listing,
        subreddit: &str,
        baseline: &Baseline<String>,
        page: Page<ItemRecord>,
        ctx: &JobContext,
    ) -> Result<(JobOutcome, BatchReport, PageStep<String>), AppError> {
        let step = self.pagination.step(
            baseline,
            page.items.iter().map(ItemRecord::listing_id),
            page.next_cursor.as_deref(),
        );

        let fresh: Vec<ItemRecord> = page
            .items
            .into_iter()
            .filter(|record| step.new_items.contains(&record.listing_id()))
            .collect();

        tracing::info!(
            %subreddit,
            listing = listing.as_str(),
            fetched = step.snapshot.len(),
            new = fresh.len(),
            descend = !step.is_exhausted(),
            "Diffed listing page"
        );

        let report = self.sink.write_batch(&fresh).await;
        let mut outcome = outcome_of(&report);

        if let Some(cursor) = &step.continue_from {
            let deeper = CrawlJob::Process {
                listing,
                subreddit: subreddit.to_string(),
                baseline: baseline.clone(),
                after: Some(cursor.clone()),
            };
            if self.emitter.emit(&deeper, ctx).await? {
                outcome.enqueued += 1;
            }
        }

        Ok((outcome, report, step))
    }
}

impl<T, R, S, Q> JobHandler for CrawlService<T, R, S, Q>
where
    T: ThreadSource,
    R: SubredditSource,
    S: RecordStore,
    Q: JobQueue,
{
    async fn handle(&self, job: &CrawlJob, ctx: &JobContext) -> Result<JobOutcome, AppError> {
        self.run(job, ctx).await
    }
}

fn outcome_of(report: &BatchReport) -> JobOutcome {
    JobOutcome {
        persisted: report.inserted,
        duplicates: report.duplicates,
        enqueued: 0,
    }
}

/// Surface the batch's aggregate error only after follow-ups were emitted.
fn finish(outcome: JobOutcome, report: &BatchReport) -> Result<JobOutcome, AppError> {
    match report.error() {
        Some(e) => Err(e),
        None => Ok(outcome),
    }
}
