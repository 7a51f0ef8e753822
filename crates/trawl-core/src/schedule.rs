//! Follow-up scheduling.
//!
//! Every job a handler emits goes through [`Emitter::emit`], which stamps the
//! run time and a dedupe key derived from the emitting job. A redelivered
//! parent therefore re-emits the same keys and the queue drops them.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};

use crate::error::AppError;
use crate::job::{CrawlJob, JobContext, JobKind, Listing, NewJob};
use crate::job_queue::JobQueue;

/// Fixed delays between top-level cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub listing_poll: TimeDelta,
    pub post_scan: TimeDelta,
    pub comment_scan: TimeDelta,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            listing_poll: TimeDelta::minutes(5),
            post_scan: TimeDelta::hours(1),
            comment_scan: TimeDelta::minutes(15),
        }
    }
}

impl Schedule {
    /// Delay before a job of `kind` may run. `None` means immediately.
    pub fn delay_for(&self, kind: JobKind) -> Option<TimeDelta> {
        match kind {
            JobKind::CrawlThreadListing => Some(self.listing_poll),
            JobKind::Scan(Listing::Posts) => Some(self.post_scan),
            JobKind::Scan(Listing::Comments) => Some(self.comment_scan),
            JobKind::CrawlThread | JobKind::Process(_) => None,
        }
    }

    /// Absolute UTC run time, truncated to whole seconds.
    pub fn run_at(&self, kind: JobKind, started_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.delay_for(kind)
            .map(|delay| (started_at + delay).trunc_subsecs(0))
    }
}

/// Enqueues follow-up jobs on behalf of a running job.
#[derive(Clone)]
pub struct Emitter<Q: JobQueue> {
    queue: Q,
    schedule: Schedule,
}

impl<Q: JobQueue> Emitter<Q> {
    pub fn new(queue: Q, schedule: Schedule) -> Self {
        Self { queue, schedule }
    }

    /// Enqueue `job` as a follow-up of the job described by `ctx`.
    ///
    /// Returns `false` when this parent already emitted the same follow-up.
    pub async fn emit(&self, job: &CrawlJob, ctx: &JobContext) -> Result<bool, AppError> {
        let kind = job.kind();
        let scheduled_at = self.schedule.run_at(kind, ctx.started_at);
        let envelope = job.to_envelope(scheduled_at)?;
        let dedupe_key = format!("{}:{}", ctx.job_id, job.follow_up_key());

        match self
            .queue
            .enqueue(NewJob::new(envelope).with_dedupe_key(dedupe_key))
            .await?
        {
            Some(queued) => {
                tracing::info!(
                    job_id = %queued.id,
                    job_type = %kind,
                    entity = %job.entity(),
                    scheduled_at = ?scheduled_at,
                    "Enqueued follow-up job"
                );
                Ok(true)
            }
            None => {
                tracing::debug!(job_type = %kind, entity = %job.entity(), "Follow-up already enqueued");
                Ok(false)
            }
        }
    }
}
