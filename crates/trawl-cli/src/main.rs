use std::time::Duration;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use clap::{Parser, Subcommand};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use trawl_client::{ChanClient, RedditClient, RedditConfig};
use trawl_core::job::{CrawlJob, JobKind, JobStatus, Listing, NewJob, WorkerConfig};
use trawl_core::{Baseline, CrawlConfig, CrawlService, JobQueue, TracingWorkerReporter, WorkerService};
use trawl_db::{CrawlJobRepository, Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "trawl", version, about = "Incremental imageboard and subreddit crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run crawl workers until Ctrl-C
    Worker {
        /// Number of concurrent workers
        #[arg(short, long, env = "TRAWL_CONCURRENCY", default_value_t = 3)]
        concurrency: usize,

        /// Queue to serve (repeatable; defaults to every crawl queue)
        #[arg(short, long = "queue")]
        queues: Vec<String>,

        /// Seconds to sleep when no job is due
        #[arg(long, env = "TRAWL_POLL_INTERVAL_SECS", default_value_t = 5)]
        poll_interval_secs: u64,

        /// Seconds a claimed job may run before another worker may take it over
        #[arg(long, env = "TRAWL_JOB_LEASE_SECS", default_value_t = 600)]
        lease_secs: u64,
    },

    /// Start the post and comment scan cycles for a subreddit
    SeedReddit {
        /// Subreddit name, without the r/ prefix
        subreddit: String,
    },

    /// Start the thread listing cycle for an imageboard board
    SeedBoard {
        /// Board name, e.g. "g"
        board: String,
    },

    /// List queued crawl jobs
    Jobs {
        /// Only show jobs with this status (pending, running, completed, failed)
        #[arg(short, long)]
        status: Option<JobStatus>,

        /// Number of jobs to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete completed jobs older than the given number of days
    Purge {
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..))]
        older_than_days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trawl=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Worker {
            concurrency,
            queues,
            poll_interval_secs,
            lease_secs,
        } => {
            let db = connect_db().await?;
            cmd_worker(&db, concurrency, queues, poll_interval_secs, lease_secs).await?;
        }
        Commands::SeedReddit { subreddit } => {
            let db = connect_db().await?;
            let subreddit = subreddit.trim_start_matches("r/").to_string();
            let seeds = [Listing::Posts, Listing::Comments].map(|listing| CrawlJob::Scan {
                listing,
                subreddit: subreddit.clone(),
                baseline: Baseline::new(),
            });
            cmd_seed(&db.job_repo(), &seeds).await?;
        }
        Commands::SeedBoard { board } => {
            let db = connect_db().await?;
            let seed = CrawlJob::CrawlThreadListing {
                board: board.trim_matches('/').to_string(),
                baseline: Baseline::new(),
            };
            cmd_seed(&db.job_repo(), &[seed]).await?;
        }
        Commands::Jobs { status, limit } => {
            let db = connect_db().await?;
            cmd_jobs(&db.job_repo(), status, limit).await?;
        }
        Commands::Purge { older_than_days } => {
            let db = connect_db().await?;
            let purged = db
                .job_repo()
                .purge_completed(TimeDelta::days(i64::from(older_than_days)))
                .await?;
            tracing::info!(purged, older_than_days, "Purged completed jobs");
            println!("Purged {purged} completed jobs");
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    Ok(db)
}

async fn cmd_worker(
    db: &Database,
    concurrency: usize,
    queues: Vec<String>,
    poll_interval_secs: u64,
    lease_secs: u64,
) -> Result<()> {
    anyhow::ensure!(concurrency > 0, "--concurrency must be at least 1");
    anyhow::ensure!(poll_interval_secs > 0, "--poll-interval-secs must be at least 1");
    anyhow::ensure!(lease_secs > 0, "--lease-secs must be at least 1");
    let lease = Duration::from_secs(lease_secs);

    let queues = if queues.is_empty() {
        JobKind::all_queues()
    } else {
        let known = JobKind::all_queues();
        if let Some(unknown) = queues.iter().find(|q| !known.contains(q)) {
            anyhow::bail!("Unknown queue '{unknown}'. Known queues: {}", known.join(", "));
        }
        queues
    };

    let crawl_config = CrawlConfig::from_env()?;
    let chan = ChanClient::from_env()?;
    let reddit = reddit_client(&queues)?;

    let handler = CrawlService::new(
        chan,
        reddit,
        db.record_repo(),
        db.job_repo(),
        &crawl_config,
    );

    tracing::info!(
        concurrency,
        queues = %queues.join(","),
        cold_start = %crawl_config.cold_start,
        page_limit = crawl_config.page_limit,
        lease_secs,
        "Starting workers"
    );

    let cancel = CancellationToken::new();
    let mut workers = JoinSet::new();
    for _ in 0..concurrency {
        let config = WorkerConfig::default()
            .with_poll_interval(Duration::from_secs(poll_interval_secs))
            .with_queues(queues.clone());
        let worker = WorkerService::new(db.job_repo().with_lease(lease), handler.clone(), config);
        let cancel = cancel.clone();
        workers.spawn(async move { worker.run(cancel, &TracingWorkerReporter).await });
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    tracing::info!("Shutdown signal received");
    cancel.cancel();

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Worker exited with error"),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
        }
    }

    Ok(())
}

/// The Reddit client needs credentials only when a subreddit queue is served.
fn reddit_client(queues: &[String]) -> Result<RedditClient> {
    let serves_reddit = JobKind::ALL
        .iter()
        .filter(|kind| matches!(kind, JobKind::Scan(_) | JobKind::Process(_)))
        .any(|kind| queues.iter().any(|q| q == kind.queue()));

    let config = if serves_reddit {
        RedditConfig::from_env()
            .context("Reddit credentials are required to serve subreddit queues")?
    } else {
        RedditConfig::new("", "")
    };
    Ok(RedditClient::new(config)?)
}

async fn cmd_seed(queue: &CrawlJobRepository, seeds: &[CrawlJob]) -> Result<()> {
    for seed in seeds {
        let envelope = seed.to_envelope(None)?;
        let job = queue
            .enqueue(NewJob::new(envelope))
            .await?
            .context("Seed job was not enqueued")?;

        tracing::info!(job_id = %job.id, job_type = %seed.kind(), entity = %seed.entity(), "Seeded");
        println!("{}  {}  {}", job.id, seed.kind(), seed.entity());
    }
    Ok(())
}

async fn cmd_jobs(queue: &CrawlJobRepository, status: Option<JobStatus>, limit: usize) -> Result<()> {
    let jobs = queue.list_jobs(status, limit).await?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    for job in &jobs {
        let run_at = job
            .envelope
            .scheduled_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "now".to_string());
        let entity = job
            .envelope
            .args
            .first()
            .map(|arg| arg.as_str().map(str::to_owned).unwrap_or_else(|| arg.to_string()))
            .unwrap_or_default();

        println!(
            "  [{}] {} {} ({}) run_at={} retries={}/{}",
            job.status,
            job.id,
            job.envelope.job_type,
            entity,
            run_at,
            job.retry_count,
            job.max_retries,
        );
        if let Some(error) = &job.error_message {
            println!("      last error: {error}");
        }
    }

    println!("\nTotal: {} jobs", jobs.len());

    Ok(())
}
