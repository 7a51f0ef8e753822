use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use trawl_core::error::AppError;
use trawl_core::models::ThreadPost;
use trawl_core::traits::ThreadSource;

use crate::http::{read_body, send_error, status_error};

pub const DEFAULT_CHAN_API_BASE: &str = "https://a.4cdn.org";
const DEFAULT_USER_AGENT: &str = "trawl/0.1 (listing crawler)";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the read-only imageboard JSON API.
///
/// Serves two endpoints: `/{board}/threads.json` for the live thread list and
/// `/{board}/thread/{no}.json` for a thread's posts.
#[derive(Clone)]
pub struct ChanClient {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl ChanClient {
    pub fn new() -> Result<Self, AppError> {
        Self::with_base_url(DEFAULT_CHAN_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, AppError> {
        Self::build(base_url, DEFAULT_USER_AGENT, DEFAULT_TIMEOUT)
    }

    /// Reads `CHAN_API_BASE`, falling back to the public API.
    pub fn from_env() -> Result<Self, AppError> {
        let base_url =
            std::env::var("CHAN_API_BASE").unwrap_or_else(|_| DEFAULT_CHAN_API_BASE.to_string());
        Self::with_base_url(&base_url)
    }

    fn build(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// GET `url`; `Ok(None)` on 404.
    async fn get(&self, url: &str) -> Result<Option<String>, AppError> {
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout_secs))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, url));
        }

        read_body(response, self.timeout_secs).await.map(Some)
    }
}

impl ThreadSource for ChanClient {
    async fn list_threads(&self, board: &str) -> Result<Vec<u64>, AppError> {
        let url = format!("{}/{}/threads.json", self.base_url, board);
        let body = self
            .get(&url)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("board /{board}/")))?;

        let threads = parse_thread_list(&body)?;
        tracing::debug!(%board, count = threads.len(), "Fetched thread list");
        Ok(threads)
    }

    async fn get_thread(&self, board: &str, thread: u64) -> Result<Vec<ThreadPost>, AppError> {
        let url = format!("{}/{}/thread/{}.json", self.base_url, board, thread);
        let body = self
            .get(&url)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("thread /{board}/{thread}")))?;

        parse_thread(board, thread, &body)
    }
}

// ---- Wire types ----

#[derive(Deserialize)]
struct CatalogPage {
    threads: Vec<CatalogThread>,
}

#[derive(Deserialize)]
struct CatalogThread {
    no: u64,
}

#[derive(Deserialize)]
struct ThreadBody {
    posts: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct PostFields {
    no: u64,
    time: i64,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    com: Option<String>,
    #[serde(default)]
    replies: Option<i32>,
    #[serde(default)]
    resto: u64,
}

/// Flatten `threads.json` pages into thread numbers, in listing order.
pub fn parse_thread_list(body: &str) -> Result<Vec<u64>, AppError> {
    let pages: Vec<CatalogPage> = serde_json::from_str(body)
        .map_err(|e| AppError::MalformedResponse(format!("thread list: {e}")))?;

    Ok(pages
        .into_iter()
        .flat_map(|page| page.threads)
        .map(|thread| thread.no)
        .collect())
}

/// Parse a thread body into posts, keeping each post's raw JSON.
pub fn parse_thread(board: &str, thread: u64, body: &str) -> Result<Vec<ThreadPost>, AppError> {
    let parsed: ThreadBody = serde_json::from_str(body)
        .map_err(|e| AppError::MalformedResponse(format!("thread /{board}/{thread}: {e}")))?;

    parsed
        .posts
        .into_iter()
        .map(|raw| {
            let fields: PostFields = serde_json::from_value(raw.clone()).map_err(|e| {
                AppError::MalformedResponse(format!("post in /{board}/{thread}: {e}"))
            })?;

            Ok(ThreadPost {
                board: board.to_string(),
                thread_number: thread,
                post_number: fields.no,
                title: fields.sub,
                body: fields.com,
                reply_count: fields.replies,
                created_at: epoch_seconds(fields.time)?,
                parent_ref: fields.resto,
                raw,
            })
        })
        .collect()
}

fn epoch_seconds(secs: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| AppError::MalformedResponse(format!("timestamp out of range: {secs}")))
}
