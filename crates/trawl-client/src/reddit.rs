use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use trawl_core::error::AppError;
use trawl_core::models::{Page, RedditComment, RedditPost};
use trawl_core::traits::SubredditSource;
use url::Url;

use crate::http::{read_body, send_error, status_error};

pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";
pub const DEFAULT_AUTH_BASE: &str = "https://www.reddit.com";
const DEFAULT_USER_AGENT: &str = "trawl/0.1 (listing crawler)";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Credentials and endpoints for the Reddit listing API.
#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub api_base: String,
    pub auth_base: String,
    pub timeout: Duration,
}

impl RedditConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            auth_base: DEFAULT_AUTH_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Load from environment variables.
    ///
    /// Required: `REDDIT_OAUTH_CLIENT_ID`, `REDDIT_OAUTH_CLIENT_SECRET`.
    /// Optional: `REDDIT_USER_AGENT`, `REDDIT_API_BASE`, `REDDIT_AUTH_BASE`.
    pub fn from_env() -> Result<Self, AppError> {
        let client_id = std::env::var("REDDIT_OAUTH_CLIENT_ID")
            .map_err(|_| AppError::ConfigError("REDDIT_OAUTH_CLIENT_ID must be set".into()))?;
        let client_secret = std::env::var("REDDIT_OAUTH_CLIENT_SECRET")
            .map_err(|_| AppError::ConfigError("REDDIT_OAUTH_CLIENT_SECRET must be set".into()))?;

        let mut config = Self::new(client_id, client_secret);
        if let Ok(user_agent) = std::env::var("REDDIT_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Ok(api_base) = std::env::var("REDDIT_API_BASE") {
            config.api_base = api_base;
        }
        if let Ok(auth_base) = std::env::var("REDDIT_AUTH_BASE") {
            config.auth_base = auth_base;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Reddit listing client using application-only OAuth.
///
/// The access token is cached per client (shared across clones). A 401 from
/// the listing API triggers one refresh and one retry.
#[derive(Clone)]
pub struct RedditClient {
    client: Client,
    config: RedditConfig,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: RedditConfig {
                api_base: config.api_base.trim_end_matches('/').to_string(),
                auth_base: config.auth_base.trim_end_matches('/').to_string(),
                ..config
            },
            token: Arc::new(Mutex::new(None)),
        })
    }

    pub fn from_env() -> Result<Self, AppError> {
        Self::new(RedditConfig::from_env()?)
    }

    fn timeout_secs(&self) -> u64 {
        self.config.timeout.as_secs()
    }

    /// Cached token, or a new one when missing, expired, or `force_refresh`.
    async fn access_token(&self, force_refresh: bool) -> Result<String, AppError> {
        let mut cached = self.token.lock().await;
        if !force_refresh
            && let Some(token) = cached.as_ref().filter(|t| t.is_fresh())
        {
            return Ok(token.access_token.clone());
        }

        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn fetch_token(&self) -> Result<CachedToken, AppError> {
        let url = format!("{}/api/v1/access_token", self.config.auth_base);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout_secs()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::AuthExpired(format!(
                "token endpoint rejected client credentials (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, &url));
        }

        let body = read_body(response, self.timeout_secs()).await?;
        let token = parse_token(&body)?;
        tracing::info!(expires_in = ?token.expires_in, "Fetched new OAuth access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: token.expires_in.map(|secs| {
                Instant::now() + Duration::from_secs(secs).saturating_sub(TOKEN_EXPIRY_MARGIN)
            }),
        })
    }

    fn listing_url(
        &self,
        subreddit: &str,
        endpoint: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| AppError::ConfigError(format!("Invalid Reddit API URL: {e}")))?;

        // Segments are percent-encoded, so a subreddit name cannot alter the path or query.
        url.path_segments_mut()
            .map_err(|_| {
                AppError::ConfigError(format!(
                    "Reddit API base cannot carry a path: {}",
                    self.config.api_base
                ))
            })?
            .pop_if_empty()
            .extend(["r", subreddit, format!("{endpoint}.json").as_str()]);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(after) = after.filter(|a| !a.is_empty()) {
                query.append_pair("after", after);
            }
        }
        Ok(url)
    }

    async fn send_listing(&self, url: &Url, access_token: &str) -> Result<Response, AppError> {
        self.client
            .get(url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout_secs()))
    }

    /// GET a listing page, refreshing the token once on 401.
    async fn get_listing(
        &self,
        subreddit: &str,
        endpoint: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<String, AppError> {
        let url = self.listing_url(subreddit, endpoint, limit, after)?;
        tracing::debug!(%url, "GET");

        let token = self.access_token(false).await?;
        let mut response = self.send_listing(&url, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(%subreddit, "Access token rejected, refreshing");
            let token = self.access_token(true).await?;
            response = self.send_listing(&url, &token).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(AppError::AuthExpired(format!(
                    "listing {url} rejected a freshly issued token"
                )));
            }
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("r/{subreddit}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, url.as_str()));
        }

        read_body(response, self.timeout_secs()).await
    }
}

impl SubredditSource for RedditClient {
    async fn list_posts(
        &self,
        subreddit: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Page<RedditPost>, AppError> {
        let body = self.get_listing(subreddit, "new", limit, after).await?;
        parse_posts(&body)
    }

    async fn list_comments(
        &self,
        subreddit: &str,
        limit: u32,
        after: Option<&str>,
    ) -> Result<Page<RedditComment>, AppError> {
        let body = self.get_listing(subreddit, "comments", limit, after).await?;
        parse_comments(&body)
    }
}

// ---- Wire types ----

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct PostFields {
    name: String,
    subreddit_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: Option<String>,
    #[serde(default)]
    link_flair_text: Option<String>,
    #[serde(default)]
    author_fullname: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    media: Option<serde_json::Value>,
    created_utc: f64,
}

#[derive(Deserialize)]
struct CommentFields {
    name: String,
    subreddit_id: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    author_fullname: Option<String>,
    link_id: String,
    parent_id: String,
    created_utc: f64,
}

fn parse_token(body: &str) -> Result<TokenResponse, AppError> {
    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AppError::MalformedResponse(format!("token response: {e}")))?;
    if token.access_token.is_empty() {
        return Err(AppError::MalformedResponse(
            "token response has an empty access_token".into(),
        ));
    }
    Ok(token)
}

fn parse_listing<T>(
    body: &str,
    what: &str,
    convert: impl Fn(serde_json::Value) -> Result<T, AppError>,
) -> Result<Page<T>, AppError> {
    let listing: Listing = serde_json::from_str(body)
        .map_err(|e| AppError::MalformedResponse(format!("{what} listing: {e}")))?;

    let items = listing
        .data
        .children
        .into_iter()
        .map(|child| convert(child.data))
        .collect::<Result<Vec<_>, _>>()?;

    let next_cursor = listing.data.after.filter(|after| !after.is_empty());
    Ok(Page::new(items, next_cursor))
}

/// Parse a `/new.json` listing body.
pub fn parse_posts(body: &str) -> Result<Page<RedditPost>, AppError> {
    parse_listing(body, "post", |raw| {
        let fields: PostFields = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::MalformedResponse(format!("post: {e}")))?;

        Ok(RedditPost {
            subreddit_id: fields.subreddit_id,
            name: fields.name,
            title: fields.title,
            body: fields.selftext,
            flair: fields.link_flair_text,
            author: fields.author_fullname,
            url: fields.url,
            media: fields.media.filter(|m| !m.is_null()),
            created_at: epoch_seconds(fields.created_utc)?,
            raw,
        })
    })
}

/// Parse a `/comments.json` listing body.
pub fn parse_comments(body: &str) -> Result<Page<RedditComment>, AppError> {
    parse_listing(body, "comment", |raw| {
        let fields: CommentFields = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::MalformedResponse(format!("comment: {e}")))?;

        Ok(RedditComment {
            subreddit_id: fields.subreddit_id,
            name: fields.name,
            body: fields.body,
            author: fields.author_fullname,
            link_id: fields.link_id,
            parent_id: fields.parent_id,
            created_at: epoch_seconds(fields.created_utc)?,
            raw,
        })
    })
}

fn epoch_seconds(secs: f64) -> Result<DateTime<Utc>, AppError> {
    if !secs.is_finite() {
        return Err(AppError::MalformedResponse(format!(
            "created_utc is not a number: {secs}"
        )));
    }
    Utc.timestamp_opt(secs.trunc() as i64, 0)
        .single()
        .ok_or_else(|| AppError::MalformedResponse(format!("created_utc out of range: {secs}")))
}
