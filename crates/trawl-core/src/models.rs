use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque token marking where the next page begins. `None` at the end of the listing.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Uniqueness key shared by every stored record: `(entity, identifier, created_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub entity_id: String,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.entity_id,
            self.identifier,
            self.created_at.timestamp()
        )
    }
}

/// A post inside an imageboard thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadPost {
    pub board: String,
    pub thread_number: u64,
    pub post_number: u64,
    /// Subject line, usually only present on the opening post.
    pub title: Option<String>,
    /// Comment body (HTML as served by the API).
    pub body: Option<String>,
    pub reply_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    /// Thread the post replies to; `0` marks the opening post.
    pub parent_ref: u64,
    pub raw: serde_json::Value,
}

/// A submission in a subreddit listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub subreddit_id: String,
    /// Fullname, e.g. `t3_abc123`.
    pub name: String,
    pub title: String,
    pub body: Option<String>,
    pub flair: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub media: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// A comment in a subreddit's comment stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditComment {
    pub subreddit_id: String,
    /// Fullname, e.g. `t1_abc123`.
    pub name: String,
    pub body: String,
    pub author: Option<String>,
    pub link_id: String,
    pub parent_id: String,
    pub created_at: DateTime<Utc>,
    pub raw: serde_json::Value,
}

/// Any record the crawler persists.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRecord {
    ThreadPost(ThreadPost),
    RedditPost(RedditPost),
    RedditComment(RedditComment),
}

impl ItemRecord {
    pub fn key(&self) -> RecordKey {
        match self {
            ItemRecord::ThreadPost(p) => RecordKey {
                entity_id: p.board.clone(),
                identifier: p.post_number.to_string(),
                created_at: p.created_at,
            },
            ItemRecord::RedditPost(p) => RecordKey {
                entity_id: p.subreddit_id.clone(),
                identifier: p.name.clone(),
                created_at: p.created_at,
            },
            ItemRecord::RedditComment(c) => RecordKey {
                entity_id: c.subreddit_id.clone(),
                identifier: c.name.clone(),
                created_at: c.created_at,
            },
        }
    }

    /// Identifier the listing APIs use for this record.
    pub fn listing_id(&self) -> String {
        match self {
            ItemRecord::ThreadPost(p) => p.post_number.to_string(),
            ItemRecord::RedditPost(p) => p.name.clone(),
            ItemRecord::RedditComment(c) => c.name.clone(),
        }
    }
}

impl From<ThreadPost> for ItemRecord {
    fn from(post: ThreadPost) -> Self {
        ItemRecord::ThreadPost(post)
    }
}

impl From<RedditPost> for ItemRecord {
    fn from(post: RedditPost) -> Self {
        ItemRecord::RedditPost(post)
    }
}

impl From<RedditComment> for ItemRecord {
    fn from(comment: RedditComment) -> Self {
        ItemRecord::RedditComment(comment)
    }
}

/// Result of a single idempotent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    /// A record with the same key already existed; nothing was changed.
    Duplicate,
}
