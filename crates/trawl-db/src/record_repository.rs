use sqlx::{PgPool, Pool, Postgres};
use trawl_core::error::AppError;
use trawl_core::models::{ItemRecord, RedditComment, RedditPost, ThreadPost, WriteOutcome};
use trawl_core::traits::RecordStore;

/// Insert-only store for crawled records.
///
/// Every insert is `ON CONFLICT DO NOTHING` on the table's natural key, so a
/// record that is already stored reports [`WriteOutcome::Duplicate`] and the
/// existing row is left untouched.
#[derive(Clone)]
pub struct RecordRepository {
    pool: Pool<Postgres>,
}

impl RecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_thread_post(&self, post: &ThreadPost) -> Result<WriteOutcome, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO chan_posts
                (board_name, thread_number, post_number, title, text_body, num_replies, created_utc, resto, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (board_name, post_number, created_utc) DO NOTHING
            "#,
        )
        .bind(&post.board)
        .bind(post.thread_number as i64)
        .bind(post.post_number as i64)
        .bind(&post.title)
        .bind(&post.body)
        .bind(post.reply_count)
        .bind(post.created_at)
        .bind(post.parent_ref as i64)
        .bind(&post.raw)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(outcome(result.rows_affected()))
    }

    pub async fn upsert_reddit_post(&self, post: &RedditPost) -> Result<WriteOutcome, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO reddit_posts
                (subreddit_id, name, title, text, flair, author_fullname, url, media, created_utc, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (subreddit_id, name, created_utc) DO NOTHING
            "#,
        )
        .bind(&post.subreddit_id)
        .bind(&post.name)
        .bind(&post.title)
        .bind(&post.body)
        .bind(&post.flair)
        .bind(&post.author)
        .bind(&post.url)
        .bind(&post.media)
        .bind(post.created_at)
        .bind(&post.raw)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(outcome(result.rows_affected()))
    }

    pub async fn upsert_reddit_comment(
        &self,
        comment: &RedditComment,
    ) -> Result<WriteOutcome, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO reddit_comments
                (subreddit_id, name, text, author_fullname, link_id, parent_id, created_utc, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (subreddit_id, name, created_utc) DO NOTHING
            "#,
        )
        .bind(&comment.subreddit_id)
        .bind(&comment.name)
        .bind(&comment.body)
        .bind(&comment.author)
        .bind(&comment.link_id)
        .bind(&comment.parent_id)
        .bind(comment.created_at)
        .bind(&comment.raw)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(outcome(result.rows_affected()))
    }
}

impl RecordStore for RecordRepository {
    async fn write(&self, record: &ItemRecord) -> Result<WriteOutcome, AppError> {
        match record {
            ItemRecord::ThreadPost(post) => self.upsert_thread_post(post).await,
            ItemRecord::RedditPost(post) => self.upsert_reddit_post(post).await,
            ItemRecord::RedditComment(comment) => self.upsert_reddit_comment(comment).await,
        }
    }
}

fn outcome(rows_affected: u64) -> WriteOutcome {
    if rows_affected == 0 {
        WriteOutcome::Duplicate
    } else {
        WriteOutcome::Inserted
    }
}
