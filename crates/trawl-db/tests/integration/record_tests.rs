use chrono::{TimeZone, Utc};
use trawl_core::models::{ItemRecord, RedditComment, RedditPost, ThreadPost, WriteOutcome};
use trawl_core::traits::RecordStore;
use trawl_db::RecordRepository;

use crate::common::setup_test_db;

fn thread_post(post_number: u64) -> ItemRecord {
    ItemRecord::ThreadPost(ThreadPost {
        board: "g".into(),
        thread_number: 100,
        post_number,
        title: (post_number == 100).then(|| "OP".to_string()),
        body: Some("text".into()),
        reply_count: Some(1),
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        parent_ref: if post_number == 100 { 0 } else { 100 },
        raw: serde_json::json!({ "no": post_number }),
    })
}

fn reddit_post(name: &str, title: &str) -> ItemRecord {
    ItemRecord::RedditPost(RedditPost {
        subreddit_id: "t5_2qh1i".into(),
        name: name.into(),
        title: title.into(),
        body: Some(String::new()),
        flair: None,
        author: Some("t2_abc".into()),
        url: Some("https://example.com".into()),
        media: Some(serde_json::json!({ "type": "video" })),
        created_at: Utc.timestamp_opt(1_709_294_400, 0).unwrap(),
        raw: serde_json::json!({ "name": name, "title": title }),
    })
}

fn reddit_comment(name: &str) -> ItemRecord {
    ItemRecord::RedditComment(RedditComment {
        subreddit_id: "t5_2qh1i".into(),
        name: name.into(),
        body: "hello".into(),
        author: None,
        link_id: "t3_x".into(),
        parent_id: "t3_x".into(),
        created_at: Utc.timestamp_opt(1_709_294_500, 0).unwrap(),
        raw: serde_json::json!({ "name": name }),
    })
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn thread_post_insert_then_duplicate() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool.clone());

    assert_eq!(repo.write(&thread_post(100)).await.unwrap(), WriteOutcome::Inserted);
    assert_eq!(repo.write(&thread_post(101)).await.unwrap(), WriteOutcome::Inserted);
    assert_eq!(repo.write(&thread_post(100)).await.unwrap(), WriteOutcome::Duplicate);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chan_posts")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);

    let (resto,): (i64,) =
        sqlx::query_as("SELECT resto FROM chan_posts WHERE post_number = 101")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(resto, 100);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn reddit_post_first_writer_wins() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool.clone());

    assert_eq!(
        repo.write(&reddit_post("t3_a", "original")).await.unwrap(),
        WriteOutcome::Inserted
    );
    assert_eq!(
        repo.write(&reddit_post("t3_a", "edited")).await.unwrap(),
        WriteOutcome::Duplicate
    );

    let (title,): (String,) = sqlx::query_as("SELECT title FROM reddit_posts WHERE name = 't3_a'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title, "original");
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn reddit_comment_stores_raw_payload() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool.clone());

    repo.write(&reddit_comment("t1_a")).await.unwrap();
    assert_eq!(
        repo.write(&reddit_comment("t1_a")).await.unwrap(),
        WriteOutcome::Duplicate
    );

    let (data,): (serde_json::Value,) =
        sqlx::query_as("SELECT data FROM reddit_comments WHERE name = 't1_a'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(data["name"], "t1_a");
}
