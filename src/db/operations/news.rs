use chrono::{NaiveDateTime, Utc};
use sqlx::Row;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone)]
pub struct NewsRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub level: i32,
    pub keywords: Vec<String>,
    pub vocabulary_used: Vec<String>,
    pub source: Vec<String>,
    pub audio_url: Option<String>,
    pub audio_key: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The level column carries generator output and predates the integer
/// contract, so old rows may hold arbitrary text. Anything unparseable
/// decodes to level 1; untyped values stop here and never reach callers.
fn decode_level(raw: &str) -> i32 {
    raw.trim().parse::<i32>().map(|v| v.clamp(1, 10)).unwrap_or(1)
}

fn decode_news(row: &sqlx::postgres::PgRow) -> Result<NewsRow, sqlx::Error> {
    let level_raw: String = row.try_get("level")?;
    Ok(NewsRow {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        level: decode_level(&level_raw),
        keywords: row.try_get("keywords")?,
        vocabulary_used: row.try_get("vocabulary_used")?,
        source: row.try_get("source")?,
        audio_url: row.try_get("audio_url")?,
        audio_key: row.try_get("audio_key")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn list_news(proxy: &DatabaseProxy, user_id: &str) -> Result<Vec<NewsRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM "news"
        WHERE "user_id" = $1
        ORDER BY "created_at" DESC, "id" DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter().map(decode_news).collect()
}

pub async fn find_news(
    proxy: &DatabaseProxy,
    user_id: &str,
    news_id: &str,
) -> Result<Option<NewsRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "news" WHERE "user_id" = $1 AND "id" = $2 LIMIT 1"#)
        .bind(user_id)
        .bind(news_id)
        .fetch_optional(proxy.pool())
        .await?;

    row.as_ref().map(decode_news).transpose()
}

pub async fn has_recent_news(
    proxy: &DatabaseProxy,
    user_id: &str,
    since: NaiveDateTime,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "news" WHERE "user_id" = $1 AND "created_at" >= $2"#,
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(proxy.pool())
    .await?;

    Ok(count > 0)
}

pub async fn insert_news(proxy: &DatabaseProxy, news: &NewsRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "news" (
            "id", "user_id", "title", "content", "level", "keywords",
            "vocabulary_used", "source", "audio_url", "audio_key", "created_at", "updated_at"
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&news.id)
    .bind(&news.user_id)
    .bind(&news.title)
    .bind(&news.content)
    .bind(news.level.to_string())
    .bind(&news.keywords)
    .bind(&news.vocabulary_used)
    .bind(&news.source)
    .bind(news.audio_url.as_deref())
    .bind(news.audio_key.as_deref())
    .bind(news.created_at)
    .bind(news.updated_at)
    .execute(proxy.pool())
    .await?;

    Ok(())
}

pub async fn delete_news(
    proxy: &DatabaseProxy,
    user_id: &str,
    news_id: &str,
) -> Result<Option<NewsRow>, sqlx::Error> {
    let existing = find_news(proxy, user_id, news_id).await?;
    if existing.is_none() {
        return Ok(None);
    }

    sqlx::query(r#"DELETE FROM "news" WHERE "user_id" = $1 AND "id" = $2"#)
        .bind(user_id)
        .bind(news_id)
        .execute(proxy.pool())
        .await?;

    Ok(existing)
}

pub fn cutoff(now: NaiveDateTime, hours: i64) -> NaiveDateTime {
    now - chrono::Duration::hours(hours)
}

pub fn now_naive() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_decode_is_lenient() {
        assert_eq!(decode_level("3"), 3);
        assert_eq!(decode_level(" 7 "), 7);
        assert_eq!(decode_level("advanced"), 1);
        assert_eq!(decode_level(""), 1);
        assert_eq!(decode_level("42"), 10);
        assert_eq!(decode_level("-2"), 1);
    }
}
