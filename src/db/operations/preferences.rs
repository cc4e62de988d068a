use chrono::{NaiveDateTime, Utc};
use sqlx::Row;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone)]
pub struct PreferencesRow {
    pub id: String,
    pub user_id: String,
    pub level: i32,
    pub interests: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn decode_preferences(row: &sqlx::postgres::PgRow) -> Result<PreferencesRow, sqlx::Error> {
    Ok(PreferencesRow {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        level: row.try_get("level")?,
        interests: row.try_get("interests")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn find_preferences(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Option<PreferencesRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "user_preferences" WHERE "user_id" = $1 LIMIT 1"#)
        .bind(user_id)
        .fetch_optional(proxy.pool())
        .await?;

    row.as_ref().map(decode_preferences).transpose()
}

pub async fn insert_preferences(
    proxy: &DatabaseProxy,
    preferences: &PreferencesRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user_preferences" ("id", "user_id", "level", "interests", "created_at", "updated_at")
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&preferences.id)
    .bind(&preferences.user_id)
    .bind(preferences.level)
    .bind(&preferences.interests)
    .bind(preferences.created_at)
    .bind(preferences.updated_at)
    .execute(proxy.pool())
    .await?;

    Ok(())
}

pub async fn update_preferences(
    proxy: &DatabaseProxy,
    user_id: &str,
    level: Option<i32>,
    interests: Option<&[String]>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "user_preferences"
        SET
          "level" = COALESCE($1, "level"),
          "interests" = COALESCE($2, "interests"),
          "updated_at" = $3
        WHERE "user_id" = $4
        "#,
    )
    .bind(level)
    .bind(interests)
    .bind(Utc::now().naive_utc())
    .bind(user_id)
    .execute(proxy.pool())
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_preferences(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "user_preferences" WHERE "user_id" = $1"#)
        .bind(user_id)
        .execute(proxy.pool())
        .await?;

    Ok(result.rows_affected() > 0)
}
