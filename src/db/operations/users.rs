use chrono::NaiveDateTime;
use sqlx::Row;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn decode_user(row: &sqlx::postgres::PgRow) -> Result<UserRow, sqlx::Error> {
    Ok(UserRow {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn find_user_by_id(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "users" WHERE "id" = $1 LIMIT 1"#)
        .bind(user_id)
        .fetch_optional(proxy.pool())
        .await?;

    row.as_ref().map(decode_user).transpose()
}

pub async fn find_user_by_email(
    proxy: &DatabaseProxy,
    email: &str,
) -> Result<Option<UserRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "users" WHERE "email" = $1 LIMIT 1"#)
        .bind(email)
        .fetch_optional(proxy.pool())
        .await?;

    row.as_ref().map(decode_user).transpose()
}

pub async fn insert_user(proxy: &DatabaseProxy, user: &UserRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "users" ("id", "email", "display_name", "password_hash", "created_at", "updated_at")
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.display_name)
    .bind(&user.password_hash)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(proxy.pool())
    .await?;

    Ok(())
}
