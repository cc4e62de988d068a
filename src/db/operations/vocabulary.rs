use chrono::{NaiveDateTime, Utc};
use sqlx::Row;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone)]
pub struct WordRow {
    pub id: String,
    pub word: String,
    pub definition_en: String,
    pub definition_zh: String,
    pub difficulty: i32,
    pub part_of_speech: String,
    pub root_word: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct UserWordRow {
    pub id: String,
    pub user_id: String,
    pub word_id: String,
    pub learn_count: i32,
    pub fluency: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct WordExampleRow {
    pub id: String,
    pub word_id: String,
    pub sentence: String,
}

/// Join of a user's tracking row with the global word text, in the stable
/// order the selection engine expects (insertion order of the tracking rows).
#[derive(Debug, Clone)]
pub struct TrackedWordRow {
    pub word: String,
    pub learn_count: i32,
    pub fluency: i32,
    pub updated_at: NaiveDateTime,
}

fn decode_word(row: &sqlx::postgres::PgRow) -> Result<WordRow, sqlx::Error> {
    Ok(WordRow {
        id: row.try_get("id")?,
        word: row.try_get("word")?,
        definition_en: row.try_get("definition_en")?,
        definition_zh: row.try_get("definition_zh")?,
        difficulty: row.try_get("difficulty")?,
        part_of_speech: row.try_get("part_of_speech")?,
        root_word: row.try_get("root_word")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_user_word(row: &sqlx::postgres::PgRow) -> Result<UserWordRow, sqlx::Error> {
    Ok(UserWordRow {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        word_id: row.try_get("word_id")?,
        learn_count: row.try_get("learn_count")?,
        fluency: row.try_get("fluency")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn find_word_by_text(
    proxy: &DatabaseProxy,
    word: &str,
) -> Result<Option<WordRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "words" WHERE "word" = $1 LIMIT 1"#)
        .bind(word)
        .fetch_optional(proxy.pool())
        .await?;

    row.as_ref().map(decode_word).transpose()
}

pub async fn find_word_by_id(
    proxy: &DatabaseProxy,
    word_id: &str,
) -> Result<Option<WordRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "words" WHERE "id" = $1 LIMIT 1"#)
        .bind(word_id)
        .fetch_optional(proxy.pool())
        .await?;

    row.as_ref().map(decode_word).transpose()
}

pub async fn insert_word(proxy: &DatabaseProxy, word: &WordRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "words" (
            "id", "word", "definition_en", "definition_zh", "difficulty",
            "part_of_speech", "root_word", "created_at", "updated_at"
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&word.id)
    .bind(&word.word)
    .bind(&word.definition_en)
    .bind(&word.definition_zh)
    .bind(word.difficulty)
    .bind(&word.part_of_speech)
    .bind(&word.root_word)
    .bind(word.created_at)
    .bind(word.updated_at)
    .execute(proxy.pool())
    .await?;

    Ok(())
}

pub async fn update_word_difficulty(
    proxy: &DatabaseProxy,
    word_id: &str,
    difficulty: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE "words" SET "difficulty" = $1, "updated_at" = $2 WHERE "id" = $3"#)
        .bind(difficulty)
        .bind(Utc::now().naive_utc())
        .bind(word_id)
        .execute(proxy.pool())
        .await?;

    Ok(())
}

pub async fn find_user_word(
    proxy: &DatabaseProxy,
    user_id: &str,
    word_id: &str,
) -> Result<Option<UserWordRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT * FROM "user_words" WHERE "user_id" = $1 AND "word_id" = $2 LIMIT 1"#,
    )
    .bind(user_id)
    .bind(word_id)
    .fetch_optional(proxy.pool())
    .await?;

    row.as_ref().map(decode_user_word).transpose()
}

pub async fn insert_user_word(
    proxy: &DatabaseProxy,
    user_word: &UserWordRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user_words" (
            "id", "user_id", "word_id", "learn_count", "fluency", "created_at", "updated_at"
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&user_word.id)
    .bind(&user_word.user_id)
    .bind(&user_word.word_id)
    .bind(user_word.learn_count)
    .bind(user_word.fluency)
    .bind(user_word.created_at)
    .bind(user_word.updated_at)
    .execute(proxy.pool())
    .await?;

    Ok(())
}

pub async fn delete_user_word(
    proxy: &DatabaseProxy,
    user_id: &str,
    word_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "user_words" WHERE "user_id" = $1 AND "word_id" = $2"#)
        .bind(user_id)
        .bind(word_id)
        .execute(proxy.pool())
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Applies one practice attempt in a single statement so the delta is always
/// relative to the stored value, never to a stale read.
pub async fn record_attempt(
    proxy: &DatabaseProxy,
    user_id: &str,
    word_id: &str,
    fluency_delta: i32,
) -> Result<Option<(i32, i32)>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE "user_words"
        SET
          "learn_count" = "learn_count" + 1,
          "fluency" = LEAST(100, GREATEST(0, "fluency" + $1)),
          "updated_at" = $2
        WHERE "user_id" = $3 AND "word_id" = $4
        RETURNING "learn_count", "fluency"
        "#,
    )
    .bind(fluency_delta)
    .bind(Utc::now().naive_utc())
    .bind(user_id)
    .bind(word_id)
    .fetch_optional(proxy.pool())
    .await?;

    match row {
        Some(row) => Ok(Some((row.try_get("learn_count")?, row.try_get("fluency")?))),
        None => Ok(None),
    }
}

pub async fn tracked_words(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<TrackedWordRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT w."word", uw."learn_count", uw."fluency", uw."updated_at"
        FROM "user_words" uw
        JOIN "words" w ON w."id" = uw."word_id"
        WHERE uw."user_id" = $1
        ORDER BY uw."created_at", uw."id"
        "#,
    )
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(|row| {
            Ok(TrackedWordRow {
                word: row.try_get("word")?,
                learn_count: row.try_get("learn_count")?,
                fluency: row.try_get("fluency")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .collect()
}

pub async fn user_words_with_words(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<(UserWordRow, WordRow)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT
          uw."id" AS "uw_id", uw."user_id", uw."word_id", uw."learn_count", uw."fluency",
          uw."created_at" AS "uw_created_at", uw."updated_at" AS "uw_updated_at",
          w."id", w."word", w."definition_en", w."definition_zh", w."difficulty",
          w."part_of_speech", w."root_word", w."created_at", w."updated_at"
        FROM "user_words" uw
        JOIN "words" w ON w."id" = uw."word_id"
        WHERE uw."user_id" = $1
        ORDER BY uw."created_at", uw."id"
        "#,
    )
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(|row| {
            let user_word = UserWordRow {
                id: row.try_get("uw_id")?,
                user_id: row.try_get("user_id")?,
                word_id: row.try_get("word_id")?,
                learn_count: row.try_get("learn_count")?,
                fluency: row.try_get("fluency")?,
                created_at: row.try_get("uw_created_at")?,
                updated_at: row.try_get("uw_updated_at")?,
            };
            Ok((user_word, decode_word(row)?))
        })
        .collect()
}

pub async fn examples_for_word(
    proxy: &DatabaseProxy,
    word_id: &str,
) -> Result<Vec<WordExampleRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "word_examples" WHERE "word_id" = $1 ORDER BY "id""#,
    )
    .bind(word_id)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(|row| {
            Ok(WordExampleRow {
                id: row.try_get("id")?,
                word_id: row.try_get("word_id")?,
                sentence: row.try_get("sentence")?,
            })
        })
        .collect()
}

pub async fn insert_example(
    proxy: &DatabaseProxy,
    example: &WordExampleRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"INSERT INTO "word_examples" ("id", "word_id", "sentence") VALUES ($1, $2, $3)"#)
        .bind(&example.id)
        .bind(&example.word_id)
        .bind(&example.sentence)
        .execute(proxy.pool())
        .await?;

    Ok(())
}

pub async fn delete_example(
    proxy: &DatabaseProxy,
    word_id: &str,
    example_id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query(r#"DELETE FROM "word_examples" WHERE "id" = $1 AND "word_id" = $2"#)
            .bind(example_id)
            .bind(word_id)
            .execute(proxy.pool())
            .await?;

    Ok(result.rows_affected() > 0)
}

/// Records that a word has been offered to a user. Safe to call repeatedly;
/// the unique constraint makes repeat offers a no-op.
pub async fn record_recommendation_offer(
    proxy: &DatabaseProxy,
    id: &str,
    user_id: &str,
    word_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "recommend_words" ("id", "user_id", "word_id", "created_at")
        VALUES ($1, $2, $3, $4)
        ON CONFLICT ("user_id", "word_id") DO NOTHING
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(word_id)
    .bind(Utc::now().naive_utc())
    .execute(proxy.pool())
    .await?;

    Ok(())
}
