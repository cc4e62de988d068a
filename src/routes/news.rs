use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::db::operations::news::{self, NewsRow};
use crate::db::operations::vocabulary::{self, TrackedWordRow};
use crate::db::DatabaseProxy;
use crate::response::json_error;
use crate::services::newsgen::{
    self, GenerationPlan, GenerationPreferences, LlmArticleGenerator, BATCH_SIZE, COOLDOWN_HOURS,
};
use crate::services::selection::{self, TrackedWord, WordSelection};
use crate::services::srs::WordStrength;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_news))
        .route("/generate", post(generate_news))
        .route("/force-generate", post(force_generate_news))
        .route("/:id", get(get_single_news))
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewsData {
    id: String,
    title: String,
    content: String,
    level: i32,
    keywords: Vec<String>,
    word_in_news: Vec<String>,
    source: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_key: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<&NewsRow> for NewsData {
    fn from(row: &NewsRow) -> Self {
        Self {
            id: row.id.clone(),
            title: row.title.clone(),
            content: row.content.clone(),
            level: row.level,
            keywords: row.keywords.clone(),
            word_in_news: row.vocabulary_used.clone(),
            source: row.source.clone(),
            audio_url: row.audio_url.clone(),
            audio_key: row.audio_key.clone(),
            created_at: crate::auth::format_naive_datetime_iso_millis(row.created_at),
            updated_at: crate::auth::format_naive_datetime_iso_millis(row.updated_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AllNewsData {
    all_news: Vec<NewsData>,
}

async fn list_news(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match news::list_news(proxy.as_ref(), &user.id).await {
        Ok(items) => Json(SuccessResponse {
            success: true,
            data: AllNewsData {
                all_news: items.iter().map(NewsData::from).collect(),
            },
        })
        .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "news list query failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response()
        }
    }
}

async fn get_single_news(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(news_id): Path<String>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match news::find_news(proxy.as_ref(), &user.id, &news_id).await {
        Ok(Some(item)) => Json(SuccessResponse {
            success: true,
            data: NewsData::from(&item),
        })
        .into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "新闻不存在").into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "news lookup failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response()
        }
    }
}

async fn generate_news(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let existing = match news::list_news(proxy.as_ref(), &user.id).await {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(error = %err, "news list query failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    let since = news::cutoff(news::now_naive(), COOLDOWN_HOURS);
    let has_recent = match news::has_recent_news(proxy.as_ref(), &user.id, since).await {
        Ok(has_recent) => has_recent,
        Err(err) => {
            tracing::warn!(error = %err, "recent news check failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    let quota = match newsgen::plan_generation(existing.len(), has_recent) {
        GenerationPlan::CooldownActive => {
            // Idempotent no-op: the backlog is full and fresh.
            return Json(SuccessResponse {
                success: true,
                data: AllNewsData {
                    all_news: existing.iter().map(NewsData::from).collect(),
                },
            })
            .into_response();
        }
        GenerationPlan::Generate { quota } => quota,
    };

    run_and_respond(&state, proxy.as_ref(), &user.id, &existing, quota).await
}

async fn force_generate_news(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    // Existing items only provide title-uniqueness context here; no cooldown
    // or quota checks apply.
    let existing = match news::list_news(proxy.as_ref(), &user.id).await {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(error = %err, "news list query failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    run_and_respond(&state, proxy.as_ref(), &user.id, &existing, BATCH_SIZE).await
}

async fn run_and_respond(
    state: &AppState,
    proxy: &DatabaseProxy,
    user_id: &str,
    existing: &[NewsRow],
    quota: usize,
) -> Response {
    let preferences = match crate::db::operations::preferences::find_preferences(proxy, user_id).await
    {
        Ok(row) => row.map(|row| GenerationPreferences {
            level: row.level,
            interests: row.interests,
        }),
        Err(err) => {
            // Generation continues without preferences, like a fresh account.
            tracing::warn!(error = %err, "preferences lookup failed");
            None
        }
    };

    let selection = match vocabulary::tracked_words(proxy, user_id).await {
        Ok(rows) => select_words(&rows),
        Err(err) => {
            tracing::warn!(error = %err, "tracked words query failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    let generator = LlmArticleGenerator::new(state.llm());
    if !generator.is_available() {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "内容生成服务未配置")
            .into_response();
    }

    let audio = state.audio();
    let ids = state.id_generator();

    let result = newsgen::run_generation(
        &generator,
        audio.as_ref(),
        proxy,
        ids.as_ref(),
        user_id,
        preferences.as_ref(),
        &selection,
        existing,
        quota,
    )
    .await;

    if let Err(err) = result {
        tracing::warn!(error = %err, "news generation failed");
        return json_error(StatusCode::BAD_GATEWAY, "GENERATION_FAILED", "新闻生成失败，请稍后再试")
            .into_response();
    }

    match news::list_news(proxy, user_id).await {
        Ok(items) => (
            StatusCode::CREATED,
            Json(SuccessResponse {
                success: true,
                data: AllNewsData {
                    all_news: items.iter().map(NewsData::from).collect(),
                },
            }),
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "news list query failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response()
        }
    }
}

fn select_words(rows: &[TrackedWordRow]) -> WordSelection {
    let tracked: Vec<TrackedWord> = rows
        .iter()
        .map(|row| TrackedWord {
            word: row.word.clone(),
            strength: WordStrength {
                learn_count: row.learn_count,
                fluency: row.fluency,
                last_updated_at: DateTime::<Utc>::from_naive_utc_and_offset(row.updated_at, Utc),
            },
        })
        .collect();

    selection::select(&tracked, Utc::now())
}
