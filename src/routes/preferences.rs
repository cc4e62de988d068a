use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::preferences::{self, PreferencesRow};
use crate::response::json_error;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(get_preferences)
                .post(create_preferences)
                .put(update_preferences)
                .delete(delete_preferences),
        )
        .route("/interests", post(add_interest))
        .route("/interests/:interest", delete(remove_interest))
}

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PreferencesResponse {
    id: String,
    user_id: String,
    level: i32,
    interests: Vec<String>,
    created_at: String,
    updated_at: String,
}

impl From<&PreferencesRow> for PreferencesResponse {
    fn from(row: &PreferencesRow) -> Self {
        Self {
            id: row.id.clone(),
            user_id: row.user_id.clone(),
            level: row.level,
            interests: row.interests.clone(),
            created_at: crate::auth::format_naive_datetime_iso_millis(row.created_at),
            updated_at: crate::auth::format_naive_datetime_iso_millis(row.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatePreferencesRequest {
    level: i32,
    #[serde(default)]
    interests: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatePreferencesRequest {
    level: Option<i32>,
    interests: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AddInterestRequest {
    interest: String,
}

async fn get_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match preferences::find_preferences(proxy.as_ref(), &user.id).await {
        Ok(Some(row)) => Json(SuccessResponse {
            success: true,
            data: PreferencesResponse::from(&row),
        })
        .into_response(),
        Ok(None) => {
            json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "尚未设置学习偏好").into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "preferences lookup failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response()
        }
    }
}

async fn create_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreatePreferencesRequest>,
) -> Response {
    if !(1..=10).contains(&payload.level) {
        return json_error(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "级别必须在 1 到 10 之间",
        )
        .into_response();
    }

    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match preferences::find_preferences(proxy.as_ref(), &user.id).await {
        Ok(Some(_)) => {
            return json_error(StatusCode::CONFLICT, "CONFLICT", "学习偏好已存在，请使用更新接口")
                .into_response();
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(error = %err, "preferences existence check failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    }

    let now = Utc::now().naive_utc();
    let row = PreferencesRow {
        id: state.id_generator().next_id(),
        user_id: user.id.clone(),
        level: payload.level,
        interests: clean_interests(&payload.interests),
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = preferences::insert_preferences(proxy.as_ref(), &row).await {
        tracing::warn!(error = %err, "preferences insert failed");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response();
    }

    (
        StatusCode::CREATED,
        Json(SuccessResponse {
            success: true,
            data: PreferencesResponse::from(&row),
        }),
    )
        .into_response()
}

async fn update_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> Response {
    if let Some(level) = payload.level {
        if !(1..=10).contains(&level) {
            return json_error(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "级别必须在 1 到 10 之间",
            )
            .into_response();
        }
    }

    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let cleaned = payload.interests.as_deref().map(clean_interests);
    let updated = match preferences::update_preferences(
        proxy.as_ref(),
        &user.id,
        payload.level,
        cleaned.as_deref(),
    )
    .await
    {
        Ok(updated) => updated,
        Err(err) => {
            tracing::warn!(error = %err, "preferences update failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    if !updated {
        return json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "尚未设置学习偏好，请先创建")
            .into_response();
    }

    match preferences::find_preferences(proxy.as_ref(), &user.id).await {
        Ok(Some(row)) => Json(SuccessResponse {
            success: true,
            data: PreferencesResponse::from(&row),
        })
        .into_response(),
        _ => json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response(),
    }
}

async fn delete_preferences(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match preferences::delete_preferences(proxy.as_ref(), &user.id).await {
        Ok(true) => Json(MessageResponse {
            success: true,
            message: "学习偏好已删除",
        })
        .into_response(),
        Ok(false) => {
            json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "尚未设置学习偏好").into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "preferences delete failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response()
        }
    }
}

async fn add_interest(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<AddInterestRequest>,
) -> Response {
    let interest = payload.interest.trim().to_string();
    if interest.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "兴趣不能为空")
            .into_response();
    }

    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let row = match preferences::find_preferences(proxy.as_ref(), &user.id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "尚未设置学习偏好，请先创建")
                .into_response();
        }
        Err(err) => {
            tracing::warn!(error = %err, "preferences lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    if row
        .interests
        .iter()
        .any(|existing| existing.eq_ignore_ascii_case(&interest))
    {
        return json_error(StatusCode::CONFLICT, "CONFLICT", "该兴趣已存在").into_response();
    }

    let mut interests = row.interests.clone();
    interests.push(interest);

    if let Err(err) =
        preferences::update_preferences(proxy.as_ref(), &user.id, None, Some(interests.as_slice()))
            .await
    {
        tracing::warn!(error = %err, "interest add failed");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response();
    }

    match preferences::find_preferences(proxy.as_ref(), &user.id).await {
        Ok(Some(row)) => Json(SuccessResponse {
            success: true,
            data: PreferencesResponse::from(&row),
        })
        .into_response(),
        _ => json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response(),
    }
}

async fn remove_interest(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(interest): Path<String>,
) -> Response {
    let interest = interest.trim().to_string();
    if interest.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "兴趣不能为空")
            .into_response();
    }

    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let row = match preferences::find_preferences(proxy.as_ref(), &user.id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "尚未设置学习偏好")
                .into_response();
        }
        Err(err) => {
            tracing::warn!(error = %err, "preferences lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    let remaining: Vec<String> = row
        .interests
        .iter()
        .filter(|existing| !existing.eq_ignore_ascii_case(&interest))
        .cloned()
        .collect();

    if remaining.len() == row.interests.len() {
        return json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "未找到该兴趣").into_response();
    }

    if let Err(err) =
        preferences::update_preferences(proxy.as_ref(), &user.id, None, Some(remaining.as_slice()))
            .await
    {
        tracing::warn!(error = %err, "interest remove failed");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response();
    }

    match preferences::find_preferences(proxy.as_ref(), &user.id).await {
        Ok(Some(row)) => Json(SuccessResponse {
            success: true,
            data: PreferencesResponse::from(&row),
        })
        .into_response(),
        _ => json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response(),
    }
}

/// Trims entries, drops empties, and removes case-insensitive duplicates
/// while keeping first-seen order.
fn clean_interests(raw: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for interest in raw {
        let trimmed = interest.trim();
        if trimmed.is_empty() {
            continue;
        }
        if cleaned
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(trimmed))
        {
            continue;
        }
        cleaned.push(trimmed.to_string());
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interests_are_trimmed_and_deduplicated() {
        let raw = vec![
            " Technology ".to_string(),
            "technology".to_string(),
            String::new(),
            "Sports".to_string(),
            "  ".to_string(),
            "TECHNOLOGY".to_string(),
        ];
        assert_eq!(clean_interests(&raw), vec!["Technology", "Sports"]);
    }
}
