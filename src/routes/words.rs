use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::vocabulary::{self, UserWordRow, WordExampleRow, WordRow};
use crate::response::json_error;
use crate::services::recommendation::{self, LlmWordRecommender};
use crate::services::srs;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_words).post(create_word))
        .route("/recommend", get(recommend_words))
        .route(
            "/:id",
            get(get_word).put(update_word).delete(delete_word),
        )
        .route("/:id/learn", post(learn_word))
        .route("/:id/examples", post(add_example))
        .route("/:id/examples/:example_id", delete(delete_example))
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
struct WordData {
    id: String,
    word: String,
    definition_en: String,
    definition_zh: String,
    difficulty: i32,
    part_of_speech: String,
    root_word: String,
    created_at: String,
    updated_at: String,
}

impl From<&WordRow> for WordData {
    fn from(row: &WordRow) -> Self {
        Self {
            id: row.id.clone(),
            word: row.word.clone(),
            definition_en: row.definition_en.clone(),
            definition_zh: row.definition_zh.clone(),
            difficulty: row.difficulty,
            part_of_speech: row.part_of_speech.clone(),
            root_word: row.root_word.clone(),
            created_at: crate::auth::format_naive_datetime_iso_millis(row.created_at),
            updated_at: crate::auth::format_naive_datetime_iso_millis(row.updated_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExampleData {
    id: String,
    sentence: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WordWithUserData {
    #[serde(flatten)]
    word: WordData,
    learn_count: i32,
    fluency: i32,
    examples: Vec<ExampleData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LearnProgressData {
    learn_count: i32,
    fluency: i32,
}

#[derive(Debug, Deserialize)]
struct CreateWordRequest {
    word: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateWordRequest {
    difficulty: Option<i32>,
    examples: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct LearnWordRequest {
    correct: bool,
}

#[derive(Debug, Deserialize)]
struct AddExampleRequest {
    sentence: String,
}

fn examples_data(examples: &[WordExampleRow]) -> Vec<ExampleData> {
    examples
        .iter()
        .map(|example| ExampleData {
            id: example.id.clone(),
            sentence: example.sentence.clone(),
        })
        .collect()
}

async fn list_words(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let pairs = match vocabulary::user_words_with_words(proxy.as_ref(), &user.id).await {
        Ok(pairs) => pairs,
        Err(err) => {
            tracing::warn!(error = %err, "user words query failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    let mut words = Vec::with_capacity(pairs.len());
    for (user_word, word) in &pairs {
        let examples = vocabulary::examples_for_word(proxy.as_ref(), &word.id)
            .await
            .unwrap_or_default();
        words.push(WordWithUserData {
            word: WordData::from(word),
            learn_count: user_word.learn_count,
            fluency: user_word.fluency,
            examples: examples_data(&examples),
        });
    }

    Json(SuccessResponse {
        success: true,
        data: words,
    })
    .into_response()
}

async fn create_word(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateWordRequest>,
) -> Response {
    let word = payload.word.trim().to_lowercase();
    if word.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "单词不能为空")
            .into_response();
    }

    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let existing = match vocabulary::find_word_by_text(proxy.as_ref(), &word).await {
        Ok(existing) => existing,
        Err(err) => {
            tracing::warn!(error = %err, "word lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    if let Some(existing) = existing {
        match vocabulary::find_user_word(proxy.as_ref(), &user.id, &existing.id).await {
            Ok(Some(_)) => {
                return json_error(StatusCode::CONFLICT, "CONFLICT", "该单词已在你的词汇表中")
                    .into_response();
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "user word lookup failed");
                return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                    .into_response();
            }
        }

        if let Err(err) = track_word(&state, proxy.as_ref(), &user.id, &existing.id).await {
            tracing::warn!(error = %err, "user word insert failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }

        let examples = vocabulary::examples_for_word(proxy.as_ref(), &existing.id)
            .await
            .unwrap_or_default();

        return (
            StatusCode::CREATED,
            Json(SuccessResponse {
                success: true,
                data: WordWithUserData {
                    word: WordData::from(&existing),
                    learn_count: 0,
                    fluency: 0,
                    examples: examples_data(&examples),
                },
            }),
        )
            .into_response();
    }

    // New word: the enrichment collaborator validates it before anything is
    // persisted. Unlike the recommendation flow, failure here is user-visible.
    let translation = match state.translator().translate(&word).await {
        Ok(translation) => translation,
        Err(err) => {
            tracing::warn!(%word, error = %err, "word enrichment failed");
            return json_error(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", "单词校验服务暂不可用")
                .into_response();
        }
    };

    if !translation.is_valid {
        let reason = if translation.reason.is_empty() {
            "无效的单词".to_string()
        } else {
            format!("无效的单词: {}", translation.reason)
        };
        return json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", reason).into_response();
    }

    if !translation.has_definitions() {
        return json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "无法生成该单词的释义")
            .into_response();
    }

    let now = Utc::now().naive_utc();
    let new_word = WordRow {
        id: state.id_generator().next_id(),
        word: word.clone(),
        definition_en: translation.definition_en.clone(),
        definition_zh: translation.definition_zh.clone(),
        difficulty: translation.clamped_difficulty(),
        part_of_speech: translation.part_of_speech.clone(),
        root_word: translation.root_word.clone(),
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = vocabulary::insert_word(proxy.as_ref(), &new_word).await {
        tracing::warn!(error = %err, "word insert failed");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response();
    }

    if let Err(err) = track_word(&state, proxy.as_ref(), &user.id, &new_word.id).await {
        tracing::warn!(error = %err, "user word insert failed");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response();
    }

    let mut examples = Vec::new();
    for sentence in &translation.examples {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let example = WordExampleRow {
            id: state.id_generator().next_id(),
            word_id: new_word.id.clone(),
            sentence: sentence.to_string(),
        };
        if let Err(err) = vocabulary::insert_example(proxy.as_ref(), &example).await {
            // Examples are not critical for word creation.
            tracing::warn!(error = %err, "example insert failed");
            continue;
        }
        examples.push(example);
    }

    (
        StatusCode::CREATED,
        Json(SuccessResponse {
            success: true,
            data: WordWithUserData {
                word: WordData::from(&new_word),
                learn_count: 0,
                fluency: 0,
                examples: examples_data(&examples),
            },
        }),
    )
        .into_response()
}

async fn get_word(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(word_id): Path<String>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let user_word = match vocabulary::find_user_word(proxy.as_ref(), &user.id, &word_id).await {
        Ok(Some(user_word)) => user_word,
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "该单词不在你的词汇表中")
                .into_response();
        }
        Err(err) => {
            tracing::warn!(error = %err, "user word lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    let word = match vocabulary::find_word_by_id(proxy.as_ref(), &word_id).await {
        Ok(Some(word)) => word,
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "单词不存在").into_response();
        }
        Err(err) => {
            tracing::warn!(error = %err, "word lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    let examples = vocabulary::examples_for_word(proxy.as_ref(), &word_id)
        .await
        .unwrap_or_default();

    Json(SuccessResponse {
        success: true,
        data: WordWithUserData {
            word: WordData::from(&word),
            learn_count: user_word.learn_count,
            fluency: user_word.fluency,
            examples: examples_data(&examples),
        },
    })
    .into_response()
}

async fn update_word(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(word_id): Path<String>,
    Json(payload): Json<UpdateWordRequest>,
) -> Response {
    if let Some(difficulty) = payload.difficulty {
        if !(1..=10).contains(&difficulty) {
            return json_error(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "难度必须在 1 到 10 之间",
            )
            .into_response();
        }
    }

    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match vocabulary::find_user_word(proxy.as_ref(), &user.id, &word_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "该单词不在你的词汇表中")
                .into_response();
        }
        Err(err) => {
            tracing::warn!(error = %err, "user word lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    }

    if let Some(difficulty) = payload.difficulty {
        if let Err(err) =
            vocabulary::update_word_difficulty(proxy.as_ref(), &word_id, difficulty).await
        {
            tracing::warn!(error = %err, "word difficulty update failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    }

    if let Some(sentences) = payload.examples {
        let existing = vocabulary::examples_for_word(proxy.as_ref(), &word_id)
            .await
            .unwrap_or_default();
        for example in existing {
            let _ = vocabulary::delete_example(proxy.as_ref(), &word_id, &example.id).await;
        }
        for sentence in sentences {
            let sentence = sentence.trim().to_string();
            if sentence.is_empty() {
                continue;
            }
            let example = WordExampleRow {
                id: state.id_generator().next_id(),
                word_id: word_id.clone(),
                sentence,
            };
            if let Err(err) = vocabulary::insert_example(proxy.as_ref(), &example).await {
                tracing::warn!(error = %err, "example insert failed");
            }
        }
    }

    Json(MessageResponse {
        success: true,
        message: "单词已更新",
    })
    .into_response()
}

async fn delete_word(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(word_id): Path<String>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match vocabulary::delete_user_word(proxy.as_ref(), &user.id, &word_id).await {
        Ok(true) => Json(MessageResponse {
            success: true,
            message: "单词已从词汇表移除",
        })
        .into_response(),
        Ok(false) => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "该单词不在你的词汇表中")
            .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "user word delete failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response()
        }
    }
}

async fn learn_word(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(word_id): Path<String>,
    Json(payload): Json<LearnWordRequest>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let delta = srs::attempt_delta(payload.correct);
    match vocabulary::record_attempt(proxy.as_ref(), &user.id, &word_id, delta).await {
        Ok(Some((learn_count, fluency))) => Json(SuccessResponse {
            success: true,
            data: LearnProgressData {
                learn_count,
                fluency,
            },
        })
        .into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "该单词不在你的词汇表中")
            .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "record attempt failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response()
        }
    }
}

async fn add_example(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(word_id): Path<String>,
    Json(payload): Json<AddExampleRequest>,
) -> Response {
    let sentence = payload.sentence.trim().to_string();
    if sentence.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "例句不能为空")
            .into_response();
    }

    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match vocabulary::find_user_word(proxy.as_ref(), &user.id, &word_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "该单词不在你的词汇表中")
                .into_response();
        }
        Err(err) => {
            tracing::warn!(error = %err, "user word lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    }

    let example = WordExampleRow {
        id: state.id_generator().next_id(),
        word_id: word_id.clone(),
        sentence,
    };

    if let Err(err) = vocabulary::insert_example(proxy.as_ref(), &example).await {
        tracing::warn!(error = %err, "example insert failed");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response();
    }

    (
        StatusCode::CREATED,
        Json(SuccessResponse {
            success: true,
            data: ExampleData {
                id: example.id,
                sentence: example.sentence,
            },
        }),
    )
        .into_response()
}

async fn delete_example(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((word_id, example_id)): Path<(String, String)>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match vocabulary::find_user_word(proxy.as_ref(), &user.id, &word_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "该单词不在你的词汇表中")
                .into_response();
        }
        Err(err) => {
            tracing::warn!(error = %err, "user word lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    }

    match vocabulary::delete_example(proxy.as_ref(), &word_id, &example_id).await {
        Ok(true) => Json(MessageResponse {
            success: true,
            message: "例句已删除",
        })
        .into_response(),
        Ok(false) => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "例句不存在").into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "example delete failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response()
        }
    }
}

async fn recommend_words(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let pairs = match vocabulary::user_words_with_words(proxy.as_ref(), &user.id).await {
        Ok(pairs) => pairs,
        Err(err) => {
            tracing::warn!(error = %err, "user words query failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };
    let user_words: Vec<String> = pairs.iter().map(|(_, word)| word.word.clone()).collect();

    let interests = crate::db::operations::preferences::find_preferences(proxy.as_ref(), &user.id)
        .await
        .ok()
        .flatten()
        .map(|row| row.interests)
        .unwrap_or_default();

    let recommender = LlmWordRecommender::new(state.llm());
    let candidates = match recommender.recommend(&user_words, &interests).await {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::warn!(error = %err, "word recommendation failed");
            return json_error(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", "推荐服务暂不可用")
                .into_response();
        }
    };

    let translator = state.translator();
    let ids = state.id_generator();
    let recommended = recommendation::process_batch(
        proxy.as_ref(),
        translator.as_ref(),
        ids.as_ref(),
        &user.id,
        &candidates,
    )
    .await;

    let words: Vec<WordWithUserData> = recommended
        .iter()
        .map(|item| WordWithUserData {
            word: WordData::from(&item.word),
            learn_count: item.learn_count,
            fluency: item.fluency,
            examples: examples_data(&item.examples),
        })
        .collect();

    Json(SuccessResponse {
        success: true,
        data: words,
    })
    .into_response()
}

async fn track_word(
    state: &AppState,
    proxy: &crate::db::DatabaseProxy,
    user_id: &str,
    word_id: &str,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().naive_utc();
    let user_word = UserWordRow {
        id: state.id_generator().next_id(),
        user_id: user_id.to_string(),
        word_id: word_id.to_string(),
        learn_count: 0,
        fluency: 0,
        created_at: now,
        updated_at: now,
    };
    vocabulary::insert_user_word(proxy, &user_word).await
}
