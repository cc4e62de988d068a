mod auth;
mod health;
mod news;
mod preferences;
mod words;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/user/me", get(auth::me))
        .nest("/api/user/preferences", preferences::routes())
        .nest("/api/vocabulary", words::routes())
        .nest("/api/news", news::routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::require_auth,
        ));

    Router::new()
        .route("/", get(root))
        .nest("/health", health::router())
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .merge(protected)
        .fallback(fallback_handler)
        .with_state(state)
}

async fn root() -> Response {
    axum::Json(serde_json::json!({ "message": "lexnews backend" })).into_response()
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "接口不存在").into_response()
}
