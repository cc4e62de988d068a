use axum::Router;

pub async fn create_test_app() -> Router {
    std::env::set_var("DATABASE_URL", "");
    std::env::set_var("LLM_API_KEY", "");
    std::env::set_var("TTS_SERVICE_URL", "");

    lexnews_backend::create_app().await
}
