pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_user;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use rest::{
    check_answer_handler, clear_progress_handler, document_progress_handler,
    generate_flashcards_handler, generate_questions_handler, job_status_handler,
    list_documents_handler, list_questions_handler, overall_progress_handler,
    question_at_index_handler, question_history_handler, record_attempt_handler,
    upload_document_handler,
};

/// Builds the API routes. Every route requires the `x-user-id` header.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    let max_upload_bytes = app_state.config.max_upload_bytes;

    Router::new()
        .route("/documents", post(upload_document_handler).get(list_documents_handler))
        .route(
            "/documents/{id}/questions",
            post(generate_questions_handler).get(list_questions_handler),
        )
        .route("/documents/{id}/questions/{index}", get(question_at_index_handler))
        .route("/documents/{id}/flashcards", post(generate_flashcards_handler))
        .route("/questions/{id}/answer", post(check_answer_handler))
        .route("/jobs/{id}", get(job_status_handler))
        .route("/progress/record", post(record_attempt_handler))
        .route(
            "/progress/document/{id}",
            get(document_progress_handler).delete(clear_progress_handler),
        )
        .route("/progress/stats", get(overall_progress_handler))
        .route("/progress/question/{id}", get(question_history_handler))
        .layer(axum_middleware::from_fn(require_user))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
