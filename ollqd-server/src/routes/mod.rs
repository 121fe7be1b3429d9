use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{
    handle_chat_websocket::chat_websocket_handler,
    index::{
        index_codebase_handler, index_documents_handler, index_images_handler,
        index_smb_handler, index_uploads_handler,
    },
    ollama::pull_model_handler,
    system::health_handler,
    tasks::{
        cancel_task_handler, clear_finished_handler, get_task_handler, list_tasks_handler,
        retry_task_handler,
    },
};
use crate::infra::app_state::AppState;

/// Create the API router with every public route
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/rag", create_rag_router())
        .route("/api/smb/index", post(index_smb_handler))
        .route("/api/ollama/models/pull", post(pull_model_handler))
        .route("/api/system/health", get(health_handler))
}

fn create_rag_router() -> Router<AppState> {
    Router::new()
        .route("/index/codebase", post(index_codebase_handler))
        .route("/index/documents", post(index_documents_handler))
        .route("/index/images", post(index_images_handler))
        .route("/index/uploads", post(index_uploads_handler))
        .route(
            "/tasks",
            get(list_tasks_handler).delete(clear_finished_handler),
        )
        .route("/tasks/{id}", get(get_task_handler))
        .route("/tasks/{id}/cancel", post(cancel_task_handler))
        .route("/tasks/{id}/retry", post(retry_task_handler))
        .route("/ws", get(chat_websocket_handler))
}
