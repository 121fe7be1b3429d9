use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::infra::app_state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub active: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub tasks: TaskCounts,
    pub chat_connections: usize,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.tasks.registry();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tasks: TaskCounts {
            total: registry.len(),
            active: registry.active_count(),
        },
        chat_connections: state.chat_connections.len(),
    })
}
