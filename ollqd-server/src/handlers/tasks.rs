use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use ollqd_core::{RetryAccepted, TaskId, TaskRecord};

use crate::handlers::parse_task_id;
use crate::infra::{app_state::AppState, errors::AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskRecord>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearedResponse {
    pub cleared: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledResponse {
    pub task_id: TaskId,
    pub status: String,
}

pub async fn list_tasks_handler(State(state): State<AppState>) -> Json<TaskListResponse> {
    let tasks = state.tasks.list();
    Json(TaskListResponse {
        count: tasks.len(),
        tasks,
    })
}

pub async fn clear_finished_handler(State(state): State<AppState>) -> Json<ClearedResponse> {
    Json(ClearedResponse {
        cleared: state.tasks.clear_finished(),
    })
}

pub async fn get_task_handler(
    State(state): State<AppState>,
    path: Path<String>,
) -> AppResult<Json<TaskRecord>> {
    let id = parse_task_id(path)?;
    Ok(Json(state.tasks.get(&id)?))
}

pub async fn cancel_task_handler(
    State(state): State<AppState>,
    path: Path<String>,
) -> AppResult<Json<CancelledResponse>> {
    let id = parse_task_id(path)?;
    state.tasks.cancel(&id)?;
    Ok(Json(CancelledResponse {
        task_id: id,
        status: "cancelled".to_string(),
    }))
}

pub async fn retry_task_handler(
    State(state): State<AppState>,
    path: Path<String>,
) -> AppResult<(StatusCode, Json<RetryAccepted>)> {
    let id = parse_task_id(path)?;
    let accepted = state.tasks.retry(&id)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}
