use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use ollqd_core::{
    IndexJob, TaskId,
    jobs::{
        IndexCodebaseParams, IndexDocumentsParams, IndexImagesParams, IndexSmbParams,
        IndexUploadsParams,
    },
};

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAcceptedResponse {
    pub task_id: TaskId,
    pub status: String,
}

type Accepted = AppResult<(StatusCode, Json<TaskAcceptedResponse>)>;

fn submit(state: &AppState, job: IndexJob) -> Accepted {
    let task_id = state.tasks.submit(job)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAcceptedResponse {
            task_id,
            status: "started".to_string(),
        }),
    ))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

pub async fn index_codebase_handler(
    State(state): State<AppState>,
    payload: Result<Json<IndexCodebaseParams>, JsonRejection>,
) -> Accepted {
    submit(&state, IndexJob::Codebase(body(payload)?))
}

pub async fn index_documents_handler(
    State(state): State<AppState>,
    payload: Result<Json<IndexDocumentsParams>, JsonRejection>,
) -> Accepted {
    submit(&state, IndexJob::Documents(body(payload)?))
}

pub async fn index_images_handler(
    State(state): State<AppState>,
    payload: Result<Json<IndexImagesParams>, JsonRejection>,
) -> Accepted {
    submit(&state, IndexJob::Images(body(payload)?))
}

/// Index files the upload endpoint already stored.
pub async fn index_uploads_handler(
    State(state): State<AppState>,
    payload: Result<Json<IndexUploadsParams>, JsonRejection>,
) -> Accepted {
    submit(&state, IndexJob::Uploads(body(payload)?))
}

pub async fn index_smb_handler(
    State(state): State<AppState>,
    payload: Result<Json<IndexSmbParams>, JsonRejection>,
) -> Accepted {
    submit(&state, IndexJob::Smb(body(payload)?))
}
