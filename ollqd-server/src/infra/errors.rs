use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use ollqd_core::error::{BackendError, TaskError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Validation(_) => Self::bad_request(err.to_string()),
            TaskError::NotFound(_) => Self::not_found(err.to_string()),
            TaskError::Conflict { .. } => Self::conflict(err.to_string()),
        }
    }
}

// Backend errors only reach the HTTP edge from unary proxy calls.
impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        tracing::warn!(error = %err, "upstream call failed");
        Self::bad_gateway(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollqd_core::tasks::{TaskId, TaskStatus};

    #[test]
    fn task_errors_map_to_http_statuses() {
        let id = TaskId::new();
        assert_eq!(
            AppError::from(TaskError::validation("root_path is required")).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(TaskError::NotFound(id)).status,
            StatusCode::NOT_FOUND
        );
        let conflict = AppError::from(TaskError::Conflict {
            id,
            status: TaskStatus::Completed,
            action: "cancel",
        });
        assert_eq!(conflict.status, StatusCode::CONFLICT);
        assert!(conflict.message.contains("completed"));
    }

    #[test]
    fn backend_errors_are_bad_gateway() {
        let err = AppError::from(BackendError::unavailable("connection refused"));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }
}
