pub mod handle_chat_websocket;
pub mod index;
pub mod ollama;
pub mod system;
pub mod tasks;

use axum::extract::Path;
use ollqd_core::TaskId;

use crate::infra::errors::{AppError, AppResult};

/// Parse a task id path segment. Anything that is not an id cannot name a
/// task, so it is reported as not found.
pub(crate) fn parse_task_id(Path(raw): Path<String>) -> AppResult<TaskId> {
    raw.parse()
        .map_err(|_| AppError::not_found(format!("task {raw} not found")))
}
