use thiserror::Error;

use crate::tasks::{TaskId, TaskStatus};

/// Errors surfaced by the task-facing API (submission, retry, cancel).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("invalid parameters: {0}")]
    Validation(String),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id} is in state {status}, cannot {action}")]
    Conflict {
        id: TaskId,
        status: TaskStatus,
        action: &'static str,
    },
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Errors produced by a backend streaming call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The call could not be opened (connect failure, rejected request).
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The stream broke after it was opened.
    #[error("stream error: {0}")]
    Stream(String),

    /// A frame arrived that could not be decoded.
    #[error("malformed frame: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
