use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt, str::FromStr};
use uuid::Uuid;

/// Unique identifier for background tasks.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Closed set of background job kinds the gateway knows how to run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    IndexCodebase,
    IndexDocuments,
    IndexImages,
    IndexUploads,
    IndexSmb,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::IndexCodebase => "index_codebase",
            TaskKind::IndexDocuments => "index_documents",
            TaskKind::IndexImages => "index_images",
            TaskKind::IndexUploads => "index_uploads",
            TaskKind::IndexSmb => "index_smb",
        }
    }

    /// Path segment used by the worker's indexing endpoints.
    pub fn route_segment(&self) -> &'static str {
        match self {
            TaskKind::IndexCodebase => "codebase",
            TaskKind::IndexDocuments => "documents",
            TaskKind::IndexImages => "images",
            TaskKind::IndexUploads => "uploads",
            TaskKind::IndexSmb => "smb",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task. Transitions only move forward:
/// Pending -> Running -> {Completed | Failed | Cancelled}.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String-keyed result map reported by the backend on completion.
pub type TaskResult = BTreeMap<String, String>;

/// Point-in-time copy of a task record. The registry never hands out live
/// references; every read produces one of these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(rename = "task_id")]
    pub id: TaskId,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Fraction complete in `0.0..=1.0`.
    pub progress: f64,
    /// Latest sub-phase label reported while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Parameters the task was submitted with, kept verbatim for retry.
    #[serde(rename = "request_params")]
    pub parameters: Map<String, Value>,
    /// Whether a cancellation handle is currently attached.
    pub cancellable: bool,
}

impl TaskRecord {
    pub(crate) fn pending(
        id: TaskId,
        kind: TaskKind,
        parameters: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            kind,
            status: TaskStatus::Pending,
            progress: 0.0,
            phase: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            parameters,
            cancellable: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Elapsed time from start to completion, or to `now` while running.
    pub(crate) fn compute_duration_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or(now);
        Some((end - started).num_milliseconds().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_round_trips_through_display() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn record_serializes_with_gateway_field_names() {
        let mut params = Map::new();
        params.insert("root_path".into(), Value::String("/repo".into()));
        let record =
            TaskRecord::pending(TaskId::new(), TaskKind::IndexCodebase, params);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "index_codebase");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["request_params"]["root_path"], "/repo");
        assert!(json.get("task_id").is_some());
        assert!(json.get("error").is_none());
        assert!(json.get("completed_at").is_none());
    }

    #[test]
    fn duration_is_absent_until_started() {
        let record =
            TaskRecord::pending(TaskId::new(), TaskKind::IndexImages, Map::new());
        assert_eq!(record.compute_duration_ms(Utc::now()), None);
    }
}
