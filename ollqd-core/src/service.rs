use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::backend::IndexingBackend;
use crate::consumer::StreamConsumer;
use crate::error::{Result, TaskError};
use crate::jobs::IndexJob;
use crate::tasks::{TaskId, TaskRecord, TaskRegistry};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Started,
    Failed,
}

/// Outcome of a retry request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryAccepted {
    pub task_id: TaskId,
    pub original_task_id: TaskId,
    pub status: DispatchStatus,
}

/// Submission, retry and cancellation of indexing tasks.
///
/// Every task runs in its own spawned [`StreamConsumer`] under a child of the
/// service's shutdown token, so [`TaskService::shutdown`] finalizes all of
/// them as Cancelled.
#[derive(Clone)]
pub struct TaskService {
    registry: Arc<TaskRegistry>,
    backend: Arc<dyn IndexingBackend>,
    consumer: StreamConsumer,
    shutdown: CancellationToken,
}

impl fmt::Debug for TaskService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskService")
            .field("registry", &self.registry)
            .field("shutdown_requested", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TaskService {
    pub fn new(registry: Arc<TaskRegistry>, backend: Arc<dyn IndexingBackend>) -> Self {
        Self {
            consumer: StreamConsumer::new(registry.clone()),
            registry,
            backend,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Validate `job`, register it and start consuming its stream in the
    /// background. Returns before any backend I/O happens.
    #[instrument(skip(self, job), fields(kind = %job.kind()))]
    pub fn submit(&self, job: IndexJob) -> Result<TaskId> {
        job.validate()?;
        let task_id = self.registry.create(job.kind(), job.to_parameters());
        self.launch(task_id, job);
        Ok(task_id)
    }

    /// Re-run a finished task's stored parameters as a new task. The original
    /// record is left untouched.
    #[instrument(skip(self))]
    pub fn retry(&self, original: &TaskId) -> Result<RetryAccepted> {
        let record = self.get(original)?;
        if !record.is_terminal() {
            return Err(TaskError::Conflict {
                id: *original,
                status: record.status,
                action: "retry",
            });
        }

        let parameters = self
            .registry
            .parameters(original)
            .ok_or(TaskError::NotFound(*original))?;
        let task_id = self.registry.create(record.kind, parameters.clone());
        let status = match IndexJob::from_parameters(record.kind, &parameters) {
            Ok(job) => {
                self.launch(task_id, job);
                DispatchStatus::Started
            }
            Err(err) => {
                warn!(%task_id, error = %err, "stored parameters no longer valid");
                self.registry
                    .fail(&task_id, format!("cannot retry {}: {err}", record.kind));
                DispatchStatus::Failed
            }
        };

        info!(%task_id, original_task_id = %original, ?status, "task retried");
        Ok(RetryAccepted {
            task_id,
            original_task_id: *original,
            status,
        })
    }

    /// Cancel a pending or running task.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: &TaskId) -> Result<()> {
        if self.registry.cancel(id) {
            return Ok(());
        }
        let record = self.get(id)?;
        Err(TaskError::Conflict {
            id: *id,
            status: record.status,
            action: "cancel",
        })
    }

    pub fn get(&self, id: &TaskId) -> Result<TaskRecord> {
        self.registry.get(id).ok_or(TaskError::NotFound(*id))
    }

    pub fn list(&self) -> Vec<TaskRecord> {
        self.registry.list()
    }

    pub fn clear_finished(&self) -> usize {
        self.registry.clear_finished()
    }

    /// Cancel every task started by this service.
    pub fn shutdown(&self) {
        info!("cancelling all running tasks");
        self.shutdown.cancel();
    }

    fn launch(&self, task_id: TaskId, job: IndexJob) {
        let scope = self.shutdown.child_token();
        self.registry.set_cancellation_handle(&task_id, scope.clone());

        let backend = self.backend.clone();
        let consumer = self.consumer.clone();
        tokio::spawn(async move {
            consumer
                .run(task_id, scope, |cancel| async move {
                    backend.open_index(&job, cancel).await
                })
                .await;
        });
    }
}
