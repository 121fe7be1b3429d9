use std::{future::Future, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::{FrameStatus, ProgressFrame, ProgressStream};
use crate::error::BackendError;
use crate::tasks::{TaskId, TaskRegistry, TaskResult, TaskStatus};

/// Drains one backend progress stream into one task record.
///
/// The same consumer runs every job kind; the only per-kind piece is the
/// `open` factory handed to [`StreamConsumer::run`].
#[derive(Clone, Debug)]
pub struct StreamConsumer {
    registry: Arc<TaskRegistry>,
}

enum Exit {
    Finished,
    Cancelled,
}

impl StreamConsumer {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }

    /// Open the stream with `open` under `cancel`, then apply frames to the
    /// task until the stream ends, fails, reports a terminal status or the
    /// token fires. Returns the task's final status, `None` if the record
    /// was removed meanwhile.
    #[instrument(skip(self, cancel, open), fields(task_id = %task_id))]
    pub async fn run<F, Fut>(
        &self,
        task_id: TaskId,
        cancel: CancellationToken,
        open: F,
    ) -> Option<TaskStatus>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<ProgressStream, BackendError>>,
    {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.finalize_cancelled(&task_id);
                return self.final_status(&task_id);
            }
            opened = open(cancel.clone()) => opened,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "failed to open indexing stream");
                self.registry.fail(&task_id, err.to_string());
                return self.final_status(&task_id);
            }
        };

        self.registry.start(&task_id);
        let exit = self.drain(&task_id, &cancel, &mut stream).await;
        stream.close().await;

        if matches!(exit, Exit::Cancelled) {
            self.finalize_cancelled(&task_id);
        }
        self.final_status(&task_id)
    }

    async fn drain(
        &self,
        task_id: &TaskId,
        cancel: &CancellationToken,
        stream: &mut ProgressStream,
    ) -> Exit {
        loop {
            if cancel.is_cancelled() {
                return Exit::Cancelled;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Exit::Cancelled,
                next = stream.receive() => next,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("stream ended without a terminal frame, completing task");
                    self.registry.complete(task_id, TaskResult::new());
                    return Exit::Finished;
                }
                Err(err) => {
                    warn!(error = %err, "indexing stream failed");
                    self.registry.fail(task_id, err.to_string());
                    return Exit::Finished;
                }
            };

            if self.apply(task_id, frame) {
                return Exit::Finished;
            }
        }
    }

    /// Apply one frame, returning whether it was terminal.
    fn apply(&self, task_id: &TaskId, frame: ProgressFrame) -> bool {
        match frame.status {
            FrameStatus::Running => {
                debug!(progress = frame.progress, phase = ?frame.message, "progress");
                self.registry
                    .update_progress(task_id, frame.progress, frame.message.as_deref());
                false
            }
            FrameStatus::Completed => {
                self.registry
                    .complete(task_id, frame.result.unwrap_or_default());
                true
            }
            FrameStatus::Failed => {
                let error = frame
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "indexing failed".to_string());
                self.registry.fail(task_id, error);
                true
            }
            FrameStatus::Cancelled => {
                self.registry.cancel(task_id);
                true
            }
            FrameStatus::Unknown => {
                warn!("skipping progress frame with unknown status");
                false
            }
        }
    }

    // Already Cancelled when an external cancel fired the token; this covers
    // shutdown of the parent scope.
    fn finalize_cancelled(&self, task_id: &TaskId) {
        if self.registry.cancel(task_id) {
            info!("task cancelled by its execution scope");
        }
    }

    fn final_status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.registry.get(task_id).map(|record| record.status)
    }
}
