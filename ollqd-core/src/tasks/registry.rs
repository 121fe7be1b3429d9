use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::{collections::HashMap, fmt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::{TaskId, TaskKind, TaskRecord, TaskResult, TaskStatus};

/// Default number of finished records kept before the oldest are evicted.
pub const DEFAULT_MAX_FINISHED: usize = 100;

/// Parameter keys whose values never leave the registry in a snapshot.
const SECRET_PARAMETERS: &[&str] = &["password"];
const REDACTED: &str = "***";

struct TaskEntry {
    record: TaskRecord,
    cancel: Option<CancellationToken>,
}

impl TaskEntry {
    /// Owned copy for callers, with derived fields filled and secrets masked.
    fn snapshot(&self, now: chrono::DateTime<Utc>) -> TaskRecord {
        let mut record = self.record.clone();
        record.duration_ms = record.compute_duration_ms(now);
        for key in SECRET_PARAMETERS {
            if let Some(value) = record.parameters.get_mut(*key)
                && !value.is_null()
            {
                *value = Value::String(REDACTED.to_string());
            }
        }
        record
    }

    fn finish(&mut self, status: TaskStatus) {
        self.record.status = status;
        self.record.completed_at = Some(Utc::now());
        self.record.cancellable = false;
        self.cancel = None;
    }
}

/// In-memory store of task records keyed by id.
///
/// Every operation is total over ids: unknown ids are ignored (or reported
/// through the return value) rather than treated as errors, so a late
/// lifecycle call racing a `clear_finished` can never resurrect a record.
/// All mutation goes through a single lock that is held only for the field
/// updates themselves, never across I/O, and reads return owned copies.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    max_finished: usize,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.tasks.try_lock().map(|guard| guard.len());
        f.debug_struct("TaskRegistry")
            .field("task_count", &len)
            .field("max_finished", &self.max_finished)
            .finish()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_MAX_FINISHED)
    }

    /// Registry that keeps at most `max_finished` terminal records. Zero
    /// disables eviction entirely.
    pub fn with_retention(max_finished: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            max_finished,
        }
    }

    /// Register a new Pending task and return its id.
    pub fn create(&self, kind: TaskKind, parameters: Map<String, Value>) -> TaskId {
        let id = TaskId::new();
        let record = TaskRecord::pending(id, kind, parameters);

        let mut guard = self.tasks.lock();
        guard.insert(
            id,
            TaskEntry {
                record,
                cancel: None,
            },
        );
        let evicted = self.evict_finished(&mut guard);
        drop(guard);

        if evicted > 0 {
            debug!(evicted, "evicted finished tasks beyond retention bound");
        }
        info!(task_id = %id, kind = %kind, "task created");
        id
    }

    /// Pending -> Running. No-op for unknown ids and for records that already
    /// left Pending.
    pub fn start(&self, id: &TaskId) {
        let mut guard = self.tasks.lock();
        let Some(entry) = guard.get_mut(id) else {
            return;
        };
        if entry.record.status != TaskStatus::Pending {
            return;
        }
        entry.record.status = TaskStatus::Running;
        entry.record.started_at = Some(Utc::now());
        drop(guard);
        debug!(task_id = %id, "task running");
    }

    /// Record progress for a running task. Progress is clamped to `0..=1`
    /// and never moves backwards; `phase` labels a sub-phase without leaving
    /// Running.
    pub fn update_progress(&self, id: &TaskId, progress: f64, phase: Option<&str>) {
        let mut guard = self.tasks.lock();
        let Some(entry) = guard.get_mut(id) else {
            return;
        };
        if entry.record.status != TaskStatus::Running {
            return;
        }
        if progress.is_finite() {
            let clamped = progress.clamp(0.0, 1.0);
            if clamped > entry.record.progress {
                entry.record.progress = clamped;
            }
        }
        if let Some(phase) = phase.filter(|p| !p.is_empty()) {
            entry.record.phase = Some(phase.to_string());
        }
    }

    /// Running -> Completed.
    pub fn complete(&self, id: &TaskId, result: TaskResult) {
        let mut guard = self.tasks.lock();
        let Some(entry) = guard.get_mut(id) else {
            return;
        };
        if entry.record.status != TaskStatus::Running {
            return;
        }
        entry.record.progress = 1.0;
        entry.record.result = Some(result);
        entry.finish(TaskStatus::Completed);
        drop(guard);
        info!(task_id = %id, "task completed");
    }

    /// Pending|Running -> Failed.
    pub fn fail(&self, id: &TaskId, error: impl Into<String>) {
        let error = error.into();
        let mut guard = self.tasks.lock();
        let Some(entry) = guard.get_mut(id) else {
            return;
        };
        if entry.record.is_terminal() {
            return;
        }
        entry.record.error = Some(error.clone());
        entry.finish(TaskStatus::Failed);
        drop(guard);
        info!(task_id = %id, %error, "task failed");
    }

    /// Force a non-terminal task to Cancelled, signalling its cancellation
    /// handle if one is attached. Returns `false` for unknown ids and for
    /// tasks that already reached a terminal state.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let mut guard = self.tasks.lock();
        let Some(entry) = guard.get_mut(id) else {
            return false;
        };
        if entry.record.is_terminal() {
            return false;
        }
        let handle = entry.cancel.take();
        entry.finish(TaskStatus::Cancelled);
        drop(guard);

        if let Some(handle) = handle {
            handle.cancel();
        }
        info!(task_id = %id, "task cancelled");
        true
    }

    /// Attach the cancellation handle for a task's execution scope. Ignored
    /// once the task is terminal.
    pub fn set_cancellation_handle(&self, id: &TaskId, handle: CancellationToken) {
        let mut guard = self.tasks.lock();
        let Some(entry) = guard.get_mut(id) else {
            return;
        };
        if entry.record.is_terminal() {
            return;
        }
        entry.cancel = Some(handle);
        entry.record.cancellable = true;
    }

    pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        let now = Utc::now();
        let guard = self.tasks.lock();
        guard.get(id).map(|entry| entry.snapshot(now))
    }

    /// Parameters exactly as submitted, secrets included. Only for
    /// re-dispatching the task; everything shown to clients goes through
    /// [`get`](Self::get) or [`list`](Self::list).
    pub fn parameters(&self, id: &TaskId) -> Option<Map<String, Value>> {
        self.tasks
            .lock()
            .get(id)
            .map(|entry| entry.record.parameters.clone())
    }

    /// Snapshot of every record, most recently created first.
    pub fn list(&self) -> Vec<TaskRecord> {
        let now = Utc::now();
        let guard = self.tasks.lock();
        let mut records: Vec<TaskRecord> =
            guard.values().map(|entry| entry.snapshot(now)).collect();
        drop(guard);

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records
    }

    /// Remove every terminal record and return how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut guard = self.tasks.lock();
        let before = guard.len();
        guard.retain(|_, entry| !entry.record.is_terminal());
        let cleared = before - guard.len();
        drop(guard);

        info!(cleared, "cleared finished tasks");
        cleared
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records that are still Pending or Running.
    pub fn active_count(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|entry| !entry.record.is_terminal())
            .count()
    }

    fn evict_finished(&self, tasks: &mut HashMap<TaskId, TaskEntry>) -> usize {
        if self.max_finished == 0 {
            return 0;
        }
        let mut finished: Vec<(TaskId, chrono::DateTime<Utc>)> = tasks
            .values()
            .filter(|entry| entry.record.is_terminal())
            .map(|entry| (entry.record.id, entry.record.created_at))
            .collect();
        if finished.len() <= self.max_finished {
            return 0;
        }
        finished.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        let excess = finished.len() - self.max_finished;
        for (id, _) in finished.into_iter().take(excess) {
            tasks.remove(&id);
        }
        excess
    }
}
