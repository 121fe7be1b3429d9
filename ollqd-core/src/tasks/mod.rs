//! Task records and the in-memory registry that owns them.

pub mod registry;
pub mod types;

pub use registry::{DEFAULT_MAX_FINISHED, TaskRegistry};
pub use types::{TaskId, TaskKind, TaskRecord, TaskResult, TaskStatus};
