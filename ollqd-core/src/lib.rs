//! Core of the ollqd gateway.
//!
//! The gateway sits between a synchronous client API and a worker that runs
//! long indexing and chat operations as streams. This crate owns the parts that
//! do not depend on a transport:
//!
//! - [`tasks`]: task records and the concurrency-safe [`TaskRegistry`]
//! - [`consumer`]: drains one backend progress stream into one task record
//! - [`service`]: submission and retry of indexing jobs
//! - [`chat`]: per-connection chat bridge over a sequence of backend exchanges
//! - [`relay`]: newline framing shared by the NDJSON decoder and the upstream
//!   event-stream proxy
//!
//! Backends are reached only through the ports in [`backend`].

pub mod backend;
pub mod chat;
pub mod consumer;
pub mod error;
pub mod jobs;
pub mod relay;
pub mod service;
pub mod tasks;

pub use backend::{
    BackendStream, ChatBackend, ChatFrame, ChatRequest, FrameStatus, IndexingBackend,
    ProgressFrame, SearchHit,
};
pub use chat::ChatBridge;
pub use consumer::StreamConsumer;
pub use error::{BackendError, Result, TaskError};
pub use jobs::IndexJob;
pub use relay::{LineFramer, RelayFrame};
pub use service::{DispatchStatus, RetryAccepted, TaskService};
pub use tasks::{TaskId, TaskKind, TaskRecord, TaskRegistry, TaskResult, TaskStatus};
