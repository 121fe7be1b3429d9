//! Ports to the worker that performs indexing and chat.
//!
//! A backend call is opened under a cancellation token and yields frames
//! until it ends. Implementations live in the server crate (HTTP + NDJSON);
//! tests use in-memory scripted streams.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;
use crate::jobs::IndexJob;
use crate::tasks::TaskResult;

/// One open backend streaming call.
#[async_trait]
pub trait BackendStream<T>: Send {
    /// Next frame, `Ok(None)` once the stream ended cleanly.
    async fn receive(&mut self) -> Result<Option<T>, BackendError>;

    /// Release the underlying call. Safe to call more than once.
    async fn close(&mut self);
}

pub type ProgressStream = Box<dyn BackendStream<ProgressFrame>>;
pub type ChatStream = Box<dyn BackendStream<ChatFrame>>;

#[async_trait]
pub trait IndexingBackend: Send + Sync {
    /// Open an indexing call for `job`. The call is abandoned once `cancel`
    /// fires.
    async fn open_index(
        &self,
        job: &IndexJob,
        cancel: CancellationToken,
    ) -> Result<ProgressStream, BackendError>;
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream, BackendError>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Any status this gateway does not know. Logged and skipped.
    #[serde(other)]
    Unknown,
}

/// Progress report emitted by an indexing call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressFrame {
    pub status: FrameStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Sub-phase label, e.g. "embedding".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressFrame {
    pub fn running(progress: f64) -> Self {
        Self {
            status: FrameStatus::Running,
            progress,
            error: None,
            result: None,
            message: None,
        }
    }

    pub fn completed(result: TaskResult) -> Self {
        Self {
            status: FrameStatus::Completed,
            progress: 1.0,
            error: None,
            result: Some(result),
            message: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: FrameStatus::Failed,
            progress: 0.0,
            error: Some(error.into()),
            result: None,
            message: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: FrameStatus::Cancelled,
            progress: 0.0,
            error: None,
            result: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Inbound chat message from a client connection. Fields beyond the known ones
/// are kept in `options` and passed through to the worker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub pii_enabled: bool,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchHit {
    pub score: f64,
    pub file_path: String,
    pub language: String,
    pub lines: String,
    pub chunk_info: String,
    pub content: String,
}

/// Event of one chat exchange, also the outbound connection frame.
///
/// Events whose `type` is not one of the named variants (or that do not fit
/// its shape) decode as [`ChatFrame::Other`] and serialize back unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatFrame {
    Chunk {
        content: String,
    },
    Sources {
        #[serde(default)]
        sources: Vec<SearchHit>,
    },
    Done {
        #[serde(default)]
        pii_masked: bool,
        #[serde(default)]
        pii_entities_count: u32,
    },
    Error {
        content: String,
    },
    Cancelled {
        #[serde(default)]
        content: String,
    },
    #[serde(untagged)]
    Other(Value),
}

impl ChatFrame {
    pub fn error(content: impl Into<String>) -> Self {
        ChatFrame::Error {
            content: content.into(),
        }
    }

    /// Whether this event ends its exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatFrame::Done { .. } | ChatFrame::Error { .. } | ChatFrame::Cancelled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn progress_frame_tolerates_unknown_status() {
        let frame: ProgressFrame =
            serde_json::from_value(json!({ "status": "queued", "progress": 0.1 })).unwrap();
        assert_eq!(frame.status, FrameStatus::Unknown);
    }

    #[test]
    fn chat_frames_use_type_tag() {
        let json = serde_json::to_value(ChatFrame::Done {
            pii_masked: true,
            pii_entities_count: 2,
        })
        .unwrap();
        assert_eq!(
            json,
            json!({ "type": "done", "pii_masked": true, "pii_entities_count": 2 })
        );

        let frame: ChatFrame =
            serde_json::from_value(json!({ "type": "chunk", "content": "hi" })).unwrap();
        assert_eq!(frame, ChatFrame::Chunk { content: "hi".into() });
        assert!(!frame.is_terminal());
        assert!(ChatFrame::error("x").is_terminal());
    }

    #[test]
    fn unrecognized_chat_event_round_trips_unchanged() {
        let raw = json!({ "type": "usage", "prompt_tokens": 12 });
        let frame: ChatFrame = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(frame, ChatFrame::Other(raw.clone()));
        assert!(!frame.is_terminal());
        assert_eq!(serde_json::to_value(&frame).unwrap(), raw);
    }

    #[test]
    fn sources_event_carries_hits() {
        let frame: ChatFrame = serde_json::from_value(json!({
            "type": "sources",
            "sources": [{ "score": 0.9, "file_path": "src/main.rs", "lines": "1-20" }]
        }))
        .unwrap();
        match frame {
            ChatFrame::Sources { sources } => {
                assert_eq!(sources.len(), 1);
                assert_eq!(sources[0].file_path, "src/main.rs");
                assert_eq!(sources[0].language, "");
            }
            other => panic!("expected sources, got {other:?}"),
        }
    }

    #[test]
    fn chat_request_keeps_extra_options() {
        let request: ChatRequest = serde_json::from_value(json!({
            "message": "what does main do?",
            "collection": "repo",
            "top_k": 5
        }))
        .unwrap();
        assert_eq!(request.collection, "repo");
        assert!(!request.pii_enabled);
        assert_eq!(request.options["top_k"], 5);
    }
}
