#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{Router, body::Body, routing::post};
use axum_test::TestServer;
use ollqd_core::{
    BackendError, BackendStream, ChatBackend, ChatFrame, ChatRequest, IndexJob, IndexingBackend,
    ProgressFrame, TaskResult,
    backend::{ChatStream, ProgressStream},
};
use ollqd_server::{
    AppState, Config, build_router,
    infra::{config::OllamaConfig, ollama::OllamaClient},
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Root paths with scripted behaviour in [`StubIndexing`].
pub const HANG_ROOT: &str = "/hang";
pub const OFFLINE_ROOT: &str = "/offline";

pub struct ScriptedStream<T> {
    frames: VecDeque<Result<T, BackendError>>,
    hang_at_end: bool,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl<T: Send + 'static> BackendStream<T> for ScriptedStream<T> {
    async fn receive(&mut self) -> Result<Option<T>, BackendError> {
        match self.frames.pop_front() {
            Some(frame) => frame.map(Some),
            None if self.hang_at_end => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Indexing backend keyed on `root_path` (or `collection` for kinds without
/// one): [`HANG_ROOT`] blocks after one
/// progress frame, [`OFFLINE_ROOT`] refuses to open, anything else reports
/// progress and completes with `{"files": "3"}`.
#[derive(Default)]
pub struct StubIndexing {
    pub opened: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
}

#[async_trait]
impl IndexingBackend for StubIndexing {
    async fn open_index(
        &self,
        job: &IndexJob,
        _cancel: CancellationToken,
    ) -> Result<ProgressStream, BackendError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let parameters = job.to_parameters();
        let field = |key: &str| {
            parameters
                .get(key)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };
        let root = field("root_path")
            .or_else(|| field("collection"))
            .unwrap_or_default();

        let (frames, hang_at_end) = match root.as_str() {
            OFFLINE_ROOT => return Err(BackendError::unavailable("worker offline")),
            HANG_ROOT => (vec![Ok(ProgressFrame::running(0.4))], true),
            _ => {
                let mut result = TaskResult::new();
                result.insert("files".into(), "3".into());
                (
                    vec![
                        Ok(ProgressFrame::running(0.3)),
                        Ok(ProgressFrame::running(0.7)),
                        Ok(ProgressFrame::completed(result)),
                    ],
                    false,
                )
            }
        };

        Ok(Box::new(ScriptedStream {
            frames: frames.into(),
            hang_at_end,
            closes: self.closes.clone(),
        }))
    }
}

/// Chat backend answering every message with one chunk and done.
pub struct StubChat;

#[async_trait]
impl ChatBackend for StubChat {
    async fn open_chat(
        &self,
        request: &ChatRequest,
        _cancel: CancellationToken,
    ) -> Result<ChatStream, BackendError> {
        let frames = vec![
            Ok(ChatFrame::Chunk {
                content: format!("echo: {}", request.message),
            }),
            Ok(ChatFrame::Done {
                pii_masked: false,
                pii_entities_count: 0,
            }),
        ];
        Ok(Box::new(ScriptedStream {
            frames: frames.into(),
            hang_at_end: false,
            closes: Arc::default(),
        }))
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub indexing: Arc<StubIndexing>,
}

pub fn build_test_app(ollama_url: &str) -> Result<TestApp> {
    build_app(ollama_url, false)
}

/// Same app served over a real socket, needed for WebSocket upgrades.
pub fn build_http_test_app(ollama_url: &str) -> Result<TestApp> {
    build_app(ollama_url, true)
}

fn build_app(ollama_url: &str, http_transport: bool) -> Result<TestApp> {
    let mut config = Config::default();
    config.ollama.url = ollama_url.to_string();

    let ollama = OllamaClient::new(&OllamaConfig {
        url: ollama_url.to_string(),
        connect_timeout_secs: 2,
    })?;
    let indexing = Arc::new(StubIndexing::default());
    let state = AppState::with_backends(config, indexing.clone(), Arc::new(StubChat), ollama);
    let router = build_router(state.clone());
    let server = if http_transport {
        TestServer::builder()
            .http_transport()
            .build(router)
            .map_err(|err| anyhow::anyhow!(err.to_string()))?
    } else {
        TestServer::new(router).context("failed to start test server")?
    };

    Ok(TestApp {
        server,
        state,
        indexing,
    })
}

/// Serve a fake Ollama whose `/api/pull` returns `body` verbatim. Returns the
/// base URL.
pub async fn spawn_fake_ollama(body: &'static str) -> Result<String> {
    let app = Router::new().route("/api/pull", post(move || async move { Body::from(body) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

/// A base URL nothing is listening on.
pub async fn unreachable_url() -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

/// Poll a task until `done` holds for its JSON record.
pub async fn wait_for_task<F>(server: &TestServer, task_id: &str, done: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    let path = format!("/api/rag/tasks/{task_id}");
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record: Value = server.get(&path).await.json();
            if done(&record) {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {task_id} did not reach the expected state"))
}

pub fn is_terminal(record: &Value) -> bool {
    matches!(
        record["status"].as_str(),
        Some("completed" | "failed" | "cancelled")
    )
}
