//! HTTP client for the indexing/chat worker.
//!
//! Each call is a `POST` whose 2xx response body is newline-delimited JSON,
//! one frame per line. The response has no timeout; it is abandoned by
//! dropping the body when the call's cancellation token fires or the stream
//! is closed.

use std::{collections::VecDeque, fmt, marker::PhantomData, pin::Pin, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use ollqd_core::{
    BackendError, BackendStream, ChatBackend, ChatFrame, ChatRequest, IndexJob, IndexingBackend,
    LineFramer, ProgressFrame,
    backend::{ChatStream, ProgressStream},
};

use crate::infra::config::WorkerConfig;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, String>> + Send>>;

#[derive(Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for WorkerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl WorkerClient {
    pub fn new(config: &WorkerConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("failed to build worker HTTP client")?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, body, cancel))]
    async fn open<T, B>(
        &self,
        path: &str,
        body: &B,
        cancel: CancellationToken,
    ) -> Result<NdjsonStream<T>, BackendError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}/{}", self.base_url, path);
        let request = self.http.post(&url).json(body).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(BackendError::unavailable("cancelled before the stream opened"));
            }
            response = request => response
                .map_err(|err| BackendError::unavailable(format!("{url}: {err}")))?,
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::unavailable(format!(
                "{url} returned {status}: {}",
                detail.trim()
            )));
        }

        debug!(%url, "worker stream opened");
        Ok(NdjsonStream::from_body(response.bytes_stream()))
    }
}

#[async_trait]
impl IndexingBackend for WorkerClient {
    async fn open_index(
        &self,
        job: &IndexJob,
        cancel: CancellationToken,
    ) -> Result<ProgressStream, BackendError> {
        let path = format!("v1/index/{}", job.kind().route_segment());
        let stream = self
            .open::<ProgressFrame, _>(&path, &job.to_parameters(), cancel)
            .await?;
        Ok(Box::new(stream))
    }
}

#[async_trait]
impl ChatBackend for WorkerClient {
    async fn open_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatStream, BackendError> {
        let stream = self.open::<ChatFrame, _>("v1/chat", request, cancel).await?;
        Ok(Box::new(stream))
    }
}

/// Decodes a newline-delimited JSON body into frames of type `T`.
pub struct NdjsonStream<T> {
    body: Option<ByteStream>,
    framer: LineFramer,
    pending: VecDeque<String>,
    _frame: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for NdjsonStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdjsonStream")
            .field("open", &self.body.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<T> NdjsonStream<T> {
    pub fn from_body<S, B, E>(body: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let body = body.map(|chunk| {
            chunk
                .map(|bytes| bytes.as_ref().to_vec())
                .map_err(|err| err.to_string())
        });
        Self {
            body: Some(Box::pin(body)),
            framer: LineFramer::new(),
            pending: VecDeque::new(),
            _frame: PhantomData,
        }
    }
}

#[async_trait]
impl<T> BackendStream<T> for NdjsonStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn receive(&mut self) -> Result<Option<T>, BackendError> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return serde_json::from_str(&line)
                    .map(Some)
                    .map_err(|err| BackendError::Decode(format!("{err} in {line:?}")));
            }

            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };

            let next = body.next().await;
            match next {
                Some(Ok(chunk)) => self.pending.extend(self.framer.push(&chunk)),
                Some(Err(err)) => {
                    self.body = None;
                    self.framer.discard();
                    return Err(BackendError::stream(err));
                }
                None => {
                    self.body = None;
                    self.pending.extend(self.framer.finish());
                }
            }
        }
    }

    async fn close(&mut self) {
        self.body = None;
        self.pending.clear();
        self.framer.discard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use ollqd_core::FrameStatus;

    fn body(parts: Vec<Result<&'static str, &'static str>>) -> NdjsonStream<ProgressFrame> {
        NdjsonStream::from_body(stream::iter(parts))
    }

    #[tokio::test]
    async fn decodes_frames_split_across_chunks() {
        let mut stream = body(vec![
            Ok("{\"status\":\"running\",\"progress\":0.25}\n{\"status\":\"run"),
            Ok("ning\",\"progress\":0.5,\"message\":\"embedding\"}\n"),
            Ok("{\"status\":\"completed\",\"result\":{\"files\":\"3\"}}"),
        ]);

        let first = stream.receive().await.unwrap().unwrap();
        assert_eq!(first.progress, 0.25);
        let second = stream.receive().await.unwrap().unwrap();
        assert_eq!(second.message.as_deref(), Some("embedding"));
        let third = stream.receive().await.unwrap().unwrap();
        assert_eq!(third.status, FrameStatus::Completed);
        assert_eq!(third.result.unwrap()["files"], "3");
        assert_eq!(stream.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn undecodable_line_is_a_decode_error() {
        let mut stream = body(vec![Ok("not json\n")]);
        assert!(matches!(
            stream.receive().await,
            Err(BackendError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn transport_error_surfaces_once_then_ends() {
        let mut stream = body(vec![
            Ok("{\"status\":\"running\",\"progress\":0.1}\n{\"sta"),
            Err("connection reset"),
        ]);

        assert!(stream.receive().await.unwrap().is_some());
        assert_eq!(
            stream.receive().await,
            Err(BackendError::stream("connection reset"))
        );
        assert_eq!(stream.receive().await, Ok(None));
    }

    #[tokio::test]
    async fn close_drops_buffered_frames() {
        let mut stream = body(vec![Ok(
            "{\"status\":\"running\",\"progress\":0.1}\n{\"status\":\"running\",\"progress\":0.2}\n",
        )]);
        assert!(stream.receive().await.unwrap().is_some());

        stream.close().await;
        stream.close().await;
        assert_eq!(stream.receive().await, Ok(None));
    }

    #[tokio::test]
    async fn chat_events_decode_by_type() {
        let mut stream: NdjsonStream<ChatFrame> = NdjsonStream::from_body(stream::iter(vec![
            Ok::<_, &str>("{\"type\":\"chunk\",\"content\":\"Hel\"}\n"),
            Ok("{\"type\":\"done\",\"pii_masked\":true,\"pii_entities_count\":1}\n"),
        ]));

        assert_eq!(
            stream.receive().await.unwrap(),
            Some(ChatFrame::Chunk {
                content: "Hel".into()
            })
        );
        assert!(stream.receive().await.unwrap().unwrap().is_terminal());
    }

    #[test]
    fn base_url_is_normalized() {
        let client = WorkerClient::new(&WorkerConfig {
            url: "http://worker:50051/".into(),
            connect_timeout_secs: 1,
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://worker:50051");
    }
}
