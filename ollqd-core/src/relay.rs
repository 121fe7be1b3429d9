//! Newline framing for streamed bodies.
//!
//! [`LineFramer`] turns arbitrarily split byte chunks into complete lines. It
//! backs both the NDJSON decoder for worker streams and [`relay_lines`], which
//! re-frames an upstream line-delimited body as relay events that always end
//! with [`RelayFrame::Done`].

use std::fmt::Display;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::json;

/// Marker sent as the last event of every relayed stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Accumulates bytes and yields complete, trimmed, non-blank lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // The buffer never holds a newline between calls, so only the new
        // bytes need scanning.
        let start = self.buffer.len();
        self.buffer.extend_from_slice(chunk);
        let Some(last) = self.buffer[start..].iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.buffer.drain(..=start + last).collect();
        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .filter_map(normalize)
            .collect()
    }

    /// The trailing fragment left after a clean end of input, if it holds
    /// anything but whitespace.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        normalize(&rest)
    }

    /// Drop whatever partial line is buffered.
    pub fn discard(&mut self) {
        self.buffer.clear();
    }
}

fn normalize(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// One event of a relayed stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayFrame {
    Line(String),
    Error(String),
    Done,
}

impl RelayFrame {
    /// Event payload as written to the client.
    pub fn data(&self) -> String {
        match self {
            RelayFrame::Line(line) => line.clone(),
            RelayFrame::Error(message) => json!({ "error": message }).to_string(),
            RelayFrame::Done => DONE_MARKER.to_string(),
        }
    }
}

/// Re-frame a streamed body into lines.
///
/// Lines are emitted as soon as their newline arrives. A read error discards
/// the partial line and emits one [`RelayFrame::Error`]; a clean end flushes
/// the trailing fragment. Either way the stream finishes with
/// [`RelayFrame::Done`].
pub fn relay_lines<S, B, E>(body: S) -> impl Stream<Item = RelayFrame>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    stream! {
        let mut framer = LineFramer::new();
        let mut failure = None;
        let mut body = Box::pin(body);

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for line in framer.push(bytes.as_ref()) {
                        yield RelayFrame::Line(line);
                    }
                }
                Err(err) => {
                    failure = Some(err.to_string());
                    break;
                }
            }
        }

        match failure {
            Some(message) => {
                framer.discard();
                yield RelayFrame::Error(message);
            }
            None => {
                if let Some(line) = framer.finish() {
                    yield RelayFrame::Line(line);
                }
            }
        }
        yield RelayFrame::Done;
    }
}
