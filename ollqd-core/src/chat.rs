use std::{fmt, sync::Arc};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{ChatBackend, ChatFrame, ChatRequest, ChatStream};

/// Inbound messages held while an exchange is open. Once full the connection
/// stops reading from the client.
pub const INBOUND_QUEUE_DEPTH: usize = 8;

/// Where a connection is in its request/stream cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Idle,
    StreamOpen,
}

/// Bridges a persistent client connection to a sequence of backend chat
/// exchanges, one per inbound message, strictly one at a time.
#[derive(Clone)]
pub struct ChatBridge {
    backend: Arc<dyn ChatBackend>,
}

impl fmt::Debug for ChatBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatBridge").finish_non_exhaustive()
    }
}

struct Connection {
    state: ConnectionState,
    scope: CancellationToken,
    outbound: mpsc::Sender<ChatFrame>,
}

impl Connection {
    fn transition(&mut self, next: ConnectionState) {
        debug!(from = ?self.state, to = ?next, "chat connection state");
        self.state = next;
    }

    /// Returns false once the client side is gone.
    async fn send(&self, frame: ChatFrame) -> bool {
        if self.outbound.send(frame).await.is_err() {
            self.scope.cancel();
            return false;
        }
        true
    }
}

impl ChatBridge {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Serve one connection until `inbound` ends, `outbound` is closed or
    /// `scope` is cancelled. Messages that arrive while an exchange is open
    /// wait their turn; past [`INBOUND_QUEUE_DEPTH`] of them `inbound` is no
    /// longer polled. Returns the number of exchanges handled.
    pub async fn serve<S>(
        &self,
        inbound: S,
        outbound: mpsc::Sender<ChatFrame>,
        scope: CancellationToken,
    ) -> usize
    where
        S: Stream<Item = String> + Send + 'static,
    {
        let (queue_tx, mut queue) = mpsc::channel::<String>(INBOUND_QUEUE_DEPTH);
        let reader_scope = scope.clone();
        let reader = tokio::spawn(async move {
            let mut inbound = Box::pin(inbound);
            loop {
                let raw = tokio::select! {
                    _ = reader_scope.cancelled() => break,
                    next = inbound.next() => match next {
                        Some(raw) => raw,
                        None => break,
                    },
                };
                tokio::select! {
                    _ = reader_scope.cancelled() => break,
                    sent = queue_tx.send(raw) => if sent.is_err() {
                        break;
                    },
                }
            }
            // Closing the connection tears down whatever exchange is open.
            reader_scope.cancel();
        });

        let mut connection = Connection {
            state: ConnectionState::Idle,
            scope,
            outbound,
        };
        let mut handled = 0;

        loop {
            let raw = tokio::select! {
                biased;
                _ = connection.scope.cancelled() => break,
                raw = queue.recv() => match raw {
                    Some(raw) => raw,
                    None => break,
                },
            };
            handled += 1;
            self.exchange(&mut connection, &raw).await;
            connection.transition(ConnectionState::Idle);
        }

        reader.abort();
        info!(exchanges = handled, "chat connection closed");
        handled
    }

    async fn exchange(&self, connection: &mut Connection, raw: &str) {
        let request: ChatRequest = match serde_json::from_str(raw) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "rejecting malformed chat message");
                connection
                    .send(ChatFrame::error(format!("invalid JSON message: {err}")))
                    .await;
                return;
            }
        };
        if request.message.trim().is_empty() {
            connection.send(ChatFrame::error("message is required")).await;
            return;
        }

        let exchange = connection.scope.child_token();
        let _guard = exchange.clone().drop_guard();
        connection.transition(ConnectionState::StreamOpen);

        let opened = tokio::select! {
            biased;
            _ = exchange.cancelled() => return,
            opened = self.backend.open_chat(&request, exchange.clone()) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "failed to open chat stream");
                connection
                    .send(ChatFrame::error(format!("failed to start chat: {err}")))
                    .await;
                return;
            }
        };

        Self::forward(connection, &exchange, &mut stream).await;
        stream.close().await;
    }

    async fn forward(
        connection: &Connection,
        exchange: &CancellationToken,
        stream: &mut ChatStream,
    ) {
        loop {
            let next = tokio::select! {
                biased;
                _ = exchange.cancelled() => {
                    debug!("chat exchange cancelled");
                    return;
                }
                next = stream.receive() => next,
            };

            match next {
                Ok(Some(ChatFrame::Other(event))) => {
                    debug!(%event, "forwarding chat event of unrecognized type");
                    if !connection.send(ChatFrame::Other(event)).await {
                        return;
                    }
                }
                Ok(Some(frame)) => {
                    let terminal = frame.is_terminal();
                    if !connection.send(frame).await || terminal {
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    warn!(error = %err, "chat stream failed");
                    connection
                        .send(ChatFrame::error(format!("stream error: {err}")))
                        .await;
                    return;
                }
            }
        }
    }
}
