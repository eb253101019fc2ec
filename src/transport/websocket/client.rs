//! Impure I/O operations for the websocket transport
//!
//! Each open connection owns a write half behind an async mutex and a reader
//! task that feeds frames and the final close into the [`ConnectionEvents`]
//! sink handed over at handshake time.

use super::connection::{close_reason_from_frame, handshake_failure, map_ws_error, normal_close_frame};
use crate::transport::{
    CloseReason, Connection, ConnectionEvents, ConnectionHandle, ConnectionId, ConnectionState,
    StateCell, Transport, TransportError,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens websocket connections to the control plane
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    close_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(close_timeout: Duration) -> Self {
        Self { close_timeout }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        id: ConnectionId,
        url: &Url,
        events: Arc<dyn ConnectionEvents>,
    ) -> Result<ConnectionHandle, TransportError> {
        debug!(connection_id = id, host = ?url.host_str(), "Opening websocket connection");

        let (stream, _response) = match connect_async(url.as_str()).await {
            Ok(pair) => pair,
            Err(e) => {
                let (error, reason) = handshake_failure(&e);
                events.on_error(id, &error);
                events.on_close(id, reason);
                return Err(error);
            }
        };

        let (sink, stream) = stream.split();
        let state = Arc::new(StateCell::new(ConnectionState::Open));
        events.on_open(id);

        let reader = tokio::spawn(read_loop(id, stream, state.clone(), events));

        Ok(Arc::new(WebSocketConnection {
            id,
            state,
            sink: Mutex::new(sink),
            reader,
            close_timeout: self.close_timeout,
        }))
    }
}

/// Read frames until the socket ends, then report the close exactly once
async fn read_loop(
    id: ConnectionId,
    mut stream: SplitStream<WsStream>,
    state: Arc<StateCell>,
    events: Arc<dyn ConnectionEvents>,
) {
    let mut close_reason = None;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => events.on_message(id, text).await,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => events.on_message(id, text).await,
                Err(_) => warn!(connection_id = id, "Dropping non UTF-8 binary frame"),
            },
            // tungstenite queues the pong itself
            Ok(Message::Ping(_)) => trace!(connection_id = id, "Ping acknowledged"),
            Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                // Keep reading so the close handshake reply gets flushed
                close_reason = Some(close_reason_from_frame(frame.as_ref()));
            }
            Err(e) => {
                let error = map_ws_error(e);
                if close_reason.is_none() {
                    events.on_error(id, &error);
                }
                break;
            }
        }
    }

    state.set(ConnectionState::Closed);
    events.on_close(id, close_reason.unwrap_or(CloseReason::Abnormal));
}

/// One open websocket connection
pub struct WebSocketConnection {
    id: ConnectionId,
    state: Arc<StateCell>,
    sink: Mutex<SplitSink<WsStream, Message>>,
    reader: JoinHandle<()>,
    close_timeout: Duration,
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}

impl WebSocketConnection {
    fn force_closed(&self) {
        self.state.set(ConnectionState::Closed);
        self.reader.abort();
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text)).await.map_err(map_ws_error)
    }

    async fn close(&self) {
        if !self.state.begin_closing() {
            return;
        }
        debug!(connection_id = self.id, "Closing websocket connection");

        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.close_timeout, sink.send(normal_close_frame())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(connection_id = self.id, error = %map_ws_error(e), "Close frame not delivered");
                self.force_closed();
            }
            Err(_) => {
                warn!(connection_id = self.id, "Timed out sending close frame");
                self.force_closed();
            }
        }
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
