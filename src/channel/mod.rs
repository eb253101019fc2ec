//! Self-healing channel to the control plane
//!
//! # Architecture
//!
//! - [`backoff`] - Pure delay schedule between attempts
//! - [`guard`] - The one slot holding the current connection and cancel flag
//! - [`connector`] - One bounded connection attempt
//! - [`orchestrator`] - Single-flight retry loop
//! - [`reconnect`] - Close-callback driven reconnects
//! - [`gate`] - Wait-for-ready for senders
//! - [`sender`] - Outbound serialization and writes
//! - [`dispatcher`] - Inbound routing to the handler capability
//!
//! # Usage
//!
//! ```rust,no_run
//! use gamehost_channel::channel::{Channel, ConnectionParameters};
//! use gamehost_channel::config::ChannelConfig;
//! use gamehost_channel::protocol::ClientMessage;
//! use gamehost_channel::testing::RecordingHandler;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = ChannelConfig::load_from_file(std::path::Path::new("channel.toml"))?;
//! let channel = Channel::websocket(&config, Arc::new(RecordingHandler::default()));
//!
//! channel.connect(config.connection_parameters()?).await?;
//! channel.send_message(&ClientMessage::heartbeat(true)).await?;
//! channel.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod backoff;
pub mod connector;
pub mod dispatcher;
pub mod gate;
pub mod guard;
pub mod orchestrator;
pub mod params;
pub mod reconnect;
pub mod sender;

pub use backoff::BackoffPolicy;
pub use connector::{Connector, ConnectorSettings, TransportConnector};
pub use dispatcher::{DispatchOutcome, MessageDispatcher};
pub use guard::ConnectionGuard;
pub use orchestrator::{AttemptOutcome, AttemptRecord};
pub use params::{ConnectionParameters, ParameterStore};

use crate::config::ChannelConfig;
use crate::error::ChannelResult;
use crate::handler::ServerMessageHandler;
use crate::observability::metrics::metrics;
use crate::transport::websocket::WebSocketTransport;
use crate::transport::{
    CloseReason, ConnectionEvents, ConnectionHandle, ConnectionId, ConnectionState,
    TransportError,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn, Instrument};

/// Retry orchestration budget
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_connect_retries: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_connect_retries: 7,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Polling budget of the wait-for-ready gate
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyGateSettings {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for ReadyGateSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_polls: 155,
        }
    }
}

/// How long `disconnect` waits for the old handle to report closed
#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectSettings {
    pub wait_retries: u32,
    pub wait_interval: Duration,
}

impl Default for DisconnectSettings {
    fn default() -> Self {
        Self {
            wait_retries: 5,
            wait_interval: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelSettings {
    pub retry: RetrySettings,
    pub ready: ReadyGateSettings,
    pub disconnect: DisconnectSettings,
}

/// State shared by the public handle, callbacks and background tasks
pub(crate) struct ChannelInner {
    pub(crate) settings: ChannelSettings,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) guard: ConnectionGuard,
    /// Held for the whole of one retry sequence
    pub(crate) orchestration: Arc<Mutex<()>>,
    pub(crate) params: Arc<ParameterStore>,
    pub(crate) dispatcher: MessageDispatcher,
    pub(crate) events: Arc<dyn ConnectionEvents>,
}

impl ChannelInner {
    /// Drop the current handle, close it, and wait (bounded) for it to close
    pub(crate) async fn teardown(&self) {
        self.guard.request_cancel();
        metrics().set_connected(false);

        let Some(handle) = self.guard.clear() else {
            return;
        };
        handle.close().await;

        for _ in 0..self.settings.disconnect.wait_retries {
            if handle.state() == ConnectionState::Closed {
                break;
            }
            tokio::time::sleep(self.settings.disconnect.wait_interval).await;
        }
        debug!(
            connection_id = handle.id(),
            state = ?handle.state(),
            "Connection torn down"
        );
    }
}

/// Close a superseded handle without blocking the caller
pub(crate) fn close_in_background(handle: ConnectionHandle) {
    tokio::spawn(async move {
        debug!(connection_id = handle.id(), "Closing superseded connection");
        handle.close().await;
    });
}

/// Event sink for every connection this channel opens
struct ChannelEvents {
    inner: Weak<ChannelInner>,
}

#[async_trait]
impl ConnectionEvents for ChannelEvents {
    fn on_open(&self, id: ConnectionId) {
        info!(connection_id = id, "Connection opened");
    }

    fn on_close(&self, id: ConnectionId, reason: CloseReason) {
        info!(connection_id = id, close_code = reason.code(), "Connection closed");
        if let Some(inner) = self.inner.upgrade() {
            if inner.guard.is_current(id) {
                metrics().set_connected(false);
            }
            reconnect::on_connection_closed(&inner, id, reason);
        }
    }

    fn on_error(&self, id: ConnectionId, error: &TransportError) {
        if error.is_closing_noise() {
            debug!(connection_id = id, error = %error, "Connection error while closing");
        } else {
            warn!(connection_id = id, error = %error, "Connection error");
        }
    }

    async fn on_message(&self, id: ConnectionId, text: String) {
        if let Some(inner) = self.inner.upgrade() {
            inner.dispatcher.dispatch(&text).await;
        } else {
            debug!(connection_id = id, "Channel dropped, ignoring message");
        }
    }
}

/// Public handle to the channel; cheap to clone and share across tasks
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Build a channel around any connector
    pub fn new(
        settings: ChannelSettings,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn ServerMessageHandler>,
    ) -> Self {
        let params = Arc::new(ParameterStore::new());
        let inner = Arc::new_cyclic(|weak: &Weak<ChannelInner>| ChannelInner {
            settings,
            connector,
            guard: ConnectionGuard::new(),
            orchestration: Arc::new(Mutex::new(())),
            params: params.clone(),
            dispatcher: MessageDispatcher::new(handler, params),
            events: Arc::new(ChannelEvents {
                inner: weak.clone(),
            }),
        });
        Self { inner }
    }

    /// Build a websocket channel from configuration
    pub fn websocket(config: &ChannelConfig, handler: Arc<dyn ServerMessageHandler>) -> Self {
        let transport = WebSocketTransport::new(config.close_frame_timeout());
        let connector = TransportConnector::new(transport, config.connector_settings());
        Self::new(config.channel_settings(), Arc::new(connector), handler)
    }

    /// Establish the channel, retrying with backoff
    ///
    /// On exhaustion the channel is left disconnected with automatic
    /// reconnects cancelled.
    pub async fn connect(&self, params: ConnectionParameters) -> ChannelResult<()> {
        info!(
            endpoint = %params.endpoint,
            process_id = %params.process_id,
            fleet_id = %params.fleet_id,
            "Connecting to control plane"
        );
        let inner = &self.inner;
        async move {
            // Re-arm only once any running sequence has finished its own teardown
            let lock = inner.orchestration.clone().lock_owned().await;
            inner.params.set(params);
            inner.guard.reset();
            orchestrator::run_locked(inner, lock).await
        }
        .instrument(crate::lifecycle_span!(phase = "connect"))
        .await?;
        Ok(())
    }

    /// Tear down the channel and stop any retry loop in flight
    pub async fn disconnect(&self) -> ChannelResult<()> {
        info!("Disconnecting from control plane");
        self.inner
            .teardown()
            .instrument(crate::lifecycle_span!(phase = "disconnect"))
            .await;
        Ok(())
    }

    /// Serialize and write a message, waiting (bounded) for a connection
    pub async fn send_message<M: Serialize + Sync + ?Sized>(&self, message: &M) -> ChannelResult<()> {
        sender::send(&self.inner, message).await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.guard.current_if_open().is_some()
    }

    /// Block until a connection is open or the gate's budget runs out
    pub async fn wait_for_connected(&self) -> bool {
        gate::wait_for_connected(&self.inner).await.is_some()
    }

    /// Parameters the next connection attempt will use
    pub fn connection_parameters(&self) -> Option<ConnectionParameters> {
        self.inner.params.snapshot()
    }

    /// The current connection, if any
    pub fn current_connection(&self) -> Option<ConnectionHandle> {
        self.inner.guard.current()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("guard", &self.inner.guard)
            .field("settings", &self.inner.settings)
            .finish()
    }
}
