//! Transport layer for the control plane channel
//!
//! A [`Transport`] opens one physical connection and reports everything that
//! happens on it through a [`ConnectionEvents`] sink. The channel core only
//! ever sees connections as [`ConnectionHandle`]s and never touches sockets.

use crate::error::ConnectFailure;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub mod websocket;

/// Identity of one physical connection, unique for the process lifetime
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh connection id
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Shared reference to one live connection
pub type ConnectionHandle = Arc<dyn Connection>;

/// Lifecycle of a physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Open => 1,
            ConnectionState::Closing => 2,
            ConnectionState::Closed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Lock-free cell holding a [`ConnectionState`]
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Move from `Open` or `Connecting` to `Closing`; false if already closing
    pub fn begin_closing(&self) -> bool {
        let closing = ConnectionState::Closing.as_u8();
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < closing).then_some(closing)
            })
            .is_ok()
    }
}

/// Why a connection closed, derived from the websocket close code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// 1000
    Normal,
    /// 1001
    Away,
    /// 1002, the control plane rejected the handshake or a frame
    ProtocolError,
    /// 1006, the socket dropped without a close frame
    Abnormal,
    Other(u16),
}

impl CloseReason {
    pub fn from_code(code: u16) -> Self {
        match code {
            1000 => CloseReason::Normal,
            1001 => CloseReason::Away,
            1002 => CloseReason::ProtocolError,
            1006 => CloseReason::Abnormal,
            other => CloseReason::Other(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::Away => 1001,
            CloseReason::ProtocolError => 1002,
            CloseReason::Abnormal => 1006,
            CloseReason::Other(code) => *code,
        }
    }

    /// Normal and going-away closures are deliberate and never reconnect
    pub fn triggers_reconnect(&self) -> bool {
        !matches!(self, CloseReason::Normal | CloseReason::Away)
    }

    /// Failure reported to a connect attempt that ended with this closure
    pub fn connect_failure(&self) -> ConnectFailure {
        match self {
            CloseReason::ProtocolError => ConnectFailure::Forbidden,
            CloseReason::Abnormal => ConnectFailure::Timeout,
            _ => ConnectFailure::Failed,
        }
    }
}

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Handshake rejected with HTTP status {status}")]
    Rejected { status: u16 },
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Serialization error")]
    Serialization(#[source] serde_json::Error),
}

impl TransportError {
    /// Errors that only restate that the socket is going away
    pub fn is_closing_noise(&self) -> bool {
        matches!(self, TransportError::ConnectionClosed)
    }
}

/// One physical connection
#[async_trait::async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    fn id(&self) -> ConnectionId;

    fn state(&self) -> ConnectionState;

    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Write one text frame
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Start a normal closure. Never fails; errors are logged.
    async fn close(&self);
}

/// Callbacks fired by a transport for one connection
#[async_trait::async_trait]
pub trait ConnectionEvents: Send + Sync {
    fn on_open(&self, id: ConnectionId);

    /// Fired exactly once per connection, including failed handshakes
    fn on_close(&self, id: ConnectionId, reason: CloseReason);

    fn on_error(&self, id: ConnectionId, error: &TransportError);

    /// Text frame received; pings never reach this callback
    async fn on_message(&self, id: ConnectionId, text: String);
}

/// Opens physical connections
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Perform the handshake. Dropping the returned future abandons the attempt.
    async fn open(
        &self,
        id: ConnectionId,
        url: &Url,
        events: Arc<dyn ConnectionEvents>,
    ) -> Result<ConnectionHandle, TransportError>;
}
