//! Game Host Channel - Rust Implementation
//!
//! A self-healing websocket channel between a game-hosting server process and
//! its fleet control plane.
//!
//! # Overview
//!
//! This crate provides:
//! - A [`Channel`] that connects with bounded exponential backoff and
//!   reconnects by itself when the socket drops abnormally
//! - Outbound sends that wait (bounded) for a usable connection
//! - Inbound routing of control plane messages to a [`ServerMessageHandler`]
//! - A tokio-tungstenite websocket transport behind the [`transport::Transport`] seam
//!
//! # Quick Start
//!
//! ```rust
//! use gamehost_channel::protocol::{ClientMessage, InboundEnvelope};
//!
//! // Outbound messages carry their action and a fresh request id
//! let heartbeat = ClientMessage::heartbeat(true);
//! let json = serde_json::to_string(&heartbeat).unwrap();
//! assert!(json.contains("\"Action\":\"HeartbeatServerProcess\""));
//!
//! // Inbound frames are parsed into an envelope before routing
//! let envelope = InboundEnvelope::parse(r#"{"Action":"TerminateProcess","TerminationTime":0}"#).unwrap();
//! assert_eq!(envelope.action, "TerminateProcess");
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

// Re-export commonly used types
pub use channel::{Channel, ChannelSettings, ConnectionParameters};
pub use config::{ChannelConfig, ConfigError};
pub use error::{ChannelError, ChannelResult, ConnectFailure};
pub use handler::ServerMessageHandler;
pub use protocol::{ClientMessage, InboundEnvelope};
