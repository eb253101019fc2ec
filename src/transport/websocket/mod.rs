//! Websocket transport built on tokio-tungstenite
//!
//! - [`connection`] - Pure mapping between tungstenite types and channel types
//! - [`client`] - Impure I/O: handshake, reader task, frame writes

pub mod client;
pub mod connection;

pub use client::{WebSocketConnection, WebSocketTransport};
