//! Pure conversions between tungstenite values and transport types

use crate::error::sanitize_error_message;
use crate::transport::{CloseReason, TransportError};
use std::borrow::Cow;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Close code reported when a close frame carries no status
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Map a received close frame to a close reason
pub fn close_reason_from_frame(frame: Option<&CloseFrame<'_>>) -> CloseReason {
    frame
        .map(|frame| CloseReason::from_code(u16::from(frame.code)))
        .unwrap_or(CloseReason::Other(NO_STATUS_RECEIVED))
}

/// Map a failed handshake to the error returned and the close reason reported
///
/// Any non-101 HTTP answer is a protocol-level rejection; everything else
/// means the socket never came up.
pub fn handshake_failure(error: &WsError) -> (TransportError, CloseReason) {
    match error {
        WsError::Http(response) => (
            TransportError::Rejected {
                status: response.status().as_u16(),
            },
            CloseReason::ProtocolError,
        ),
        WsError::Url(e) => (
            TransportError::InvalidEndpoint(e.to_string()),
            CloseReason::Abnormal,
        ),
        other => (
            TransportError::Handshake(sanitize_error_message(&other.to_string())),
            CloseReason::Abnormal,
        ),
    }
}

/// Map a read or write error on an established connection
pub fn map_ws_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
        other => TransportError::Send(sanitize_error_message(&other.to_string())),
    }
}

/// Close frame sent when this side ends a connection on purpose
pub fn normal_close_frame() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: Cow::Borrowed(""),
    }))
}
