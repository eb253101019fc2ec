//! Outbound sender

use super::{gate, ChannelInner};
use crate::error::{ChannelError, ChannelResult};
use crate::observability::metrics::metrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Serialize `message` and write it to the current connection
///
/// Never retries: a missing connection or a failed write is returned to the
/// caller as `ServiceCallFailed`.
pub(crate) async fn send<M: Serialize + Sync + ?Sized>(
    inner: &Arc<ChannelInner>,
    message: &M,
) -> ChannelResult<()> {
    let Some(handle) = gate::wait_for_connected(inner).await else {
        metrics().send_failed();
        return Err(ChannelError::service_call_failed(
            "no open connection to the control plane",
        ));
    };

    let payload = serde_json::to_string(message).map_err(|e| {
        metrics().send_failed();
        ChannelError::service_call_failed(format!("failed to serialize message: {e}"))
    })?;

    match handle.send_text(payload).await {
        Ok(()) => {
            metrics().message_sent();
            debug!(connection_id = handle.id(), "Message sent");
            Ok(())
        }
        Err(e) => {
            metrics().send_failed();
            warn!(connection_id = handle.id(), error = %e, "Failed to send message");
            Err(ChannelError::service_call_failed(e.to_string()))
        }
    }
}
