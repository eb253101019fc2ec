//! Close-triggered reconnects
//!
//! Runs inside the transport's close callback, so it only decides and
//! spawns. The retry loop itself always runs on its own task.

use super::{orchestrator, ChannelInner};
use crate::observability::metrics::metrics;
use crate::transport::{CloseReason, ConnectionId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// React to a closed connection; returns true when a reconnect was scheduled
pub(crate) fn on_connection_closed(
    inner: &Arc<ChannelInner>,
    id: ConnectionId,
    reason: CloseReason,
) -> bool {
    if !reason.triggers_reconnect() {
        debug!(connection_id = id, close_code = reason.code(), "Deliberate closure, not reconnecting");
        return false;
    }

    // Cancel flag and staleness are checked together under the guard lock
    if !inner.guard.should_reconnect(id) {
        debug!(connection_id = id, "Closed connection is stale or cancelled, not reconnecting");
        return false;
    }

    info!(connection_id = id, close_code = reason.code(), "Unexpected closure, scheduling reconnect");
    metrics().reconnect_triggered();

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        if let Err(failure) = orchestrator::connect_with_retries(&inner).await {
            warn!(connection_id = id, failure = %failure, "Reconnect failed");
        }
    });
    true
}
