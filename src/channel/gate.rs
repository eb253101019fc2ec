//! Wait-for-ready gate used by senders

use super::{orchestrator, ChannelInner};
use crate::transport::ConnectionHandle;
use std::sync::Arc;
use tracing::{debug, warn};

/// Return an open handle, kicking off a reconnect and polling if needed
///
/// Returns `None` once cancelled or after the polling budget is spent. No
/// lock is held across the poll sleeps.
pub(crate) async fn wait_for_connected(inner: &Arc<ChannelInner>) -> Option<ConnectionHandle> {
    if let Some(handle) = inner.guard.current_if_open() {
        return Some(handle);
    }

    if inner.guard.is_cancelled() {
        debug!("Channel is cancelled, not waiting for a connection");
        return None;
    }
    if !inner.params.is_configured() {
        debug!("Channel was never connected, not waiting for a connection");
        return None;
    }

    trigger_reconnect(inner);

    let settings = &inner.settings.ready;
    for poll in 0..settings.max_polls {
        if !inner.guard.sleep_unless_cancelled(settings.poll_interval).await {
            debug!(poll, "Cancelled while waiting for a connection");
            return None;
        }
        if let Some(handle) = inner.guard.current_if_open() {
            debug!(poll, connection_id = handle.id(), "Connection ready");
            return Some(handle);
        }
    }

    warn!(polls = settings.max_polls, "Timed out waiting for a connection");
    None
}

/// Start an orchestration unless one is already running
fn trigger_reconnect(inner: &Arc<ChannelInner>) {
    match inner.orchestration.clone().try_lock_owned() {
        Ok(lock) => {
            debug!("No connection, starting reconnect");
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                if let Err(failure) = orchestrator::run_locked(&inner, lock).await {
                    debug!(failure = %failure, "Reconnect from wait-for-ready failed");
                }
            });
        }
        Err(_) => debug!("Reconnect already in progress"),
    }
}
