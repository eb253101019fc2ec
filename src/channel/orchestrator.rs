//! Single-flight retry loop
//!
//! Every path that wants a connection (explicit connect, close-triggered
//! reconnect, the wait-for-ready gate) funnels through here. The
//! orchestration lock is held for the whole sequence so competing triggers
//! queue up and then short-circuit on the already open handle.

use super::{close_in_background, ChannelInner};
use crate::error::ConnectFailure;
use crate::observability::metrics::metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

/// Result of one attempt inside an orchestration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure(ConnectFailure),
}

/// Ephemeral record of one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub index: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub delay_before_next: Option<Duration>,
}

/// Run a retry sequence, waiting for any sequence already in flight
pub(crate) async fn connect_with_retries(inner: &Arc<ChannelInner>) -> Result<(), ConnectFailure> {
    let lock = inner.orchestration.clone().lock_owned().await;
    run_locked(inner, lock).await
}

/// Run a retry sequence with the orchestration lock already taken
pub(crate) async fn run_locked(
    inner: &Arc<ChannelInner>,
    _lock: OwnedMutexGuard<()>,
) -> Result<(), ConnectFailure> {
    let max_retries = inner.settings.retry.max_connect_retries;
    let backoff = inner.settings.retry.backoff;
    let mut records: Vec<AttemptRecord> = Vec::new();
    let mut last_failure = ConnectFailure::Failed;

    for attempt in 0..=max_retries {
        if inner.guard.is_cancelled() {
            info!(attempt, "Connection cancelled, stopping retries");
            return Err(last_failure);
        }

        if inner.guard.current_if_open().is_some() {
            debug!(attempt, "Already connected");
            return Ok(());
        }

        let Some(params) = inner.params.snapshot() else {
            warn!("No connection parameters set, nothing to connect to");
            return Err(ConnectFailure::Failed);
        };

        let started_at = Utc::now();
        match inner
            .connector
            .attempt_connect(&params, inner.events.clone())
            .await
        {
            Ok(handle) => {
                records.push(AttemptRecord {
                    index: attempt,
                    started_at,
                    outcome: AttemptOutcome::Success,
                    delay_before_next: None,
                });

                let connection_id = handle.id();
                match inner.guard.install_unless_cancelled(handle) {
                    Ok(previous) => {
                        if let Some(previous) = previous {
                            close_in_background(previous);
                        }
                    }
                    Err(fresh) => {
                        info!(connection_id, "Connection cancelled during handshake, closing");
                        close_in_background(fresh);
                        debug!(history = ?records, "Connection attempts");
                        return Err(last_failure);
                    }
                }
                metrics().set_connected(true);
                info!(
                    connection_id,
                    attempts = records.len(),
                    "Connected to control plane"
                );
                debug!(history = ?records, "Connection attempts");
                return Ok(());
            }
            Err(failure) => {
                last_failure = failure;
                let delay = backoff.delay_before_next(attempt, max_retries);
                records.push(AttemptRecord {
                    index: attempt,
                    started_at,
                    outcome: AttemptOutcome::Failure(failure),
                    delay_before_next: delay,
                });
                warn!(
                    attempt,
                    max_retries,
                    failure = %failure,
                    delay_secs = delay.map(|d| d.as_secs()),
                    "Connection attempt failed"
                );

                if let Some(delay) = delay {
                    if !inner.guard.sleep_unless_cancelled(delay).await {
                        info!(attempt, "Connection cancelled during backoff");
                        return Err(last_failure);
                    }
                }
            }
        }
    }

    error!(
        attempts = records.len(),
        failure = %last_failure,
        "Giving up on control plane connection"
    );
    debug!(history = ?records, "Connection attempts");
    metrics().orchestration_exhausted();
    inner.teardown().await;
    Err(last_failure)
}
