//! Connector: one bounded connection attempt
//!
//! The handshake is raced against a deadline; dropping the transport future
//! abandons the socket. When the transport fails, the close callback carries
//! the precise failure reason through a one-shot signal.

use super::params::ConnectionParameters;
use crate::config::SdkSection;
use crate::error::ConnectFailure;
use crate::observability::metrics::metrics;
use crate::transport::{
    next_connection_id, CloseReason, ConnectionEvents, ConnectionHandle, ConnectionId, Transport,
    TransportError,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn, Instrument};

/// Performs a single connection attempt
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection whose callbacks are delivered to `events`
    async fn attempt_connect(
        &self,
        params: &ConnectionParameters,
        events: Arc<dyn ConnectionEvents>,
    ) -> Result<ConnectionHandle, ConnectFailure>;
}

/// Timing and metadata for each attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorSettings {
    /// Upper bound on the handshake
    pub connect_timeout: Duration,
    /// How long a failed attempt waits for its close reason
    pub close_signal_timeout: Duration,
    pub sdk: SdkSection,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(2000),
            close_signal_timeout: Duration::from_millis(1000),
            sdk: SdkSection::default(),
        }
    }
}

/// Connector driving any [`Transport`]
pub struct TransportConnector<T> {
    transport: T,
    settings: ConnectorSettings,
}

impl<T: Transport> TransportConnector<T> {
    pub fn new(transport: T, settings: ConnectorSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    async fn await_close_reason(
        &self,
        id: ConnectionId,
        signal: oneshot::Receiver<CloseReason>,
    ) -> ConnectFailure {
        match tokio::time::timeout(self.settings.close_signal_timeout, signal).await {
            Ok(Ok(reason)) => {
                debug!(connection_id = id, close_code = reason.code(), "Attempt closed");
                reason.connect_failure()
            }
            _ => ConnectFailure::Failed,
        }
    }
}

#[async_trait]
impl<T: Transport> Connector for TransportConnector<T> {
    async fn attempt_connect(
        &self,
        params: &ConnectionParameters,
        events: Arc<dyn ConnectionEvents>,
    ) -> Result<ConnectionHandle, ConnectFailure> {
        let id = next_connection_id();
        metrics().connection_attempt();

        let url = match params.connect_url(&self.settings.sdk) {
            Ok(url) => url,
            Err(e) => {
                warn!(connection_id = id, error = %e, "Cannot build handshake URI");
                metrics().connection_failed();
                return Err(ConnectFailure::Failed);
            }
        };

        let (signal_tx, signal_rx) = oneshot::channel();
        let attempt_events: Arc<dyn ConnectionEvents> = Arc::new(AttemptEvents::new(signal_tx, events));

        let opened = tokio::time::timeout(
            self.settings.connect_timeout,
            self.transport.open(id, &url, attempt_events),
        )
        .instrument(crate::connection_span!(connection_id = id, endpoint = %params.endpoint))
        .await;

        let failure = match opened {
            Err(_) => {
                warn!(
                    connection_id = id,
                    timeout_ms = self.settings.connect_timeout.as_millis() as u64,
                    "Handshake timed out, abandoning attempt"
                );
                ConnectFailure::Failed
            }
            Ok(Ok(handle)) if handle.is_open() => {
                info!(connection_id = id, "Connection established");
                metrics().connection_established();
                return Ok(handle);
            }
            Ok(Ok(handle)) => {
                let failure = self.await_close_reason(id, signal_rx).await;
                handle.close().await;
                failure
            }
            Ok(Err(e)) => {
                debug!(connection_id = id, error = %e, "Handshake failed");
                self.await_close_reason(id, signal_rx).await
            }
        };

        metrics().connection_failed();
        Err(failure)
    }
}

/// Per-attempt wrapper that resolves the close signal before forwarding
struct AttemptEvents {
    signal: Mutex<Option<oneshot::Sender<CloseReason>>>,
    downstream: Arc<dyn ConnectionEvents>,
}

impl AttemptEvents {
    fn new(signal: oneshot::Sender<CloseReason>, downstream: Arc<dyn ConnectionEvents>) -> Self {
        Self {
            signal: Mutex::new(Some(signal)),
            downstream,
        }
    }
}

#[async_trait]
impl ConnectionEvents for AttemptEvents {
    fn on_open(&self, id: ConnectionId) {
        self.downstream.on_open(id);
    }

    fn on_close(&self, id: ConnectionId, reason: CloseReason) {
        let sender = self
            .signal
            .lock()
            .map(|mut signal| signal.take())
            .unwrap_or_default();
        if let Some(sender) = sender {
            let _ = sender.send(reason);
        }
        self.downstream.on_close(id, reason);
    }

    fn on_error(&self, id: ConnectionId, error: &TransportError) {
        self.downstream.on_error(id, error);
    }

    async fn on_message(&self, id: ConnectionId, text: String) {
        self.downstream.on_message(id, text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, RecordingEvents, TransportScript};

    fn params() -> ConnectionParameters {
        ConnectionParameters {
            endpoint: "wss://control.example.com".to_string(),
            process_id: "proc-1".to_string(),
            host_id: "host-1".to_string(),
            fleet_id: "fleet-1".to_string(),
            auth_token: "token".to_string(),
        }
    }

    fn connector(script: TransportScript) -> TransportConnector<MockTransport> {
        TransportConnector::new(MockTransport::new(script), ConnectorSettings::default())
    }

    #[tokio::test]
    async fn test_successful_attempt_returns_open_handle() {
        let connector = connector(TransportScript::Open);
        let events = Arc::new(RecordingEvents::default());

        let handle = connector
            .attempt_connect(&params(), events.clone())
            .await
            .unwrap();

        assert!(handle.is_open());
        assert_eq!(events.opened(), vec![handle.id()]);
    }

    #[tokio::test]
    async fn test_protocol_error_maps_to_forbidden() {
        let connector = connector(TransportScript::Reject(CloseReason::ProtocolError));
        let events = Arc::new(RecordingEvents::default());

        let result = connector.attempt_connect(&params(), events.clone()).await;

        assert_eq!(result.unwrap_err(), ConnectFailure::Forbidden);
        assert_eq!(events.closed().len(), 1);
        assert_eq!(events.closed()[0].1, CloseReason::ProtocolError);
    }

    #[tokio::test]
    async fn test_abnormal_close_maps_to_timeout_failure() {
        let connector = connector(TransportScript::Reject(CloseReason::Abnormal));
        let events = Arc::new(RecordingEvents::default());

        let result = connector.attempt_connect(&params(), events).await;
        assert_eq!(result.unwrap_err(), ConnectFailure::Timeout);
    }

    #[tokio::test]
    async fn test_failure_without_close_signal_is_generic() {
        let connector = connector(TransportScript::FailSilently);
        let events = Arc::new(RecordingEvents::default());

        let result = connector.attempt_connect(&params(), events).await;
        assert_eq!(result.unwrap_err(), ConnectFailure::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_handshake_is_abandoned() {
        let connector = connector(TransportScript::Hang);
        let events = Arc::new(RecordingEvents::default());

        let started = tokio::time::Instant::now();
        let result = connector.attempt_connect(&params(), events).await;

        assert_eq!(result.unwrap_err(), ConnectFailure::Failed);
        assert!(started.elapsed() >= Duration::from_millis(2000));
        assert!(started.elapsed() < Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_handshake_uri_carries_token() {
        let transport = MockTransport::new(TransportScript::Open);
        let urls = transport.urls();
        let connector = TransportConnector::new(transport, ConnectorSettings::default());

        connector
            .attempt_connect(&params(), Arc::new(RecordingEvents::default()))
            .await
            .unwrap();

        let urls = urls.lock().unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].as_str().contains("Authorization=token"));
        assert!(urls[0].as_str().contains("FleetId=fleet-1"));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_fails_without_opening() {
        let transport = MockTransport::new(TransportScript::Open);
        let urls = transport.urls();
        let connector = TransportConnector::new(transport, ConnectorSettings::default());
        let mut bad = params();
        bad.endpoint = "::nope::".to_string();

        let result = connector
            .attempt_connect(&bad, Arc::new(RecordingEvents::default()))
            .await;

        assert_eq!(result.unwrap_err(), ConnectFailure::Failed);
        assert!(urls.lock().unwrap().is_empty());
    }
}
