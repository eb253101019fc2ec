//! Mock implementations for testing
//!
//! Provides mock connections, connectors, transports and a recording handler
//! so the channel can be exercised without a control plane.

use crate::channel::{ConnectionParameters, Connector};
use crate::error::ConnectFailure;
use crate::handler::ServerMessageHandler;
use crate::protocol::{
    DescribePlayerSessionsResponse, GameSession, GetComputeCertificateResponse,
    GetFleetRoleCredentialsResponse, RefreshConnection, StartMatchBackfillResponse,
    TerminateProcess, UpdateGameSession,
};
use crate::transport::{
    next_connection_id, CloseReason, Connection, ConnectionEvents, ConnectionHandle,
    ConnectionId, ConnectionState, StateCell, Transport, TransportError,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use url::Url;

/// Maps an outbound frame to an optional inbound reply
pub type Responder = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// In-memory connection recording every frame written to it
pub struct MockConnection {
    id: ConnectionId,
    state: StateCell,
    sent: Mutex<Vec<String>>,
    events: Option<Arc<dyn ConnectionEvents>>,
    responder: Option<Responder>,
    close_reported: AtomicBool,
    fail_sends: AtomicBool,
    close_calls: AtomicUsize,
}

impl MockConnection {
    fn build(
        id: ConnectionId,
        events: Option<Arc<dyn ConnectionEvents>>,
        responder: Option<Responder>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: StateCell::new(ConnectionState::Open),
            sent: Mutex::new(Vec::new()),
            events,
            responder,
            close_reported: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        })
    }

    /// Open connection not wired to any event sink
    pub fn open() -> Arc<Self> {
        Self::build(next_connection_id(), None, None)
    }

    /// Open connection reporting closes and replies to `events`
    pub fn with_events(id: ConnectionId, events: Arc<dyn ConnectionEvents>) -> Arc<Self> {
        Self::build(id, Some(events), None)
    }

    /// Open connection that answers each sent frame through `responder`
    pub fn loopback(
        id: ConnectionId,
        events: Arc<dyn ConnectionEvents>,
        responder: Responder,
    ) -> Arc<Self> {
        Self::build(id, Some(events), Some(responder))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.set(state);
    }

    /// Make subsequent sends fail
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Drop the connection as if the peer went away
    pub fn simulate_close(&self, reason: CloseReason) {
        self.state.set(ConnectionState::Closed);
        self.report_close(reason);
    }

    /// Push an inbound frame through the event sink
    pub async fn deliver(&self, text: &str) {
        if let Some(events) = &self.events {
            events.on_message(self.id, text.to_string()).await;
        }
    }

    fn report_close(&self, reason: CloseReason) {
        if self.close_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(events) = &self.events {
            events.on_close(self.id, reason);
        }
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .finish()
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("mock send failure".to_string()));
        }

        let reply = self.responder.as_ref().and_then(|respond| respond(&text));
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text);
        }

        if let (Some(reply), Some(events)) = (reply, self.events.clone()) {
            let id = self.id;
            tokio::spawn(async move {
                events.on_message(id, reply).await;
            });
        }
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.begin_closing() {
            self.state.set(ConnectionState::Closed);
            self.report_close(CloseReason::Normal);
        }
    }
}

/// Scripted outcome of one mock connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectScript {
    Succeed,
    Fail(ConnectFailure),
}

/// Connector that follows a script and records what it was asked to do
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectScript>>,
    fallback: ConnectScript,
    latency: Duration,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempt_times: Mutex<Vec<Instant>>,
    seen_params: Mutex<Vec<ConnectionParameters>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnector {
    /// Play `script` in order, then repeat `fallback` forever
    pub fn scripted(script: Vec<ConnectScript>, fallback: ConnectScript) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            latency: Duration::ZERO,
            attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            attempt_times: Mutex::new(Vec::new()),
            seen_params: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn always_succeed() -> Self {
        Self::scripted(Vec::new(), ConnectScript::Succeed)
    }

    pub fn always_fail(failure: ConnectFailure) -> Self {
        Self::scripted(Vec::new(), ConnectScript::Fail(failure))
    }

    /// Fail `failures` times, then succeed
    pub fn succeed_after(failures: usize) -> Self {
        Self::scripted(
            vec![ConnectScript::Fail(ConnectFailure::Failed); failures],
            ConnectScript::Succeed,
        )
    }

    /// Simulated handshake duration
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Highest number of attempts observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times
            .lock()
            .map(|times| times.clone())
            .unwrap_or_default()
    }

    pub fn seen_params(&self) -> Vec<ConnectionParameters> {
        self.seen_params
            .lock()
            .map(|params| params.clone())
            .unwrap_or_default()
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections
            .lock()
            .map(|connections| connections.clone())
            .unwrap_or_default()
    }

    pub fn last_connection(&self) -> Option<Arc<MockConnection>> {
        self.connections().pop()
    }

    fn next_outcome(&self) -> ConnectScript {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(self.fallback)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn attempt_connect(
        &self,
        params: &ConnectionParameters,
        events: Arc<dyn ConnectionEvents>,
    ) -> Result<ConnectionHandle, ConnectFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if let Ok(mut times) = self.attempt_times.lock() {
            times.push(Instant::now());
        }
        if let Ok(mut seen) = self.seen_params.lock() {
            seen.push(params.clone());
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = match self.next_outcome() {
            ConnectScript::Succeed => {
                let connection = MockConnection::with_events(next_connection_id(), events.clone());
                events.on_open(connection.id());
                if let Ok(mut connections) = self.connections.lock() {
                    connections.push(connection.clone());
                }
                let handle: ConnectionHandle = connection;
                Ok(handle)
            }
            ConnectScript::Fail(failure) => Err(failure),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Scripted behaviour of [`MockTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportScript {
    Open,
    /// Handshake fails and the close callback reports this reason
    Reject(CloseReason),
    /// Handshake fails without any close callback
    FailSilently,
    /// Handshake never completes
    Hang,
}

/// Transport that opens [`MockConnection`]s according to a script
pub struct MockTransport {
    script: TransportScript,
    urls: Arc<Mutex<Vec<Url>>>,
}

impl MockTransport {
    pub fn new(script: TransportScript) -> Self {
        Self {
            script,
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handshake URIs seen so far
    pub fn urls(&self) -> Arc<Mutex<Vec<Url>>> {
        self.urls.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        id: ConnectionId,
        url: &Url,
        events: Arc<dyn ConnectionEvents>,
    ) -> Result<ConnectionHandle, TransportError> {
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.clone());
        }

        match self.script {
            TransportScript::Open => {
                let connection: ConnectionHandle = MockConnection::with_events(id, events.clone());
                events.on_open(id);
                Ok(connection)
            }
            TransportScript::Reject(reason) => {
                let error = TransportError::Handshake(format!("rejected with {}", reason.code()));
                events.on_error(id, &error);
                events.on_close(id, reason);
                Err(error)
            }
            TransportScript::FailSilently => {
                Err(TransportError::Handshake("no response".to_string()))
            }
            TransportScript::Hang => std::future::pending().await,
        }
    }
}

/// Transport whose connections answer sent frames in-process
pub struct LoopbackTransport {
    responder: Responder,
}

impl LoopbackTransport {
    /// Echo every frame back unchanged
    pub fn echo() -> Self {
        Self::with_responder(|text| Some(text.to_string()))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(
        &self,
        id: ConnectionId,
        _url: &Url,
        events: Arc<dyn ConnectionEvents>,
    ) -> Result<ConnectionHandle, TransportError> {
        let connection: ConnectionHandle =
            MockConnection::loopback(id, events.clone(), self.responder.clone());
        events.on_open(id);
        Ok(connection)
    }
}

/// Event sink that records every callback
#[derive(Default)]
pub struct RecordingEvents {
    opened: Mutex<Vec<ConnectionId>>,
    closed: Mutex<Vec<(ConnectionId, CloseReason)>>,
    errors: Mutex<Vec<(ConnectionId, String)>>,
    messages: Mutex<Vec<(ConnectionId, String)>>,
    notify: Notify,
}

impl RecordingEvents {
    pub fn opened(&self) -> Vec<ConnectionId> {
        self.opened.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn closed(&self) -> Vec<(ConnectionId, CloseReason)> {
        self.closed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<(ConnectionId, String)> {
        self.errors.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<(ConnectionId, String)> {
        self.messages.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Wait until at least `count` messages arrived or `timeout` passed
    pub async fn wait_for_messages(&self, count: usize, timeout: Duration) -> Vec<(ConnectionId, String)> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let messages = self.messages();
            if messages.len() >= count {
                return messages;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.messages();
            }
        }
    }

    /// Wait until a close was reported or `timeout` passed
    pub async fn wait_for_close(&self, timeout: Duration) -> Option<(ConnectionId, CloseReason)> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(closed) = self.closed().first().copied() {
                return Some(closed);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.closed().first().copied();
            }
        }
    }
}

#[async_trait]
impl ConnectionEvents for RecordingEvents {
    fn on_open(&self, id: ConnectionId) {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(id);
        }
        self.notify.notify_waiters();
    }

    fn on_close(&self, id: ConnectionId, reason: CloseReason) {
        if let Ok(mut closed) = self.closed.lock() {
            closed.push((id, reason));
        }
        self.notify.notify_waiters();
    }

    fn on_error(&self, id: ConnectionId, error: &TransportError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push((id, error.to_string()));
        }
        self.notify.notify_waiters();
    }

    async fn on_message(&self, id: ConnectionId, text: String) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((id, text));
        }
        self.notify.notify_waiters();
    }
}

/// One recorded handler invocation
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerCall {
    StartGameSession(GameSession),
    UpdateGameSession(UpdateGameSession),
    TerminateProcess(TerminateProcess),
    StartMatchBackfillResponse(Option<String>, StartMatchBackfillResponse),
    DescribePlayerSessionsResponse(Option<String>, DescribePlayerSessionsResponse),
    GetComputeCertificateResponse(Option<String>, GetComputeCertificateResponse),
    GetFleetRoleCredentialsResponse(Option<String>, GetFleetRoleCredentialsResponse),
    RefreshConnection(RefreshConnection),
    ErrorResponse {
        request_id: String,
        status_code: u16,
        error_message: String,
    },
    SuccessResponse(String),
}

/// Handler that records every call it receives
#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<HandlerCall>>,
    notify: Notify,
}

impl RecordingHandler {
    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Wait until at least `count` calls were recorded or `timeout` passed
    pub async fn wait_for_calls(&self, count: usize, timeout: Duration) -> Vec<HandlerCall> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            let calls = self.calls();
            if calls.len() >= count {
                return calls;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.calls();
            }
        }
    }

    fn record(&self, call: HandlerCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl ServerMessageHandler for RecordingHandler {
    async fn on_start_game_session(&self, game_session: GameSession) {
        self.record(HandlerCall::StartGameSession(game_session));
    }

    async fn on_update_game_session(&self, update: UpdateGameSession) {
        self.record(HandlerCall::UpdateGameSession(update));
    }

    async fn on_terminate_process(&self, terminate: TerminateProcess) {
        self.record(HandlerCall::TerminateProcess(terminate));
    }

    async fn on_start_match_backfill_response(
        &self,
        request_id: Option<String>,
        response: StartMatchBackfillResponse,
    ) {
        self.record(HandlerCall::StartMatchBackfillResponse(request_id, response));
    }

    async fn on_describe_player_sessions_response(
        &self,
        request_id: Option<String>,
        response: DescribePlayerSessionsResponse,
    ) {
        self.record(HandlerCall::DescribePlayerSessionsResponse(request_id, response));
    }

    async fn on_get_compute_certificate_response(
        &self,
        request_id: Option<String>,
        response: GetComputeCertificateResponse,
    ) {
        self.record(HandlerCall::GetComputeCertificateResponse(request_id, response));
    }

    async fn on_get_fleet_role_credentials_response(
        &self,
        request_id: Option<String>,
        response: GetFleetRoleCredentialsResponse,
    ) {
        self.record(HandlerCall::GetFleetRoleCredentialsResponse(request_id, response));
    }

    async fn on_refresh_connection(&self, refresh: RefreshConnection) {
        self.record(HandlerCall::RefreshConnection(refresh));
    }

    async fn on_error_response(&self, request_id: String, status_code: u16, error_message: String) {
        self.record(HandlerCall::ErrorResponse {
            request_id,
            status_code,
            error_message,
        });
    }

    async fn on_success_response(&self, request_id: String) {
        self.record(HandlerCall::SuccessResponse(request_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_connection_close_reports_once() {
        let events = Arc::new(RecordingEvents::default());
        let connection = MockConnection::with_events(next_connection_id(), events.clone());

        connection.close().await;
        connection.close().await;
        connection.simulate_close(CloseReason::Abnormal);

        assert_eq!(connection.close_calls(), 2);
        assert_eq!(events.closed(), vec![(connection.id(), CloseReason::Normal)]);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let connection = MockConnection::open();
        connection.simulate_close(CloseReason::Abnormal);

        let result = connection.send_text("hello".to_string()).await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
        assert!(connection.sent().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_connector_follows_script() {
        let connector = MockConnector::scripted(
            vec![ConnectScript::Fail(ConnectFailure::Forbidden)],
            ConnectScript::Succeed,
        );
        let events: Arc<dyn ConnectionEvents> = Arc::new(RecordingEvents::default());
        let params = ConnectionParameters {
            endpoint: "wss://control.example.com".to_string(),
            process_id: "proc-1".to_string(),
            host_id: "host-1".to_string(),
            fleet_id: "fleet-1".to_string(),
            auth_token: "token".to_string(),
        };

        let first = connector.attempt_connect(&params, events.clone()).await;
        let second = connector.attempt_connect(&params, events).await;

        assert_eq!(first.unwrap_err(), ConnectFailure::Forbidden);
        assert!(second.unwrap().is_open());
        assert_eq!(connector.attempts(), 2);
        assert_eq!(connector.connections().len(), 1);
    }

    #[tokio::test]
    async fn test_loopback_echoes_frames() {
        let events = Arc::new(RecordingEvents::default());
        let transport = LoopbackTransport::echo();
        let url = Url::parse("wss://loopback.invalid").unwrap();

        let handle = transport.open(7, &url, events.clone()).await.unwrap();
        handle.send_text("ping".to_string()).await.unwrap();

        let messages = events.wait_for_messages(1, Duration::from_secs(1)).await;
        assert_eq!(messages, vec![(7, "ping".to_string())]);
    }
}
