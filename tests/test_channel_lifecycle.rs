//! Channel lifecycle tests against a scripted connector
//!
//! Time is paused, so backoff and polling delays are asserted
//! without the tests actually sleeping.

use gamehost_channel::channel::{
    Channel, ChannelSettings, ConnectionParameters, ReadyGateSettings, RetrySettings,
};
use gamehost_channel::error::{ChannelError, ConnectFailure};
use gamehost_channel::protocol::ClientMessage;
use gamehost_channel::testing::{
    ConnectScript, HandlerCall, MockConnector, RecordingHandler,
};
use gamehost_channel::transport::{CloseReason, Connection, ConnectionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn params() -> ConnectionParameters {
    ConnectionParameters {
        endpoint: "wss://control.example.com".to_string(),
        process_id: "proc-1".to_string(),
        host_id: "host-1".to_string(),
        fleet_id: "fleet-1".to_string(),
        auth_token: "T1".to_string(),
    }
}

/// Paused-clock timers fire on millisecond ticks, so allow a little slack
fn assert_duration_near(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(50),
        "expected about {expected:?}, got {actual:?}"
    );
}

fn channel_with(
    connector: MockConnector,
    settings: ChannelSettings,
) -> (Channel, Arc<MockConnector>, Arc<RecordingHandler>) {
    let connector = Arc::new(connector);
    let handler = Arc::new(RecordingHandler::default());
    let channel = Channel::new(settings, connector.clone(), handler.clone());
    (channel, connector, handler)
}

fn channel(connector: MockConnector) -> (Channel, Arc<MockConnector>, Arc<RecordingHandler>) {
    channel_with(connector, ChannelSettings::default())
}

#[tokio::test(start_paused = true)]
async fn test_connect_succeeds_on_first_attempt() {
    let (channel, connector, _) = channel(MockConnector::always_succeed());

    channel.connect(params()).await.unwrap();

    assert!(channel.is_connected());
    assert_eq!(connector.attempts(), 1);
    assert_eq!(connector.seen_params()[0].auth_token, "T1");
}

#[tokio::test(start_paused = true)]
async fn test_connect_backs_off_between_attempts() {
    let (channel, connector, _) = channel(MockConnector::succeed_after(3));

    channel.connect(params()).await.unwrap();

    let times = connector.attempt_times();
    assert_eq!(times.len(), 4);
    let gaps: Vec<Duration> = times.windows(2).map(|pair| pair[1] - pair[0]).collect();
    for (gap, expected) in gaps.into_iter().zip([4, 8, 16]) {
        assert_duration_near(gap, Duration::from_secs(expected));
    }
    assert!(channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_exhausts_retries_with_last_failure() {
    let (channel, connector, _) = channel(MockConnector::scripted(
        vec![ConnectScript::Fail(ConnectFailure::Timeout)],
        ConnectScript::Fail(ConnectFailure::Forbidden),
    ));

    let started = Instant::now();
    let result = channel.connect(params()).await;

    assert!(matches!(
        result,
        Err(ChannelError::Connect(ConnectFailure::Forbidden))
    ));
    assert_eq!(connector.attempts(), 8);
    // 4 + 8 + 16 + 32 * 4, with no sleep after the final attempt
    assert_duration_near(started.elapsed(), Duration::from_secs(156));
    assert!(!channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_send_after_exhaustion_fails_fast() {
    let (channel, connector, _) = channel(MockConnector::always_fail(ConnectFailure::Failed));
    assert!(channel.connect(params()).await.is_err());

    let started = Instant::now();
    let result = channel.send_message(&ClientMessage::heartbeat(true)).await;

    assert!(matches!(result, Err(ChannelError::ServiceCallFailed { .. })));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(connector.attempts(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_send_before_connect_fails_fast() {
    let (channel, connector, _) = channel(MockConnector::always_succeed());

    let started = Instant::now();
    let result = channel.send_message(&ClientMessage::heartbeat(true)).await;

    assert!(matches!(result, Err(ChannelError::ServiceCallFailed { .. })));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_backoff_aborts_retries() {
    let (channel, connector, _) = channel(MockConnector::succeed_after(2));

    let connecting = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.connect(params()).await })
    };

    // First attempt at t=0, second at t=4s, then an 8s backoff
    tokio::time::sleep(Duration::from_secs(6)).await;
    channel.disconnect().await.unwrap();

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(ChannelError::Connect(ConnectFailure::Failed))));
    assert_eq!(connector.attempts(), 2);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempts(), 2);

    channel.connect(params()).await.unwrap();
    assert!(channel.is_connected());
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_normal_close_does_not_reconnect() {
    let (channel, connector, _) = channel(MockConnector::always_succeed());
    channel.connect(params()).await.unwrap();

    connector
        .last_connection()
        .unwrap()
        .simulate_close(CloseReason::Normal);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts(), 1);
    assert!(!channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_reconnects_once() {
    let (channel, connector, _) = channel(MockConnector::always_succeed());
    channel.connect(params()).await.unwrap();
    let first = connector.last_connection().unwrap();

    first.simulate_close(CloseReason::Abnormal);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(connector.attempts(), 2);
    assert!(channel.is_connected());
    let current = channel.current_connection().unwrap();
    assert_ne!(current.id(), first.id());
}

#[tokio::test(start_paused = true)]
async fn test_close_after_disconnect_does_not_reconnect() {
    let (channel, connector, _) = channel(MockConnector::always_succeed());
    channel.connect(params()).await.unwrap();
    let connection = connector.last_connection().unwrap();

    channel.disconnect().await.unwrap();
    connection.simulate_close(CloseReason::Abnormal);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(connection.close_calls(), 1);
    assert!(channel.current_connection().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sends_share_one_reconnect() {
    let (channel, connector, _) =
        channel(MockConnector::always_succeed().with_latency(Duration::from_millis(500)));
    channel.connect(params()).await.unwrap();

    // Drop the socket without any close callback so only senders notice
    connector
        .last_connection()
        .unwrap()
        .set_state(ConnectionState::Closed);

    let sends: Vec<_> = (0..20)
        .map(|_| {
            let channel = channel.clone();
            tokio::spawn(async move { channel.send_message(&ClientMessage::heartbeat(true)).await })
        })
        .collect();

    for result in futures::future::join_all(sends).await {
        result.unwrap().unwrap();
    }

    assert_eq!(connector.attempts(), 2);
    assert_eq!(connector.max_in_flight(), 1);
    assert_eq!(connector.last_connection().unwrap().sent().len(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_ready_gate_gives_up_after_poll_budget() {
    let settings = ChannelSettings {
        ready: ReadyGateSettings {
            poll_interval: Duration::from_secs(1),
            max_polls: 3,
        },
        ..Default::default()
    };
    let (channel, connector, _) = channel_with(
        MockConnector::scripted(
            vec![ConnectScript::Succeed],
            ConnectScript::Fail(ConnectFailure::Timeout),
        ),
        settings,
    );
    channel.connect(params()).await.unwrap();
    connector
        .last_connection()
        .unwrap()
        .set_state(ConnectionState::Closed);

    let started = Instant::now();
    let result = channel.send_message(&ClientMessage::heartbeat(true)).await;

    assert!(matches!(result, Err(ChannelError::ServiceCallFailed { .. })));
    assert_duration_near(started.elapsed(), Duration::from_secs(3));
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_surfaces_without_retry() {
    let (channel, connector, _) = channel(MockConnector::always_succeed());
    channel.connect(params()).await.unwrap();
    let connection = connector.last_connection().unwrap();
    connection.fail_sends();

    let result = channel.send_message(&ClientMessage::heartbeat(true)).await;

    match result {
        Err(error) => assert_eq!(error.code(), "SERVICE_CALL_FAILED"),
        Ok(()) => panic!("send should fail"),
    }
    assert!(connection.sent().is_empty());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_connection_rotates_token_in_place() {
    let (channel, connector, handler) = channel(MockConnector::always_succeed());
    channel.connect(params()).await.unwrap();
    let connection = connector.last_connection().unwrap();

    connection
        .deliver(r#"{"Action":"RefreshConnection","AuthToken":"T2"}"#)
        .await;

    assert_eq!(channel.connection_parameters().unwrap().auth_token, "T2");
    assert!(connection.is_open());
    assert_eq!(connection.close_calls(), 0);
    assert!(matches!(
        handler.calls().as_slice(),
        [HandlerCall::RefreshConnection(_)]
    ));

    connection.simulate_close(CloseReason::Abnormal);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let seen = connector.seen_params();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].auth_token, "T2");
    assert_eq!(seen[1].endpoint, "wss://control.example.com");
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_is_configurable() {
    let settings = ChannelSettings {
        retry: RetrySettings {
            max_connect_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let (channel, connector, _) =
        channel_with(MockConnector::always_fail(ConnectFailure::Timeout), settings);

    let started = Instant::now();
    let result = channel.connect(params()).await;

    assert!(matches!(
        result,
        Err(ChannelError::Connect(ConnectFailure::Timeout))
    ));
    assert_eq!(connector.attempts(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_handshake_leaves_channel_disconnected() {
    let (channel, connector, _) =
        channel(MockConnector::always_succeed().with_latency(Duration::from_secs(1)));

    let connecting = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.connect(params()).await })
    };

    // The handshake is still in flight at this point
    tokio::time::sleep(Duration::from_millis(500)).await;
    channel.disconnect().await.unwrap();

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(ChannelError::Connect(_))));
    assert!(!channel.is_connected());
    assert!(channel.current_connection().is_none());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let late = connector.last_connection().unwrap();
    assert_eq!(late.close_calls(), 1);
    assert!(!late.is_open());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts(), 1);
    assert!(!channel.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_queued_behind_exhausting_sequence_still_attempts() {
    let (channel, connector, _) = channel(
        MockConnector::scripted(
            vec![ConnectScript::Fail(ConnectFailure::Failed); 8],
            ConnectScript::Succeed,
        )
        .with_latency(Duration::from_millis(100)),
    );

    let first = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.connect(params()).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    let second = channel.connect(params()).await;
    let first = first.await.unwrap();

    assert!(matches!(
        first,
        Err(ChannelError::Connect(ConnectFailure::Failed))
    ));
    assert!(second.is_ok());
    assert_eq!(connector.attempts(), 9);
    assert!(channel.is_connected());
}
