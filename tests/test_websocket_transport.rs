//! Websocket transport against a real tokio-tungstenite server
//!
//! Each test binds its own server on 127.0.0.1:0 and drives the channel
//! through an actual handshake.

use futures_util::{SinkExt, StreamExt};
use gamehost_channel::channel::Channel;
use gamehost_channel::config::ChannelConfig;
use gamehost_channel::error::{ChannelError, ConnectFailure};
use gamehost_channel::protocol::ClientMessage;
use gamehost_channel::testing::{HandlerCall, RecordingHandler};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::Message;

fn config_for(addr: SocketAddr, max_connect_retries: u32) -> ChannelConfig {
    ChannelConfig::from_toml_str(&format!(
        r#"
[connection]
endpoint = "ws://{addr}"
process_id = "proc-1"
host_id = "host-1"
fleet_id = "fleet-1"

[retry]
max_connect_retries = {max_connect_retries}

[timeouts]
ready_poll_interval_ms = 50
ready_max_polls = 100
"#
    ))
    .unwrap()
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test]
async fn test_handshake_dispatch_and_send() {
    let (listener, addr) = bind().await;
    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<String>();
    let handshake_uri = Arc::new(Mutex::new(None::<String>));

    let server = {
        let handshake_uri = handshake_uri.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = |request: &Request, response: Response| {
                *handshake_uri.lock().unwrap() = Some(request.uri().to_string());
                Ok::<Response, ErrorResponse>(response)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();

            ws.send(Message::Text(
                r#"{"Action":"CreateGameSession","GameSessionId":"gs-1","MaximumPlayerSessionCount":4,"Port":7777}"#
                    .to_string(),
            ))
            .await
            .unwrap();

            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Text(text) => {
                        let request: serde_json::Value = serde_json::from_str(&text).unwrap();
                        let ack = serde_json::json!({
                            "Action": request["Action"],
                            "RequestId": request["RequestId"],
                            "StatusCode": 200
                        });
                        received_tx.send(text).unwrap();
                        ws.send(Message::Text(ack.to_string())).await.unwrap();
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        })
    };

    let handler = Arc::new(RecordingHandler::default());
    let channel = Channel::websocket(&config_for(addr, 0), handler.clone());
    let mut params = config_for(addr, 0).connection_parameters().unwrap();
    params.auth_token = "token-123".to_string();

    channel.connect(params).await.unwrap();
    assert!(channel.is_connected());

    let uri = handshake_uri.lock().unwrap().clone().unwrap();
    assert!(uri.contains("pID=proc-1"));
    assert!(uri.contains("Authorization=token-123"));
    assert!(uri.contains("ComputeId=host-1"));
    assert!(uri.contains("FleetId=fleet-1"));

    let calls = handler.wait_for_calls(1, Duration::from_secs(5)).await;
    match calls.first() {
        Some(HandlerCall::StartGameSession(session)) => {
            assert_eq!(session.game_session_id, "gs-1");
            assert_eq!(session.maximum_player_session_count, 4);
        }
        other => panic!("unexpected call {other:?}"),
    }

    let heartbeat = ClientMessage::heartbeat(true);
    channel.send_message(&heartbeat).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), received_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(received.contains(r#""Action":"HeartbeatServerProcess""#));
    assert!(received.contains(heartbeat.request_id()));

    let calls = handler.wait_for_calls(2, Duration::from_secs(5)).await;
    assert_eq!(
        calls[1],
        HandlerCall::SuccessResponse(heartbeat.request_id().to_string())
    );

    channel.disconnect().await.unwrap();
    assert!(!channel.is_connected());
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_dropped_socket_triggers_reconnect() {
    let (listener, addr) = bind().await;
    let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel::<usize>();

    tokio::spawn(async move {
        let mut held = Vec::new();
        for index in 0..2 {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            accepted_tx.send(index).unwrap();
            if index == 0 {
                // Vanish without a close frame once the client is settled
                tokio::time::sleep(Duration::from_millis(200)).await;
                drop(ws);
            } else {
                held.push(ws);
            }
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let handler = Arc::new(RecordingHandler::default());
    let config = config_for(addr, 3);
    let channel = Channel::websocket(&config, handler);
    channel
        .connect(config.connection_parameters().unwrap())
        .await
        .unwrap();
    let first_id = channel.current_connection().unwrap().id();

    for expected in 0..2 {
        let index = tokio::time::timeout(Duration::from_secs(5), accepted_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index, expected);
    }

    assert!(channel.wait_for_connected().await);
    let second_id = channel.current_connection().unwrap().id();
    assert_ne!(first_id, second_id);

    channel.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_rejected_handshake_is_forbidden() {
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |_request: &Request, _response: Response| {
            let rejection = http::Response::builder()
                .status(http::StatusCode::FORBIDDEN)
                .body(Some("bad token".to_string()))
                .unwrap();
            Err::<Response, ErrorResponse>(rejection)
        };
        let _ = tokio_tungstenite::accept_hdr_async(stream, callback).await;
    });

    let handler = Arc::new(RecordingHandler::default());
    let config = config_for(addr, 0);
    let channel = Channel::websocket(&config, handler);

    let result = channel.connect(config.connection_parameters().unwrap()).await;

    assert!(matches!(
        result,
        Err(ChannelError::Connect(ConnectFailure::Forbidden))
    ));
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn test_unreachable_endpoint_fails() {
    // Bind then drop so the port is very likely closed
    let (listener, addr) = bind().await;
    drop(listener);

    let handler = Arc::new(RecordingHandler::default());
    let config = config_for(addr, 0);
    let channel = Channel::websocket(&config, handler);

    let result = channel.connect(config.connection_parameters().unwrap()).await;

    match result {
        Err(ChannelError::Connect(failure)) => assert_ne!(failure, ConnectFailure::Forbidden),
        other => panic!("expected connect failure, got {other:?}"),
    }
}
