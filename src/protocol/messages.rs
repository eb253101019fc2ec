//! Typed message payloads
//!
//! Inbound payloads are decoded from an [`InboundEnvelope`](super::InboundEnvelope)
//! once its action is known. Outbound requests are variants of
//! [`ClientMessage`], tagged on the wire by `Action`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Generate a fresh correlation id for an outbound request
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

// ===== Inbound payloads =====

/// Game session the control plane asks this process to host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GameSession {
    pub game_session_id: String,
    pub name: Option<String>,
    pub fleet_id: String,
    pub maximum_player_session_count: u32,
    pub port: u16,
    pub ip_address: Option<String>,
    pub game_session_data: Option<String>,
    pub matchmaker_data: Option<String>,
    pub game_properties: HashMap<String, String>,
    pub dns_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateGameSession {
    pub game_session: GameSession,
    pub update_reason: Option<String>,
    pub backfill_ticket_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TerminateProcess {
    /// Epoch seconds after which the process will be reclaimed
    pub termination_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StartMatchBackfillResponse {
    pub ticket_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayerSession {
    pub player_id: String,
    pub player_session_id: String,
    pub game_session_id: String,
    pub fleet_id: String,
    pub creation_time: i64,
    pub termination_time: i64,
    pub status: String,
    pub ip_address: Option<String>,
    pub port: u16,
    pub player_data: Option<String>,
    pub dns_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribePlayerSessionsResponse {
    pub next_token: Option<String>,
    pub player_sessions: Vec<PlayerSession>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GetComputeCertificateResponse {
    pub certificate_path: String,
    pub compute_name: String,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GetFleetRoleCredentialsResponse {
    pub assumed_role_user_arn: String,
    pub assumed_role_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Epoch milliseconds
    pub expiration: i64,
}

impl std::fmt::Debug for GetFleetRoleCredentialsResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetFleetRoleCredentialsResponse")
            .field("assumed_role_user_arn", &self.assumed_role_user_arn)
            .field("assumed_role_id", &self.assumed_role_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &"***")
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RefreshConnection {
    pub refresh_connection_endpoint: Option<String>,
    pub auth_token: String,
}

impl std::fmt::Debug for RefreshConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshConnection")
            .field(
                "refresh_connection_endpoint",
                &self.refresh_connection_endpoint,
            )
            .field("auth_token", &"***")
            .finish()
    }
}

// ===== Outbound requests =====

/// Requests this process sends to the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Action")]
pub enum ClientMessage {
    ActivateServerProcess(ActivateServerProcess),
    HeartbeatServerProcess(HeartbeatServerProcess),
    ActivateGameSession(GameSessionRequest),
    UpdatePlayerSessionCreationPolicy(UpdatePlayerSessionCreationPolicy),
    AcceptPlayerSession(PlayerSessionRequest),
    RemovePlayerSession(PlayerSessionRequest),
    TerminateServerProcess(EmptyRequest),
    StartMatchBackfill(StartMatchBackfill),
    StopMatchBackfill(StopMatchBackfill),
    DescribePlayerSessions(DescribePlayerSessions),
    GetComputeCertificate(EmptyRequest),
    GetFleetRoleCredentials(GetFleetRoleCredentials),
}

impl ClientMessage {
    /// Wire discriminant of this request
    pub fn action(&self) -> &'static str {
        use super::actions::*;
        match self {
            ClientMessage::ActivateServerProcess(_) => ACTIVATE_SERVER_PROCESS,
            ClientMessage::HeartbeatServerProcess(_) => HEARTBEAT_SERVER_PROCESS,
            ClientMessage::ActivateGameSession(_) => ACTIVATE_GAME_SESSION,
            ClientMessage::UpdatePlayerSessionCreationPolicy(_) => {
                UPDATE_PLAYER_SESSION_CREATION_POLICY
            }
            ClientMessage::AcceptPlayerSession(_) => ACCEPT_PLAYER_SESSION,
            ClientMessage::RemovePlayerSession(_) => REMOVE_PLAYER_SESSION,
            ClientMessage::TerminateServerProcess(_) => TERMINATE_SERVER_PROCESS,
            ClientMessage::StartMatchBackfill(_) => START_MATCH_BACKFILL,
            ClientMessage::StopMatchBackfill(_) => STOP_MATCH_BACKFILL,
            ClientMessage::DescribePlayerSessions(_) => DESCRIBE_PLAYER_SESSIONS,
            ClientMessage::GetComputeCertificate(_) => GET_COMPUTE_CERTIFICATE,
            ClientMessage::GetFleetRoleCredentials(_) => GET_FLEET_ROLE_CREDENTIALS,
        }
    }

    /// Correlation id the control plane echoes back in its response
    pub fn request_id(&self) -> &str {
        match self {
            ClientMessage::ActivateServerProcess(m) => &m.request_id,
            ClientMessage::HeartbeatServerProcess(m) => &m.request_id,
            ClientMessage::ActivateGameSession(m) => &m.request_id,
            ClientMessage::UpdatePlayerSessionCreationPolicy(m) => &m.request_id,
            ClientMessage::AcceptPlayerSession(m) => &m.request_id,
            ClientMessage::RemovePlayerSession(m) => &m.request_id,
            ClientMessage::TerminateServerProcess(m) => &m.request_id,
            ClientMessage::StartMatchBackfill(m) => &m.request_id,
            ClientMessage::StopMatchBackfill(m) => &m.request_id,
            ClientMessage::DescribePlayerSessions(m) => &m.request_id,
            ClientMessage::GetComputeCertificate(m) => &m.request_id,
            ClientMessage::GetFleetRoleCredentials(m) => &m.request_id,
        }
    }

    pub fn activate_server_process(
        sdk_version: impl Into<String>,
        sdk_language: impl Into<String>,
        port: u16,
        log_paths: Vec<String>,
    ) -> Self {
        ClientMessage::ActivateServerProcess(ActivateServerProcess {
            request_id: new_request_id(),
            sdk_version: sdk_version.into(),
            sdk_language: sdk_language.into(),
            port,
            log_paths,
        })
    }

    pub fn heartbeat(health_status: bool) -> Self {
        ClientMessage::HeartbeatServerProcess(HeartbeatServerProcess {
            request_id: new_request_id(),
            health_status,
        })
    }

    pub fn activate_game_session(game_session_id: impl Into<String>) -> Self {
        ClientMessage::ActivateGameSession(GameSessionRequest {
            request_id: new_request_id(),
            game_session_id: game_session_id.into(),
        })
    }

    pub fn accept_player_session(
        game_session_id: impl Into<String>,
        player_session_id: impl Into<String>,
    ) -> Self {
        ClientMessage::AcceptPlayerSession(PlayerSessionRequest {
            request_id: new_request_id(),
            game_session_id: game_session_id.into(),
            player_session_id: player_session_id.into(),
        })
    }

    pub fn remove_player_session(
        game_session_id: impl Into<String>,
        player_session_id: impl Into<String>,
    ) -> Self {
        ClientMessage::RemovePlayerSession(PlayerSessionRequest {
            request_id: new_request_id(),
            game_session_id: game_session_id.into(),
            player_session_id: player_session_id.into(),
        })
    }

    pub fn terminate_server_process() -> Self {
        ClientMessage::TerminateServerProcess(EmptyRequest::new())
    }

    pub fn get_compute_certificate() -> Self {
        ClientMessage::GetComputeCertificate(EmptyRequest::new())
    }
}

/// Request with no fields beyond its correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmptyRequest {
    pub request_id: String,
}

impl EmptyRequest {
    pub fn new() -> Self {
        Self {
            request_id: new_request_id(),
        }
    }
}

impl Default for EmptyRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateServerProcess {
    pub request_id: String,
    pub sdk_version: String,
    pub sdk_language: String,
    pub port: u16,
    pub log_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeartbeatServerProcess {
    pub request_id: String,
    pub health_status: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameSessionRequest {
    pub request_id: String,
    pub game_session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdatePlayerSessionCreationPolicy {
    pub request_id: String,
    pub game_session_id: String,
    /// `ACCEPT_ALL` or `DENY_ALL`
    pub player_session_policy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerSessionRequest {
    pub request_id: String,
    pub game_session_id: String,
    pub player_session_id: String,
}

/// Player entry of a backfill request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MatchmakingPlayer {
    pub player_id: String,
    pub team: Option<String>,
    pub player_attributes: HashMap<String, Value>,
    pub latency_in_ms: HashMap<String, i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartMatchBackfill {
    pub request_id: String,
    pub ticket_id: String,
    pub game_session_arn: String,
    pub matchmaking_configuration_arn: String,
    pub players: Vec<MatchmakingPlayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopMatchBackfill {
    pub request_id: String,
    pub ticket_id: String,
    pub game_session_arn: String,
    pub matchmaking_configuration_arn: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribePlayerSessions {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_session_status_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetFleetRoleCredentials {
    pub request_id: String,
    pub role_arn: String,
    pub role_session_name: String,
}
