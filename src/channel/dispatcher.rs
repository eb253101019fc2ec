//! Inbound message routing
//!
//! Routing is split in two: [`InboundMessage::from_envelope`] is a pure
//! decision over the parsed envelope, [`MessageDispatcher::dispatch`] performs
//! the side effects. Nothing in here can fail the connection: every parse
//! error is logged and the frame dropped.

use super::params::ParameterStore;
use crate::handler::ServerMessageHandler;
use crate::observability::metrics::metrics;
use crate::protocol::actions;
use crate::protocol::{
    DescribePlayerSessionsResponse, GameSession, GetComputeCertificateResponse,
    GetFleetRoleCredentialsResponse, InboundEnvelope, RefreshConnection,
    StartMatchBackfillResponse, TerminateProcess, UpdateGameSession,
};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Fully decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    ErrorResponse {
        request_id: String,
        status_code: u16,
        error_message: String,
    },
    StartGameSession(GameSession),
    UpdateGameSession(UpdateGameSession),
    TerminateProcess(TerminateProcess),
    StartMatchBackfillResponse {
        request_id: Option<String>,
        response: StartMatchBackfillResponse,
    },
    DescribePlayerSessionsResponse {
        request_id: Option<String>,
        response: DescribePlayerSessionsResponse,
    },
    GetComputeCertificateResponse {
        request_id: Option<String>,
        response: GetComputeCertificateResponse,
    },
    GetFleetRoleCredentialsResponse {
        request_id: Option<String>,
        response: GetFleetRoleCredentialsResponse,
    },
    RefreshConnection(RefreshConnection),
    /// Unrecognised action acknowledged by request id
    SuccessResponse { request_id: String },
    /// Unrecognised action with nothing to correlate it to
    Unroutable { action: String },
}

impl InboundMessage {
    /// Decide how an envelope is handled (pure function)
    pub fn from_envelope(envelope: &InboundEnvelope) -> Result<Self, serde_json::Error> {
        if envelope.is_failure() {
            if let (Some(request_id), Some(status_code)) =
                (envelope.request_id.clone(), envelope.status_code)
            {
                return Ok(InboundMessage::ErrorResponse {
                    request_id,
                    status_code,
                    error_message: envelope.error_message.clone().unwrap_or_default(),
                });
            }
        }

        let request_id = envelope.request_id.clone();
        let message = match envelope.action.as_str() {
            actions::CREATE_GAME_SESSION => InboundMessage::StartGameSession(envelope.decode()?),
            actions::UPDATE_GAME_SESSION => InboundMessage::UpdateGameSession(envelope.decode()?),
            actions::TERMINATE_PROCESS => InboundMessage::TerminateProcess(envelope.decode()?),
            actions::START_MATCH_BACKFILL => InboundMessage::StartMatchBackfillResponse {
                request_id,
                response: envelope.decode()?,
            },
            actions::DESCRIBE_PLAYER_SESSIONS => InboundMessage::DescribePlayerSessionsResponse {
                request_id,
                response: envelope.decode()?,
            },
            actions::GET_COMPUTE_CERTIFICATE => InboundMessage::GetComputeCertificateResponse {
                request_id,
                response: envelope.decode()?,
            },
            actions::GET_FLEET_ROLE_CREDENTIALS => {
                InboundMessage::GetFleetRoleCredentialsResponse {
                    request_id,
                    response: envelope.decode()?,
                }
            }
            actions::REFRESH_CONNECTION => InboundMessage::RefreshConnection(envelope.decode()?),
            other => match request_id {
                Some(request_id) => InboundMessage::SuccessResponse { request_id },
                None => InboundMessage::Unroutable {
                    action: other.to_string(),
                },
            },
        };
        Ok(message)
    }
}

/// What the dispatcher did with a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A typed handler was invoked for this action
    Handled(String),
    ErrorResponse { request_id: String },
    Acknowledged { request_id: String },
    Dropped(String),
}

/// Routes inbound frames to the handler capability
pub struct MessageDispatcher {
    handler: Arc<dyn ServerMessageHandler>,
    params: Arc<ParameterStore>,
}

impl MessageDispatcher {
    pub fn new(handler: Arc<dyn ServerMessageHandler>, params: Arc<ParameterStore>) -> Self {
        Self { handler, params }
    }

    /// Parse one text frame and invoke the matching handler
    pub async fn dispatch(&self, text: &str) -> DispatchOutcome {
        metrics().message_received();

        let envelope = match InboundEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => return self.drop_frame(format!("unparseable frame: {e}")),
        };
        let span = crate::dispatch_span!(action = %envelope.action);
        self.route(envelope).instrument(span).await
    }

    async fn route(&self, envelope: InboundEnvelope) -> DispatchOutcome {
        let message = match InboundMessage::from_envelope(&envelope) {
            Ok(message) => message,
            Err(e) => {
                return self.drop_frame(format!(
                    "malformed {} payload: {e}",
                    envelope.action
                ))
            }
        };

        let action = envelope.action;
        match message {
            InboundMessage::ErrorResponse {
                request_id,
                status_code,
                error_message,
            } => {
                warn!(%request_id, status_code, %error_message, "Control plane returned an error");
                self.handler
                    .on_error_response(request_id.clone(), status_code, error_message)
                    .await;
                DispatchOutcome::ErrorResponse { request_id }
            }
            InboundMessage::StartGameSession(game_session) => {
                info!(game_session_id = %game_session.game_session_id, "Starting game session");
                self.handler.on_start_game_session(game_session).await;
                DispatchOutcome::Handled(action)
            }
            InboundMessage::UpdateGameSession(update) => {
                self.handler.on_update_game_session(update).await;
                DispatchOutcome::Handled(action)
            }
            InboundMessage::TerminateProcess(terminate) => {
                info!(termination_time = terminate.termination_time, "Process termination requested");
                self.handler.on_terminate_process(terminate).await;
                DispatchOutcome::Handled(action)
            }
            InboundMessage::StartMatchBackfillResponse {
                request_id,
                response,
            } => {
                self.handler
                    .on_start_match_backfill_response(request_id, response)
                    .await;
                DispatchOutcome::Handled(action)
            }
            InboundMessage::DescribePlayerSessionsResponse {
                request_id,
                response,
            } => {
                self.handler
                    .on_describe_player_sessions_response(request_id, response)
                    .await;
                DispatchOutcome::Handled(action)
            }
            InboundMessage::GetComputeCertificateResponse {
                request_id,
                response,
            } => {
                self.handler
                    .on_get_compute_certificate_response(request_id, response)
                    .await;
                DispatchOutcome::Handled(action)
            }
            InboundMessage::GetFleetRoleCredentialsResponse {
                request_id,
                response,
            } => {
                self.handler
                    .on_get_fleet_role_credentials_response(request_id, response)
                    .await;
                DispatchOutcome::Handled(action)
            }
            InboundMessage::RefreshConnection(refresh) => {
                let refreshed = self.params.refresh(
                    &refresh.auth_token,
                    refresh.refresh_connection_endpoint.as_deref(),
                );
                info!(refreshed, "Connection credentials refreshed");
                self.handler.on_refresh_connection(refresh).await;
                DispatchOutcome::Handled(action)
            }
            InboundMessage::SuccessResponse { request_id } => {
                self.handler.on_success_response(request_id.clone()).await;
                DispatchOutcome::Acknowledged { request_id }
            }
            InboundMessage::Unroutable { action } => {
                self.drop_frame(format!("unknown action {action} without a request id"))
            }
        }
    }

    fn drop_frame(&self, reason: String) -> DispatchOutcome {
        metrics().message_dropped();
        warn!(%reason, "Dropping inbound message");
        DispatchOutcome::Dropped(reason)
    }
}
