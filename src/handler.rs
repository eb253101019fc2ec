//! Handler capability for inbound control plane messages
//!
//! Implemented by the hosting application. The dispatcher calls exactly one
//! method per received message. Every method has a default that only logs,
//! so implementors override what they care about.

use crate::protocol::{
    DescribePlayerSessionsResponse, GameSession, GetComputeCertificateResponse,
    GetFleetRoleCredentialsResponse, RefreshConnection, StartMatchBackfillResponse,
    TerminateProcess, UpdateGameSession,
};
use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait ServerMessageHandler: Send + Sync {
    async fn on_start_game_session(&self, game_session: GameSession) {
        debug!(game_session_id = %game_session.game_session_id, "Unhandled start game session");
    }

    async fn on_update_game_session(&self, update: UpdateGameSession) {
        debug!(
            game_session_id = %update.game_session.game_session_id,
            "Unhandled update game session"
        );
    }

    async fn on_terminate_process(&self, terminate: TerminateProcess) {
        debug!(
            termination_time = terminate.termination_time,
            "Unhandled terminate process"
        );
    }

    async fn on_start_match_backfill_response(
        &self,
        request_id: Option<String>,
        _response: StartMatchBackfillResponse,
    ) {
        debug!(?request_id, "Unhandled start match backfill response");
    }

    async fn on_describe_player_sessions_response(
        &self,
        request_id: Option<String>,
        _response: DescribePlayerSessionsResponse,
    ) {
        debug!(?request_id, "Unhandled describe player sessions response");
    }

    async fn on_get_compute_certificate_response(
        &self,
        request_id: Option<String>,
        _response: GetComputeCertificateResponse,
    ) {
        debug!(?request_id, "Unhandled compute certificate response");
    }

    async fn on_get_fleet_role_credentials_response(
        &self,
        request_id: Option<String>,
        _response: GetFleetRoleCredentialsResponse,
    ) {
        debug!(?request_id, "Unhandled fleet role credentials response");
    }

    /// Called after the channel has already swapped in the new token
    async fn on_refresh_connection(&self, _refresh: RefreshConnection) {}

    async fn on_error_response(&self, request_id: String, status_code: u16, error_message: String) {
        debug!(%request_id, status_code, %error_message, "Unhandled error response");
    }

    async fn on_success_response(&self, request_id: String) {
        debug!(%request_id, "Unhandled success response");
    }
}
