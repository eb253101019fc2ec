//! Action discriminants used on the wire

/// Control plane asks this process to host a new game session
pub const CREATE_GAME_SESSION: &str = "CreateGameSession";
pub const UPDATE_GAME_SESSION: &str = "UpdateGameSession";
pub const TERMINATE_PROCESS: &str = "TerminateProcess";
pub const START_MATCH_BACKFILL: &str = "StartMatchBackfill";
pub const DESCRIBE_PLAYER_SESSIONS: &str = "DescribePlayerSessions";
pub const GET_COMPUTE_CERTIFICATE: &str = "GetComputeCertificate";
pub const GET_FLEET_ROLE_CREDENTIALS: &str = "GetFleetRoleCredentials";
/// Control plane rotates the auth token (and optionally the endpoint)
pub const REFRESH_CONNECTION: &str = "RefreshConnection";

pub const ACTIVATE_SERVER_PROCESS: &str = "ActivateServerProcess";
pub const HEARTBEAT_SERVER_PROCESS: &str = "HeartbeatServerProcess";
pub const ACTIVATE_GAME_SESSION: &str = "ActivateGameSession";
pub const UPDATE_PLAYER_SESSION_CREATION_POLICY: &str = "UpdatePlayerSessionCreationPolicy";
pub const ACCEPT_PLAYER_SESSION: &str = "AcceptPlayerSession";
pub const REMOVE_PLAYER_SESSION: &str = "RemovePlayerSession";
pub const TERMINATE_SERVER_PROCESS: &str = "TerminateServerProcess";
pub const STOP_MATCH_BACKFILL: &str = "StopMatchBackfill";

/// HTTP-style status codes in `200..300` are successes
pub fn is_success_status(status_code: u16) -> bool {
    (200..300).contains(&status_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_status_range() {
        assert!(is_success_status(200));
        assert!(is_success_status(204));
        assert!(!is_success_status(199));
        assert!(!is_success_status(400));
        assert!(!is_success_status(500));
    }
}
