//! Inbound message envelope
//!
//! The envelope exposes the discriminant and correlation fields of a frame
//! before any payload-specific decoding happens.

use super::actions::is_success_status;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed shell of an inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundEnvelope {
    pub action: String,
    /// Absent for unsolicited or broadcast messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Absent means success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Everything else on the frame
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl InboundEnvelope {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// True when the frame carries a non-2xx status code
    pub fn is_failure(&self) -> bool {
        self.status_code
            .map(|code| !is_success_status(code))
            .unwrap_or(false)
    }

    /// Decode the remaining fields into an action-specific payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.payload.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::TerminateProcess;

    #[test]
    fn test_parse_envelope_with_payload() {
        let envelope = InboundEnvelope::parse(
            r#"{"Action":"TerminateProcess","RequestId":"r-1","TerminationTime":1700000000}"#,
        )
        .unwrap();

        assert_eq!(envelope.action, "TerminateProcess");
        assert_eq!(envelope.request_id.as_deref(), Some("r-1"));
        assert_eq!(envelope.status_code, None);
        assert!(!envelope.is_failure());
        assert!(envelope.payload.contains_key("TerminationTime"));
        assert!(!envelope.payload.contains_key("Action"));

        let terminate: TerminateProcess = envelope.decode().unwrap();
        assert_eq!(terminate.termination_time, 1_700_000_000);
    }

    #[test]
    fn test_failure_status() {
        let envelope = InboundEnvelope::parse(
            r#"{"Action":"ActivateGameSession","RequestId":"r-2","StatusCode":400,"ErrorMessage":"bad"}"#,
        )
        .unwrap();

        assert!(envelope.is_failure());
        assert_eq!(envelope.error_message.as_deref(), Some("bad"));
    }

    #[test]
    fn test_success_status_is_not_failure() {
        let envelope =
            InboundEnvelope::parse(r#"{"Action":"ActivateGameSession","StatusCode":200}"#)
                .unwrap();
        assert!(!envelope.is_failure());
    }

    #[test]
    fn test_missing_action_is_rejected() {
        assert!(InboundEnvelope::parse(r#"{"RequestId":"r-3"}"#).is_err());
        assert!(InboundEnvelope::parse("not json").is_err());
        assert!(InboundEnvelope::parse("[1,2,3]").is_err());
    }
}
