//! Connection parameters and the store shared with the dispatcher

use crate::config::SdkSection;
use crate::transport::TransportError;
use std::sync::RwLock;
use url::Url;

/// Identity and credentials presented on every handshake
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub endpoint: String,
    pub process_id: String,
    pub host_id: String,
    pub fleet_id: String,
    pub auth_token: String,
}

impl std::fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("endpoint", &self.endpoint)
            .field("process_id", &self.process_id)
            .field("host_id", &self.host_id)
            .field("fleet_id", &self.fleet_id)
            .field("auth_token", &"***")
            .finish()
    }
}

impl ConnectionParameters {
    /// Handshake URI: the endpoint plus identity and protocol query parameters
    pub fn connect_url(&self, sdk: &SdkSection) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {e}", self.endpoint)))?;

        url.query_pairs_mut()
            .append_pair("pID", &self.process_id)
            .append_pair("sdkVersion", &sdk.version)
            .append_pair("sdkLanguage", &sdk.language)
            .append_pair("Authorization", &self.auth_token)
            .append_pair("ComputeId", &self.host_id)
            .append_pair("FleetId", &self.fleet_id);

        Ok(url)
    }
}

/// Parameters of the current `connect` call
///
/// Each connect attempt takes a fresh snapshot, so a refreshed token is used
/// by the next reconnect without touching the live connection.
#[derive(Debug, Default)]
pub struct ParameterStore {
    current: RwLock<Option<ConnectionParameters>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, params: ConnectionParameters) {
        if let Ok(mut current) = self.current.write() {
            *current = Some(params);
        }
    }

    pub fn snapshot(&self) -> Option<ConnectionParameters> {
        self.current.read().ok().and_then(|current| current.clone())
    }

    pub fn is_configured(&self) -> bool {
        self.current
            .read()
            .map(|current| current.is_some())
            .unwrap_or(false)
    }

    /// Swap in a new auth token (and endpoint, when given)
    ///
    /// Returns false when no parameters have been set yet.
    pub fn refresh(&self, auth_token: &str, endpoint: Option<&str>) -> bool {
        let Ok(mut current) = self.current.write() else {
            return false;
        };
        match current.as_mut() {
            Some(params) => {
                params.auth_token = auth_token.to_string();
                if let Some(endpoint) = endpoint.filter(|e| !e.is_empty()) {
                    params.endpoint = endpoint.to_string();
                }
                true
            }
            None => false,
        }
    }
}
