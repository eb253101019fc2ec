//! Error types for the game host channel
//!
//! Connection failures are modelled as a small `Copy` enum so they can travel
//! through close callbacks and retry loops cheaply. Everything surfaced to
//! callers of the public API is a [`ChannelError`].

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static SECRET_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)(authorization|password|token|key|secret)[=:]\s*[^\s&]+").ok()
});

/// Reason a single connection attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectFailure {
    /// Generic failure, including a handshake that did not finish in time
    #[error("connection attempt failed")]
    Failed,
    /// Handshake rejected by the control plane (credentials or identity)
    #[error("connection attempt rejected by the control plane")]
    Forbidden,
    /// Abnormal closure while connecting
    #[error("connection attempt closed abnormally")]
    Timeout,
}

/// Main error type for channel operations
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Connect failed: {0}")]
    Connect(#[from] ConnectFailure),

    #[error("Service call failed: {message}")]
    ServiceCallFailed { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ChannelError {
    /// Stable error code, matching the control plane's error vocabulary
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::Connect(ConnectFailure::Failed) => "CONNECT_FAILURE",
            ChannelError::Connect(ConnectFailure::Forbidden) => "CONNECT_FAILURE_FORBIDDEN",
            ChannelError::Connect(ConnectFailure::Timeout) => "CONNECT_FAILURE_TIMEOUT",
            ChannelError::ServiceCallFailed { .. } => "SERVICE_CALL_FAILED",
            ChannelError::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Create a service call failure with a sanitized message
    pub fn service_call_failed<S: AsRef<str>>(message: S) -> Self {
        Self::ServiceCallFailed {
            message: sanitize_error_message(message.as_ref()),
        }
    }

    /// True for any of the connect failure variants
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, ChannelError::Connect(_))
    }
}

/// Strip credentials from a message and cap its length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = match SECRET_PATTERN.as_ref() {
        Some(pattern) => pattern.replace_all(message, "${1}=***").to_string(),
        None => message.to_string(),
    };

    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
