// ── Core error types ──
//
// User-facing errors from miele-core. Consumers see "authentication
// failed" or "not ready" rather than raw HTTP plumbing; the
// `From<miele_api::Error>` impl does the translation.

use thiserror::Error;

use crate::flatten::FlattenError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach the Miele cloud at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Setup could not complete but may succeed if retried later.
    #[error("Account not ready: {reason}")]
    NotReady { reason: String },

    #[error("Account has been unloaded")]
    Unloaded,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {serial}")]
    DeviceNotFound { serial: String },

    #[error("Could not flatten device data: {0}")]
    Flatten(#[from] FlattenError),

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Request rejected by the Miele cloud (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<miele_api::Error> for CoreError {
    fn from(err: miele_api::Error) -> Self {
        match err {
            miele_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            miele_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Internal(e.to_string())
                }
            }
            miele_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            miele_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            miele_api::Error::ClientBuild(reason) => CoreError::Config {
                message: format!("Cannot build HTTP client: {reason}"),
            },
            miele_api::Error::InvalidHeader { name } => CoreError::Config {
                message: format!("Invalid value for header {name}"),
            },
            miele_api::Error::Status { status: 401, message } => CoreError::AuthenticationFailed {
                message: if message.is_empty() {
                    "access token rejected".into()
                } else {
                    message
                },
            },
            miele_api::Error::Status { status, message } => CoreError::Rejected { status, message },
            miele_api::Error::StreamRead(e) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("event stream read failed: {e}"),
            },
            miele_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_authentication_failed() {
        let err: CoreError = miele_api::Error::Status {
            status: 401,
            message: "Unauthorized".into(),
        }
        .into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    }

    #[test]
    fn other_status_keeps_code() {
        let err: CoreError = miele_api::Error::Status {
            status: 404,
            message: "Not Found".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Rejected { status: 404, .. }));
    }

    #[test]
    fn api_timeout_keeps_duration() {
        let err: CoreError = miele_api::Error::Timeout { timeout_secs: 10 }.into();
        assert!(matches!(err, CoreError::Timeout { timeout_secs: 10 }));
    }
}
