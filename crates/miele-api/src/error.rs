use thiserror::Error;

/// Top-level error type for the `miele-api` crate.
///
/// Covers every failure mode of the REST surface and the event stream:
/// token acquisition, transport, HTTP status, payload decoding.
/// `miele-core` maps these into fetch outcomes and user-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The token provider could not produce a valid access token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// A header value supplied by the caller or token provider was rejected.
    #[error("Invalid header value for {name}")]
    InvalidHeader { name: String },

    // ── HTTP status ─────────────────────────────────────────────────
    /// Non-success status from an endpoint that raises on failure.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    // ── Event stream ────────────────────────────────────────────────
    /// Reading the event stream body failed mid-stream.
    #[error("Event stream read failed: {0}")]
    StreamRead(#[from] std::io::Error),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the token was rejected
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Status { status, .. } => *status == 401,
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::StreamRead(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_status_is_auth_expired() {
        let err = Error::Status {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert!(err.is_auth_expired());
        assert!(!err.is_transient());
        assert_eq!(err.status(), Some(401));
    }

    #[test]
    fn server_errors_and_timeouts_are_transient() {
        assert!(
            Error::Status {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(Error::Timeout { timeout_secs: 10 }.is_transient());
        assert!(
            !Error::Deserialization {
                message: "eof".into(),
                body: String::new()
            }
            .is_transient()
        );
    }
}
