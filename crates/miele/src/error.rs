//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use miele_config::ConfigError;
use miele_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the Miele cloud at {url}")]
    #[diagnostic(
        code(miele::connection_failed),
        help(
            "Check your network connection and the API URL.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Account is not ready: {reason}")]
    #[diagnostic(
        code(miele::not_ready),
        help("The Miele cloud did not answer as expected. Try again in a minute.")
    )]
    NotReady { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(miele::auth_failed),
        help(
            "The access token was rejected or has expired.\n\
             Store a fresh one with: miele config set-token"
        )
    )]
    AuthFailed { message: String },

    #[error("No access token configured for profile '{profile}'")]
    #[diagnostic(
        code(miele::no_credentials),
        help(
            "Store one with: miele config set-token\n\
             Or set the MIELE_ACCESS_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(miele::not_found),
        help("Run: miele {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Miele cloud rejected the request (HTTP {status}): {message}")]
    #[diagnostic(code(miele::api_error))]
    ApiError { status: u16, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(miele::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(miele::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Config file: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error(transparent)]
    #[diagnostic(code(miele::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(miele::timeout),
        help("Increase the fetch timeout with --timeout.")
    )]
    Timeout { seconds: u64 },

    // ── Internal / IO ────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(miele::internal))]
    Internal { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(miele::json), help("Pass a single JSON object, e.g. '{{\"powerOn\": true}}'."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ApiError { status: 404, .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::NotReady { reason } => CliError::NotReady { reason },

            CoreError::DeviceNotFound { serial } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: serial,
                list_command: "devices list".into(),
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Rejected { status, message } => CliError::ApiError { status, message },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            other @ (CoreError::Unloaded | CoreError::Flatten(_) | CoreError::Internal(_)) => {
                CliError::Internal {
                    message: other.to_string(),
                }
            }
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::AuthenticationFailed {
                    message: "expired".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::DeviceNotFound {
                    serial: "000123".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::Rejected {
                    status: 404,
                    message: String::new(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::Rejected {
                    status: 400,
                    message: String::new(),
                },
                exit_code::GENERAL,
            ),
            (
                CoreError::ConnectionFailed {
                    url: "https://api.mcs3.miele.com/v1".into(),
                    reason: "dns".into(),
                },
                exit_code::CONNECTION,
            ),
            (CoreError::Timeout { timeout_secs: 20 }, exit_code::TIMEOUT),
            (
                CoreError::ValidationFailed {
                    message: "light".into(),
                },
                exit_code::USAGE,
            ),
            (CoreError::Unloaded, exit_code::GENERAL),
        ];

        for (core, expected) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), expected, "{label}");
        }
    }

    #[test]
    fn missing_token_is_an_auth_error() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "home".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
