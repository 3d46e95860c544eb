// ── Polling fetcher ──
//
// One fetch cycle against `GET /devices?language=..`: bounded request,
// 401 counting, in-cycle timeout retry, JSON decode, flattening. The
// result is a tagged outcome so the scheduler can tell "retry later"
// from "needs re-authentication" without inspecting error types.

use miele_api::client::{read_json, with_timeout};
use miele_api::header::{ACCEPT, HeaderValue};
use miele_api::{Method, MieleClient, RequestOptions, StatusCode, TokenProvider};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::form_urlencoded;

use crate::config::FetchPolicy;
use crate::error::CoreError;
use crate::flatten::{DeviceMap, FlattenError, flatten_devices};

/// Result of one fetch cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Fresh flattened state of every appliance on the account.
    Success(DeviceMap),
    /// This cycle failed; the next scheduled cycle may succeed.
    Retryable(FetchFailure),
    /// Retrying will not help without outside action (re-auth) or the
    /// timeout budget is exhausted.
    Fatal(FetchFailure),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Why a fetch cycle failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("HTTP status 401: retry {attempt}")]
    Unauthorized { attempt: u32 },

    #[error("authentication failure when fetching data")]
    ReauthRequired,

    #[error("HTTP status {status}: fetching device data")]
    Status { status: u16 },

    #[error("could not decode device data: {message}")]
    Decode { message: String },

    #[error("could not flatten device data: {0}")]
    Flatten(FlattenError),

    #[error("request failed: {message}")]
    Request { message: String },

    #[error("timed out {count} times in a row fetching device data")]
    TimedOut { count: u32 },
}

impl FetchFailure {
    /// `true` when the host should prompt for re-authentication.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::ReauthRequired)
    }
}

/// Consecutive-failure counters, scoped to one account's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounters {
    pub unauthorized: u32,
    pub timeouts: u32,
}

/// Produces fresh device snapshots on demand.
///
/// Takes `&mut self`: cycles of one fetcher never overlap, and the retry
/// counters carry over from one cycle to the next.
pub struct Fetcher<A> {
    client: MieleClient<A>,
    language: String,
    policy: FetchPolicy,
    counters: RetryCounters,
}

impl<A: TokenProvider> Fetcher<A> {
    pub fn new(client: MieleClient<A>, language: impl Into<String>, policy: FetchPolicy) -> Self {
        Self {
            client,
            language: language.into(),
            policy,
            counters: RetryCounters::default(),
        }
    }

    pub fn counters(&self) -> RetryCounters {
        self.counters
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Run one fetch cycle.
    ///
    /// A request timeout is retried inside the cycle after
    /// `timeout_retry_delay`, until `max_timeouts` consecutive timeouts have
    /// been counted. The timeout counter is only reset by a success, so a
    /// timeout budget spent over several cycles still runs out.
    pub async fn fetch(&mut self) -> FetchOutcome {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("language", &self.language)
            .finish();
        let path = format!("/devices?{query}");

        let resp = loop {
            let request = self.client.request(
                Method::GET,
                &path,
                RequestOptions::new().header(ACCEPT, HeaderValue::from_static("application/json")),
            );
            match with_timeout(self.policy.read_timeout, request).await {
                Ok(resp) => break resp,
                Err(miele_api::Error::Timeout { .. }) => {
                    self.counters.timeouts += 1;
                    let count = self.counters.timeouts;
                    debug!(count, "timeout fetching device data");
                    if count >= self.policy.max_timeouts {
                        warn!(count, "giving up on device fetch after repeated timeouts");
                        return FetchOutcome::Fatal(FetchFailure::TimedOut { count });
                    }
                    tokio::time::sleep(self.policy.timeout_retry_delay).await;
                }
                Err(e) => {
                    warn!(error = %e, "device fetch failed");
                    return FetchOutcome::Retryable(FetchFailure::Request {
                        message: e.to_string(),
                    });
                }
            }
        };

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.counters.unauthorized += 1;
            let attempt = self.counters.unauthorized;
            if attempt == self.policy.max_auth_failures {
                warn!(attempt, "access token rejected repeatedly, re-authentication required");
                return FetchOutcome::Fatal(FetchFailure::ReauthRequired);
            }
            debug!(attempt, "access token rejected");
            return FetchOutcome::Retryable(FetchFailure::Unauthorized { attempt });
        }
        if status != StatusCode::OK {
            return FetchOutcome::Retryable(FetchFailure::Status {
                status: status.as_u16(),
            });
        }

        let payload = match read_json(resp).await {
            Ok(payload) => payload,
            Err(miele_api::Error::Deserialization { message, .. }) => {
                error!(%message, "could not decode json from device fetch");
                return FetchOutcome::Retryable(FetchFailure::Decode { message });
            }
            Err(e) => {
                return FetchOutcome::Retryable(FetchFailure::Request {
                    message: e.to_string(),
                });
            }
        };

        self.counters = RetryCounters::default();

        match flatten_devices(&payload) {
            Ok(devices) => {
                debug!(devices = devices.len(), "device fetch complete");
                FetchOutcome::Success(devices)
            }
            Err(e) => {
                error!(error = %e, "error flattening device data");
                FetchOutcome::Retryable(FetchFailure::Flatten(e))
            }
        }
    }
}

// ── Conversion for callers that want a plain error ───────────────────

impl From<FetchFailure> for CoreError {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::ReauthRequired | FetchFailure::Unauthorized { .. } => {
                CoreError::AuthenticationFailed {
                    message: failure.to_string(),
                }
            }
            FetchFailure::Flatten(e) => CoreError::Flatten(e),
            FetchFailure::Status { status } => CoreError::Rejected {
                status,
                message: failure.to_string(),
            },
            other => CoreError::NotReady {
                reason: other.to_string(),
            },
        }
    }
}
