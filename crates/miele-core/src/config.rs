// ── Runtime account configuration ──
//
// Describes *how* to talk to one Miele cloud account: where, in which
// language, and with which timing. Never touches disk; the CLI builds
// an `AccountConfig` from its profile and hands it in.

use std::time::Duration;

use miele_api::{ListenerConfig, TransportConfig};
use url::Url;

/// Retry budget for one polling fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Bound on the `GET /devices` request itself.
    pub read_timeout: Duration,
    /// Pause before re-issuing a request that timed out.
    pub timeout_retry_delay: Duration,
    /// Consecutive timeouts after which the cycle fails fatally.
    pub max_timeouts: u32,
    /// The consecutive 401 that signals "re-authentication required".
    pub max_auth_failures: u32,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(20),
            timeout_retry_delay: Duration::from_secs(10),
            max_timeouts: 3,
            max_auth_failures: 5,
        }
    }
}

/// Configuration for one account.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// API base URL including the version prefix, e.g. `https://api.mcs3.miele.com/v1`.
    pub api_url: Url,
    /// Language for localized values (`?language=`).
    pub language: String,
    pub fetch: FetchPolicy,
    /// Interval of the background poll task. Zero disables polling.
    pub poll_interval: Duration,
    pub listener: ListenerConfig,
    pub transport: TransportConfig,
}

impl AccountConfig {
    /// Defaults for everything but the base URL.
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            language: "en".into(),
            fetch: FetchPolicy::default(),
            poll_interval: Duration::from_secs(60),
            listener: ListenerConfig::default(),
            transport: TransportConfig::default(),
        }
    }

    /// Parse `api_url` and apply defaults.
    pub fn from_url(api_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(api_url)?))
    }
}
