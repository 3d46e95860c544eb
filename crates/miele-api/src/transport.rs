// Shared transport configuration for building the reqwest::Client.
//
// The REST calls and the event stream share one client. The client has no
// overall request timeout: the event stream is expected to stay open
// indefinitely, so only the connect phase is bounded here and per-call
// deadlines are applied by the callers.

use std::time::Duration;

use crate::error::Error;

/// Default base URL of the Miele 3rd-party API.
pub const MIELE_API: &str = "https://api.mcs3.miele.com/v1";

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on TCP + TLS connection establishment.
    pub connect_timeout: Duration,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: default_user_agent(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| Error::ClientBuild(e.to_string()))
    }

    /// Append an agent suffix (e.g. the embedding application) to the user agent.
    pub fn with_agent_suffix(mut self, suffix: &str) -> Self {
        self.user_agent = format!("{} {suffix}", self.user_agent);
        self
    }
}

fn default_user_agent() -> String {
    format!("miele-api/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_suffix_is_appended() {
        let config = TransportConfig::default().with_agent_suffix("miele-cli/0.1.0");
        assert!(config.user_agent.starts_with("miele-api/"));
        assert!(config.user_agent.ends_with(" miele-cli/0.1.0"));
    }

    #[test]
    fn default_client_builds() {
        assert!(TransportConfig::default().build_client().is_ok());
    }
}
