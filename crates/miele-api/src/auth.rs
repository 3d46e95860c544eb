use std::future::Future;

use secrecy::SecretString;

use crate::error::Error;

/// Source of bearer tokens for the Miele API.
///
/// The client never stores or refreshes tokens itself. It asks the provider
/// immediately before building each request; the provider decides whether a
/// refresh is due. Implementations must tolerate concurrent callers, since
/// the poller and the event listener share one provider.
pub trait TokenProvider: Send + Sync + 'static {
    /// Return a currently valid access token.
    fn access_token(&self) -> impl Future<Output = Result<SecretString, Error>> + Send;
}

/// A fixed, externally managed access token.
///
/// Used by the CLI, where the token comes from the environment, the system
/// keyring, or the config file and is never refreshed in-process.
#[derive(Clone)]
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken").finish_non_exhaustive()
    }
}

impl TokenProvider for StaticToken {
    fn access_token(&self) -> impl Future<Output = Result<SecretString, Error>> + Send {
        let token = self.token.clone();
        async move { Ok(token) }
    }
}
