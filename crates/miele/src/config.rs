//! CLI configuration: thin wrapper around `miele_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api-url, --access-token, --language, --timeout).

use secrecy::SecretString;

use miele_core::AccountConfig;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use miele_config::{Config, Profile, config_path, load_config_or_default};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Look up the active profile.
///
/// A missing profile is only an error when it was asked for explicitly;
/// otherwise the built-in defaults (public cloud URL) apply.
pub fn active_profile(global: &GlobalOpts, config: &Config) -> Result<(String, Profile), CliError> {
    let name = active_profile_name(global, config);
    if let Some(profile) = config.profiles.get(&name) {
        return Ok((name, profile.clone()));
    }
    if global.profile.is_some() {
        let mut available: Vec<_> = config.profiles.keys().cloned().collect();
        available.sort();
        return Err(CliError::ProfileNotFound {
            name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
            path: config_path().display().to_string(),
        });
    }
    Ok((name, Profile::default()))
}

/// Translate profile + global flags into an `AccountConfig` and token.
///
/// CLI flag overrides take priority over profile values.
pub fn resolve_account(
    global: &GlobalOpts,
    config: &Config,
) -> Result<(AccountConfig, SecretString), CliError> {
    let (name, mut profile) = active_profile(global, config)?;

    // 1. API URL (flag > env > profile)
    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }

    // 2. Language and timeout
    if let Some(ref language) = global.language {
        profile.language = Some(language.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.read_timeout = Some(timeout);
    }

    let mut account = miele_config::profile_to_account_config(&profile, &config.defaults)?;
    account.transport = account
        .transport
        .with_agent_suffix(concat!("miele-cli/", env!("CARGO_PKG_VERSION")));

    // 3. Token (flag > env > profile chain)
    let token = match global.access_token {
        Some(ref token) => SecretString::from(token.clone()),
        None => miele_config::resolve_access_token(&profile, &name)?,
    };

    Ok((account, token))
}

/// Output format from the flag, falling back to `defaults.output`.
pub fn output_format(global: &GlobalOpts, config: &Config) -> OutputFormat {
    use clap::ValueEnum;

    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&config.defaults.output, true).unwrap_or(OutputFormat::Table)
    })
}

