//! Config subcommand handlers.

use std::io::BufRead;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

/// Format config for display, masking the plaintext token.
fn format_config_redacted(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "language = \"{}\"", cfg.defaults.language);
    let _ = writeln!(out, "read_timeout = {}", cfg.defaults.read_timeout);
    let _ = writeln!(out, "poll_interval = {}", cfg.defaults.poll_interval);
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "api_url = \"{}\"", p.api_url);
        if let Some(ref language) = p.language {
            let _ = writeln!(out, "language = \"{language}\"");
        }
        if p.access_token.is_some() {
            let _ = writeln!(out, "access_token = \"****\"");
        }
        if let Some(ref env) = p.access_token_env {
            let _ = writeln!(out, "access_token_env = \"{env}\"");
        }
        if let Some(timeout) = p.read_timeout {
            let _ = writeln!(out, "read_timeout = {timeout}");
        }
        if let Some(interval) = p.poll_interval {
            let _ = writeln!(out, "poll_interval = {interval}");
        }
    }

    out
}

fn read_token(from_stdin: bool) -> Result<String, CliError> {
    let token = if from_stdin {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        line
    } else {
        rpassword::prompt_password("Access token: ")?
    };
    let token = token.trim().to_owned();
    if token.is_empty() {
        return Err(CliError::Validation {
            field: "access_token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load_config_or_default();

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            output::print_output(format_config_redacted(&cfg).trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetToken { stdin } => {
            let profile_name = config::active_profile_name(global, &cfg);
            let token = read_token(stdin)?;
            miele_config::store_access_token(&profile_name, &token)?;
            if !global.quiet {
                eprintln!("✓ access token stored in system keyring for profile '{profile_name}'");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use miele_config::Profile;

    use super::*;

    #[test]
    fn redacted_config_hides_plaintext_token() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "home".into(),
            Profile {
                access_token: Some("super-secret".into()),
                access_token_env: Some("HOME_TOKEN".into()),
                ..Profile::default()
            },
        );

        let shown = format_config_redacted(&cfg);
        assert!(shown.contains("[profiles.home]"));
        assert!(shown.contains("access_token = \"****\""));
        assert!(shown.contains("access_token_env = \"HOME_TOKEN\""));
        assert!(!shown.contains("super-secret"));
    }
}
