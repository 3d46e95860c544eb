//! Command dispatch: bridges CLI args -> account operations -> output formatting.

pub mod action;
pub mod config_cmd;
pub mod devices;
pub mod watch;

use std::time::Duration;

use secrecy::SecretString;

use miele_core::{Account, AccountConfig, StaticToken};

use crate::cli::{Command, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Dispatch a cloud-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    mut config: AccountConfig,
    token: SecretString,
    global: &GlobalOpts,
    format: OutputFormat,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => {
            let account = Account::new(config, StaticToken::new(token))?;
            devices::handle(&account, args, global, format).await
        }
        Command::Action(args) => {
            let account = Account::new(config, StaticToken::new(token))?;
            action::handle(&account, args, global).await
        }
        Command::Watch(args) => {
            if args.no_poll {
                config.poll_interval = Duration::ZERO;
            }
            let account = Account::new(config, StaticToken::new(token))?;
            watch::handle(&account, &args, global, format).await
        }
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
