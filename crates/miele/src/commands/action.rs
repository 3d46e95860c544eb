//! Action command handlers.

use serde_json::Value;

use miele_core::{Account, GenericAction, ProcessAction, StaticToken};

use crate::cli::{ActionArgs, ActionCommand, GlobalOpts, PowerState};
use crate::error::CliError;

pub async fn handle(
    account: &Account<StaticToken>,
    args: ActionArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (serial, done) = match args.command {
        ActionCommand::Process { serial, action } => {
            let parsed: ProcessAction = action.parse().map_err(|_| CliError::Validation {
                field: "action".into(),
                reason: format!("unknown process action '{action}'"),
            })?;
            account.process_action(&serial, parsed).await?;
            (serial, format!("{parsed} sent"))
        }

        ActionCommand::Temperature {
            serial,
            value,
            zone,
        } => {
            if zone == 0 {
                return Err(CliError::Validation {
                    field: "zone".into(),
                    reason: "zones are numbered from 1".into(),
                });
            }
            account.set_target_temperature(&serial, value, zone).await?;
            (serial, format!("zone {zone} target set to {value}°C"))
        }

        ActionCommand::Power { serial, state } => {
            let on = state == PowerState::On;
            account.set_power(&serial, on).await?;
            (serial, format!("power {}", if on { "on" } else { "off" }))
        }

        ActionCommand::Generic { serial, json } => {
            let action: GenericAction = serde_json::from_str(&json)?;
            account.generic_action(&serial, &action).await?;
            (serial, "action sent".to_owned())
        }

        ActionCommand::Raw { serial, json } => {
            let payload: Value = serde_json::from_str(&json)?;
            account.raw_action(&serial, &payload).await?;
            (serial, "raw action sent".to_owned())
        }
    };

    if !global.quiet {
        eprintln!("{serial}: {done}");
    }
    Ok(())
}
