//! Device command handlers.

use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;

use miele_core::appliance::device_status;
use miele_core::{Account, Classification, CoreError, FetchOutcome, FlatDevice, StaticToken, classify};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

const NAME_KEY: &str = "ident|deviceName";
const TYPE_LABEL_KEY: &str = "ident|type|value_localized";

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DeviceSummary {
    serial: String,
    #[serde(rename = "type")]
    kind: String,
    status: Option<String>,
    name: String,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl From<&DeviceSummary> for DeviceRow {
    fn from(d: &DeviceSummary) -> Self {
        Self {
            serial: d.serial.clone(),
            kind: d.kind.clone(),
            status: d.status.clone().unwrap_or_else(|| "-".into()),
            name: d.name.clone(),
        }
    }
}

fn summarize(serial: &str, device: &FlatDevice) -> DeviceSummary {
    let kind = match classify(device) {
        Classification::Supported(t) => t.to_string(),
        Classification::Professional(t) => format!("{t} (professional)"),
        Classification::Unknown(code) => format!("unknown ({code})"),
        Classification::Missing => "-".into(),
    };

    // Users can name appliances in the app; fall back to the localized type.
    let name = [NAME_KEY, TYPE_LABEL_KEY]
        .iter()
        .filter_map(|key| device.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or("-")
        .to_owned();

    DeviceSummary {
        serial: serial.to_owned(),
        kind,
        status: device_status(device),
        name,
    }
}

/// One fetch cycle into the account's store.
async fn refresh(account: &Account<StaticToken>) -> Result<(), CliError> {
    match account.refresh().await {
        FetchOutcome::Success(_) => Ok(()),
        FetchOutcome::Retryable(failure) | FetchOutcome::Fatal(failure) => {
            Err(CoreError::from(failure).into())
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    account: &Account<StaticToken>,
    args: DevicesArgs,
    global: &GlobalOpts,
    format: OutputFormat,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List => {
            refresh(account).await?;
            let devices: Vec<DeviceSummary> = account
                .store()
                .devices_snapshot()
                .iter()
                .map(|(serial, device)| summarize(serial, device))
                .collect();
            let out = output::render_list(
                format,
                &devices,
                |d| DeviceRow::from(d),
                |d| d.serial.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { serial } => {
            refresh(account).await?;
            let device = account.device(&serial)?;
            let out = output::render_map(format, &*device, device.iter());
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Actions { serial } => {
            let actions = account
                .client()
                .get_actions(&serial)
                .await
                .map_err(CoreError::from)?;
            let out = match actions {
                Value::Object(ref map) => output::render_map(format, &actions, map),
                ref other => output::render_json(other, format == OutputFormat::JsonCompact),
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn device(pairs: &[(&str, Value)]) -> FlatDevice {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn summary_prefers_user_given_name() {
        let d = device(&[
            ("ident|type|value_raw", json!(21)),
            ("ident|type|value_localized", json!("Fridge freezer")),
            ("ident|deviceName", json!("Garage")),
            ("state|status|value_raw", json!(5)),
        ]);
        let s = summarize("711934968", &d);
        assert_eq!(s.kind, "fridge_freezer");
        assert_eq!(s.status.as_deref(), Some("running"));
        assert_eq!(s.name, "Garage");
    }

    #[test]
    fn summary_falls_back_to_localized_type() {
        let d = device(&[
            ("ident|type|value_raw", json!(9999)),
            ("ident|type|value_localized", json!("Mystery")),
            ("ident|deviceName", json!("")),
        ]);
        let s = summarize("000001", &d);
        assert_eq!(s.kind, "unknown (9999)");
        assert_eq!(s.status, None);
        assert_eq!(s.name, "Mystery");
    }
}
