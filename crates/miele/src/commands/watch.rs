//! `watch`: bring an account up and print device changes until Ctrl-C.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Local;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use miele_core::{Account, AccountState, FlatDevice, StaticToken};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output::{self, scalar_to_string};

type Snapshot = BTreeMap<String, Arc<FlatDevice>>;

pub async fn handle(
    account: &Account<StaticToken>,
    args: &WatchArgs,
    global: &GlobalOpts,
    format: OutputFormat,
) -> Result<(), CliError> {
    if let Err(e) = account.setup().await {
        account.unload().await;
        return Err(e.into());
    }

    let result = follow(account, args, global, format).await;
    account.unload().await;
    result
}

async fn follow(
    account: &Account<StaticToken>,
    args: &WatchArgs,
    global: &GlobalOpts,
    format: OutputFormat,
) -> Result<(), CliError> {
    let store = account.store();
    let mut updates = store.subscribe();
    let mut state = account.state();

    let mut last = Snapshot::new();
    print_changes(&mut last, store.devices_snapshot(), args, global, format);
    if !global.quiet {
        eprintln!("Watching {} device(s), Ctrl-C to stop", store.device_count());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                debug!("interrupted");
                return Ok(());
            }
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *state.borrow_and_update();
                match current {
                    AccountState::ReauthRequired => {
                        warn!("access token keeps being rejected; run `miele config set-token`");
                    }
                    AccountState::Degraded => warn!("device refresh failed, waiting for recovery"),
                    AccountState::Unloaded => return Ok(()),
                    AccountState::Initializing | AccountState::Ready => {}
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                print_changes(&mut last, store.devices_snapshot(), args, global, format);
            }
        }
    }
}

/// Print every key that differs from `last`, then remember `next`.
fn print_changes(
    last: &mut Snapshot,
    next: Snapshot,
    args: &WatchArgs,
    global: &GlobalOpts,
    format: OutputFormat,
) {
    for (serial, device) in &next {
        if args.serial.as_ref().is_some_and(|s| s != serial) {
            continue;
        }
        let previous = last.get(serial);
        if previous.is_some_and(|p| Arc::ptr_eq(p, device)) {
            continue;
        }
        let changes = diff(previous.map(|p| &**p), device);
        if changes.is_empty() {
            continue;
        }
        output::print_output(&render(serial, &changes, format), global.quiet);
    }
    *last = next;
}

fn diff(previous: Option<&FlatDevice>, current: &FlatDevice) -> Map<String, Value> {
    current
        .iter()
        .filter(|(key, value)| previous.and_then(|p| p.get(*key)) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn render(serial: &str, changes: &Map<String, Value>, format: OutputFormat) -> String {
    let time = Local::now().format("%H:%M:%S").to_string();
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            let event = serde_json::json!({ "time": time, "serial": serial, "changes": changes });
            // One event per line so the stream stays machine-readable.
            output::render_json(&event, true)
        }
        OutputFormat::Table | OutputFormat::Plain => changes
            .iter()
            .map(|(key, value)| format!("{time} {serial} {key}={}", scalar_to_string(value)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn diff_reports_added_and_changed_keys_only() {
        let before = FlatDevice::from([
            ("state|status|value_raw".to_owned(), json!(1)),
            ("ident|deviceName".to_owned(), json!("Kitchen")),
        ]);
        let after = FlatDevice::from([
            ("state|status|value_raw".to_owned(), json!(5)),
            ("ident|deviceName".to_owned(), json!("Kitchen")),
            ("state|remainingTime|0".to_owned(), json!(1)),
        ]);

        let changes = diff(Some(&before), &after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["state|status|value_raw"], json!(5));
        assert!(changes.contains_key("state|remainingTime|0"));
        assert_eq!(diff(None, &after).len(), 3);
    }

    #[test]
    fn plain_lines_name_serial_and_key() {
        let mut changes = Map::new();
        changes.insert("state|status|value_raw".into(), json!(5));
        let line = render("711934968", &changes, OutputFormat::Plain);
        assert!(line.ends_with("711934968 state|status|value_raw=5"));
    }
}
