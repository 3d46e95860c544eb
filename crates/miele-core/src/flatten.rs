// ── Device state flattening ──
//
// The cloud reports each appliance as a nested object (`ident.*`,
// `state.*`). Consumers address individual values by a pipe-joined
// path instead, e.g. `state|temperature|0|value_raw`. Array elements
// contribute their index as a path segment.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Separator between path segments.
pub const DELIMITER: char = '|';

/// One appliance: flat path → leaf value. Ordered, so output is deterministic.
pub type FlatDevice = BTreeMap<String, Value>;

/// Flattened appliances keyed by serial number.
pub type DeviceMap = BTreeMap<String, FlatDevice>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    #[error("expected a JSON object or array, found {found}")]
    NotAContainer { found: &'static str },

    #[error("device {serial}: {source}")]
    Device {
        serial: String,
        #[source]
        source: Box<FlattenError>,
    },
}

/// Flatten one nested object or array.
///
/// Scalars and `null` become leaves. Empty objects and arrays nested below
/// the top level are kept as leaves holding the empty container, so no path
/// disappears. A scalar at the top level has no path to live under and is
/// rejected.
pub fn flatten(value: &Value) -> Result<FlatDevice, FlattenError> {
    let mut out = FlatDevice::new();
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk(child, key.clone(), &mut out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk(child, index.to_string(), &mut out);
            }
        }
        other => {
            return Err(FlattenError::NotAContainer {
                found: kind(other),
            });
        }
    }
    Ok(out)
}

fn walk(value: &Value, path: String, out: &mut FlatDevice) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                walk(child, format!("{path}{DELIMITER}{key}"), out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                walk(child, format!("{path}{DELIMITER}{index}"), out);
            }
        }
        leaf => {
            out.insert(path, leaf.clone());
        }
    }
}

/// Flatten a `{serial: device}` payload as returned by `GET /devices` and
/// carried by `devices` stream events.
pub fn flatten_devices(payload: &Value) -> Result<DeviceMap, FlattenError> {
    let Value::Object(devices) = payload else {
        return Err(FlattenError::NotAContainer {
            found: kind(payload),
        });
    };

    devices
        .iter()
        .map(|(serial, device)| {
            flatten(device)
                .map(|flat| (serial.clone(), flat))
                .map_err(|e| FlattenError::Device {
                    serial: serial.clone(),
                    source: Box::new(e),
                })
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
