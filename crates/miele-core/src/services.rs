// ── Control services ──
//
// Typed wrappers around `PUT /devices/{serial}/actions`. Payloads are
// validated locally before anything goes on the wire; failures reported
// by the cloud come back as `CoreError::Rejected` (or
// `AuthenticationFailed` for a 401).

use miele_api::{MieleClient, TokenProvider};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::debug;

use crate::error::CoreError;

/// Program control actions (`processAction` codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessAction {
    Start,
    Stop,
    Pause,
    StartSuperfreezing,
    StopSuperfreezing,
    StartSupercooling,
    StopSupercooling,
}

impl ProcessAction {
    pub fn code(self) -> u8 {
        match self {
            Self::Start => 1,
            Self::Stop => 2,
            Self::Pause => 3,
            Self::StartSuperfreezing => 4,
            Self::StopSuperfreezing => 5,
            Self::StartSupercooling => 6,
            Self::StopSupercooling => 7,
        }
    }
}

/// Ambient light colours accepted by hoods and similar appliances.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AmbientColor {
    White,
    Blue,
    Red,
    Yellow,
    Orange,
    Green,
    Pink,
    Purple,
    Turquoise,
}

/// Free-form action with the fields the cloud understands.
///
/// Only fields that are set end up in the request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenericAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_action: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_off: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<AmbientColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modes: Option<u32>,
}

impl GenericAction {
    /// Check ranges and build the request body.
    pub fn to_payload(&self) -> Result<Value, CoreError> {
        if let Some(code) = self.process_action {
            if !(1..=10).contains(&code) {
                return Err(invalid(format!("processAction must be 1..=10, got {code}")));
            }
        }
        if let Some(light) = self.light {
            if !(1..=2).contains(&light) {
                return Err(invalid(format!("light must be 1 or 2, got {light}")));
            }
        }

        let payload =
            serde_json::to_value(self).map_err(|e| CoreError::Internal(e.to_string()))?;
        if payload.as_object().is_none_or(Map::is_empty) {
            return Err(invalid("action has no fields set".into()));
        }
        Ok(payload)
    }
}

// ── Service calls ────────────────────────────────────────────────────

pub async fn process_action<A: TokenProvider>(
    client: &MieleClient<A>,
    serial: &str,
    action: ProcessAction,
) -> Result<(), CoreError> {
    send(client, serial, &json!({ "processAction": action.code() })).await
}

pub async fn generic_action<A: TokenProvider>(
    client: &MieleClient<A>,
    serial: &str,
    action: &GenericAction,
) -> Result<(), CoreError> {
    let payload = action.to_payload()?;
    send(client, serial, &payload).await
}

/// Switch an appliance on (`powerOn`) or off (`powerOff`).
pub async fn set_power<A: TokenProvider>(
    client: &MieleClient<A>,
    serial: &str,
    on: bool,
) -> Result<(), CoreError> {
    let payload = if on {
        json!({ "powerOn": true })
    } else {
        json!({ "powerOff": true })
    };
    send(client, serial, &payload).await
}

pub async fn set_target_temperature<A: TokenProvider>(
    client: &MieleClient<A>,
    serial: &str,
    temperature: f64,
    zone: u8,
) -> Result<(), CoreError> {
    check_serial(serial)?;
    if !temperature.is_finite() {
        return Err(invalid(format!("temperature must be a number, got {temperature}")));
    }
    client.set_target_temperature(serial, temperature, zone).await?;
    Ok(())
}

/// Send an arbitrary JSON object unchanged.
pub async fn raw<A: TokenProvider>(
    client: &MieleClient<A>,
    serial: &str,
    payload: &Value,
) -> Result<(), CoreError> {
    if !payload.is_object() {
        return Err(invalid("raw action must be a JSON object".into()));
    }
    send(client, serial, payload).await
}

async fn send<A: TokenProvider>(
    client: &MieleClient<A>,
    serial: &str,
    payload: &Value,
) -> Result<(), CoreError> {
    check_serial(serial)?;
    let resp = client.send_action(serial, payload).await?;
    debug!(serial, status = resp.status().as_u16(), "action accepted");
    Ok(())
}

fn check_serial(serial: &str) -> Result<(), CoreError> {
    if serial.trim().is_empty() {
        return Err(invalid("serial number must not be empty".into()));
    }
    Ok(())
}

fn invalid(message: String) -> CoreError {
    CoreError::ValidationFailed { message }
}
