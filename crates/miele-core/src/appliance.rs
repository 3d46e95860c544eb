// ── Appliance classification ──
//
// Maps the `ident|type|value_raw` code of a flattened device to a known
// appliance type. Classification drives logging and display only; a
// device of an unknown or unsupported type is still fetched and stored.

use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::flatten::FlatDevice;

/// Flat key holding the numeric appliance type.
pub const TYPE_KEY: &str = "ident|type|value_raw";
/// Flat key holding the numeric operating status.
pub const STATUS_KEY: &str = "state|status|value_raw";

/// Appliance types reported by the cloud, by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ApplianceType {
    WashingMachine,
    TumbleDryer,
    WashingMachineSemiProfessional,
    TumbleDryerSemiProfessional,
    WashingMachineProfessional,
    DryerProfessional,
    Dishwasher,
    DishwasherSemiProfessional,
    DishwasherProfessional,
    Oven,
    OvenMicrowave,
    HobHighlight,
    SteamOven,
    Microwave,
    CoffeeSystem,
    Hood,
    Fridge,
    Freezer,
    FridgeFreezer,
    RobotVacuumCleaner,
    WasherDryer,
    DishWarmer,
    HobInduction,
    SteamOvenCombi,
    WineCabinet,
    WineConditioningUnit,
    WineStorageConditioningUnit,
    SteamOvenMicro,
    DialogOven,
    WineCabinetFreezer,
    HobWithVapourExtraction,
}

impl ApplianceType {
    pub fn code(self) -> u32 {
        match self {
            Self::WashingMachine => 1,
            Self::TumbleDryer => 2,
            Self::WashingMachineSemiProfessional => 3,
            Self::TumbleDryerSemiProfessional => 4,
            Self::WashingMachineProfessional => 5,
            Self::DryerProfessional => 6,
            Self::Dishwasher => 7,
            Self::DishwasherSemiProfessional => 8,
            Self::DishwasherProfessional => 9,
            Self::Oven => 12,
            Self::OvenMicrowave => 13,
            Self::HobHighlight => 14,
            Self::SteamOven => 15,
            Self::Microwave => 16,
            Self::CoffeeSystem => 17,
            Self::Hood => 18,
            Self::Fridge => 19,
            Self::Freezer => 20,
            Self::FridgeFreezer => 21,
            Self::RobotVacuumCleaner => 23,
            Self::WasherDryer => 24,
            Self::DishWarmer => 25,
            Self::HobInduction => 27,
            Self::SteamOvenCombi => 31,
            Self::WineCabinet => 32,
            Self::WineConditioningUnit => 33,
            Self::WineStorageConditioningUnit => 34,
            Self::SteamOvenMicro => 45,
            Self::DialogOven => 67,
            Self::WineCabinetFreezer => 68,
            Self::HobWithVapourExtraction => 74,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::iter().find(|t| u64::from(t.code()) == code)
    }

    /// (Semi-)professional product lines, which the 3rd-party API does not support.
    pub fn is_professional(self) -> bool {
        matches!(
            self,
            Self::WashingMachineSemiProfessional
                | Self::TumbleDryerSemiProfessional
                | Self::WashingMachineProfessional
                | Self::DryerProfessional
                | Self::DishwasherSemiProfessional
                | Self::DishwasherProfessional
        )
    }
}

/// Outcome of classifying one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Supported(ApplianceType),
    Professional(ApplianceType),
    Unknown(u64),
    /// No numeric type code in the record.
    Missing,
}

pub fn appliance_code(device: &FlatDevice) -> Option<u64> {
    device.get(TYPE_KEY).and_then(Value::as_u64)
}

pub fn classify(device: &FlatDevice) -> Classification {
    let Some(code) = appliance_code(device) else {
        return Classification::Missing;
    };
    match ApplianceType::from_code(code) {
        Some(t) if t.is_professional() => Classification::Professional(t),
        Some(t) => Classification::Supported(t),
        None => Classification::Unknown(code),
    }
}

/// Name of a `state|status|value_raw` code.
pub fn status_name(code: u64) -> Option<&'static str> {
    Some(match code {
        0 => "reserved",
        1 => "off",
        2 => "on",
        3 => "programmed",
        4 => "waiting_to_start",
        5 => "running",
        6 => "pause",
        7 => "program_ended",
        8 => "failure",
        9 => "program_interrupted",
        10 => "idle",
        11 => "rinse_hold",
        12 => "service",
        13 => "superfreezing",
        14 => "supercooling",
        15 => "superheating",
        146 => "supercooling_superfreezing",
        255 => "not_connected",
        _ => return None,
    })
}

/// Status of a flattened device, by name when the code is known.
pub fn device_status(device: &FlatDevice) -> Option<String> {
    let code = device.get(STATUS_KEY).and_then(Value::as_u64)?;
    Some(status_name(code).map_or_else(|| code.to_string(), str::to_owned))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn with_type(code: Value) -> FlatDevice {
        FlatDevice::from([(TYPE_KEY.to_owned(), code)])
    }

    #[test]
    fn codes_round_trip() {
        for t in ApplianceType::iter() {
            assert_eq!(ApplianceType::from_code(u64::from(t.code())), Some(t));
        }
        assert_eq!(ApplianceType::from_code(74), Some(ApplianceType::HobWithVapourExtraction));
        assert_eq!(ApplianceType::from_code(22), None);
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(ApplianceType::FridgeFreezer.to_string(), "fridge_freezer");
        assert_eq!(
            "robot_vacuum_cleaner".parse::<ApplianceType>().ok(),
            Some(ApplianceType::RobotVacuumCleaner)
        );
    }

    #[test]
    fn classifies_devices() {
        assert_eq!(
            classify(&with_type(json!(21))),
            Classification::Supported(ApplianceType::FridgeFreezer)
        );
        assert_eq!(
            classify(&with_type(json!(9))),
            Classification::Professional(ApplianceType::DishwasherProfessional)
        );
        assert_eq!(classify(&with_type(json!(73))), Classification::Unknown(73));
        assert_eq!(classify(&with_type(json!("21"))), Classification::Missing);
        assert_eq!(classify(&FlatDevice::new()), Classification::Missing);
    }

    #[test]
    fn status_by_name_or_code() {
        let mut device = FlatDevice::new();
        device.insert(STATUS_KEY.into(), json!(5));
        assert_eq!(device_status(&device).as_deref(), Some("running"));

        device.insert(STATUS_KEY.into(), json!(99));
        assert_eq!(device_status(&device).as_deref(), Some("99"));
    }
}
