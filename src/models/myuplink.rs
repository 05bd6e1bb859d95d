//! Records returned by the myUplink v2 API.
//!
//! Notes
//! - Decoding is schema-driven: every record denies unknown fields and requires the
//!   non-optional ones, so a changed payload fails loudly instead of being half-read.
//! - Measurement values use `rust_decimal::Decimal`; responses must be parsed with
//!   serde_json's `arbitrary_precision` so the textual value survives intact.
//! - Timestamps use `chrono` (`DateTime<Utc>`).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =====================
// Connection state
// =====================

/// Integer-coded on the wire (0/1). Some API versions send the name instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Unknown(i64),
}

impl ConnectionState {
    pub fn code(self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connected => 1,
            ConnectionState::Unknown(n) => n,
        }
    }

    pub fn from_code(n: i64) -> Self {
        match n {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connected,
            other => ConnectionState::Unknown(other),
        }
    }
}

impl serde::Serialize for ConnectionState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> serde::Deserialize<'de> for ConnectionState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{Error, Unexpected};

        // Buffer through Value: with arbitrary_precision a bare number is not a plain integer token.
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_i64()
                .map(ConnectionState::from_code)
                .ok_or_else(|| {
                    D::Error::invalid_value(Unexpected::Other("non-integer number"), &"a connection state code")
                }),
            Value::String(s) => match s.as_str() {
                "Disconnected" => Ok(ConnectionState::Disconnected),
                "Connected" => Ok(ConnectionState::Connected),
                other => Err(D::Error::invalid_value(Unexpected::Str(other), &"Connected or Disconnected")),
            },
            other => Err(D::Error::invalid_type(
                Unexpected::Other(value_kind(&other)),
                &"an integer or string connection state",
            )),
        }
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =====================
// Systems and devices
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct System {
    pub system_id: String,
    pub name: String,
    pub security_level: String,
    pub has_alarm: bool,
    pub country: String,
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Device {
    pub id: String,
    pub connection_state: ConnectionState,
    pub current_fw_version: String,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Product {
    pub serial_number: String,
    pub name: String,
}

/// Per-device detail, fetched separately from [`System::devices`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeviceInfo {
    pub id: String,
    pub connection_state: ConnectionState,
    pub firmware: Firmware,
    pub product: Product,
    #[serde(default)]
    pub available_features: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Firmware {
    pub current_fw_version: String,
    pub desired_fw_version: String,
}

// =====================
// Device points
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnumValue {
    pub value: String,
    pub text: String,
    #[serde(default)]
    pub icon: Option<String>,
}

/// One named, timestamped parameter reading of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DevicePoint {
    pub category: String,
    pub parameter_id: String,
    pub parameter_name: String,
    pub parameter_unit: String,
    pub writable: bool,
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
    pub str_val: String,
    #[serde(default)]
    pub smart_home_categories: Option<BTreeSet<String>>,
    #[serde(default)]
    pub min_value: Option<Decimal>,
    #[serde(default)]
    pub max_value: Option<Decimal>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub enum_values: Vec<EnumValue>,
    #[serde(default)]
    pub scale_value: Option<String>,
    #[serde(default)]
    pub zone_id: Option<i64>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// =====================
// Smart home
// =====================

/// Capability flags. The wire uses `sh-` prefixed keys; they are rewritten to `sh_` before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmartHomeCategories {
    #[serde(rename = "sh_energyMetered")]
    pub sh_energy_metered: bool,
    #[serde(rename = "sh_hwBoost")]
    pub sh_hw_boost: bool,
    #[serde(rename = "sh_hwTemp")]
    pub sh_hw_temp: bool,
    #[serde(rename = "sh_indoorCO2")]
    pub sh_indoor_co2: bool,
    #[serde(rename = "sh_indoorHumidity")]
    pub sh_indoor_humidity: bool,
    #[serde(rename = "sh_indoorSpHeat")]
    pub sh_indoor_sp_heat: bool,
    #[serde(rename = "sh_indoorSpCool")]
    pub sh_indoor_sp_cool: bool,
    #[serde(rename = "sh_indoorTemp")]
    pub sh_indoor_temp: bool,
    #[serde(rename = "sh_outdoorTemp")]
    pub sh_outdoor_temp: bool,
    #[serde(rename = "sh_poolTemp")]
    pub sh_pool_temp: bool,
    #[serde(rename = "sh_smartMode")]
    pub sh_smart_mode: bool,
    #[serde(rename = "sh_solarEnergyProducedDay")]
    pub sh_solar_energy_produced_day: bool,
    #[serde(rename = "sh_solarEnergyProducedWeek")]
    pub sh_solar_energy_produced_week: bool,
    #[serde(rename = "sh_solarEnergyProducedMonth")]
    pub sh_solar_energy_produced_month: bool,
    #[serde(rename = "sh_solarEnergyProducedYear")]
    pub sh_solar_energy_produced_year: bool,
    #[serde(rename = "sh_solarEnergyProducedTotal")]
    pub sh_solar_energy_produced_total: bool,
    #[serde(rename = "sh_ventBoost")]
    pub sh_vent_boost: bool,
    #[serde(rename = "sh_ventMode")]
    pub sh_vent_mode: bool,
    #[serde(rename = "sh_zones")]
    pub sh_zones: bool,
    #[serde(rename = "sh_zoneMode")]
    pub sh_zone_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SmartHomeZone {
    pub zone_id: String,
    pub name: String,
    pub command_only: bool,
    pub supported_modes: String,
    pub mode: String,
    #[serde(default)]
    pub temperature: Option<Decimal>,
    #[serde(default)]
    pub setpoint: Option<Decimal>,
    #[serde(default)]
    pub setpoint_heat: Option<Decimal>,
    #[serde(default)]
    pub setpoint_cool: Option<Decimal>,
    #[serde(default)]
    pub setpoint_range_min: Option<Decimal>,
    #[serde(default)]
    pub setpoint_range_max: Option<Decimal>,
    pub is_celsius: bool,
    #[serde(default)]
    pub indoor_co2: Option<Decimal>,
    #[serde(default)]
    pub indoor_humidity: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AidMode {
    pub aid_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SmartHomeMode {
    pub smart_home_mode: String,
}

// =====================
// Notifications and premium
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Notification {
    pub id: String,
    pub alarm_number: i64,
    pub device_id: String,
    pub severity: i64,
    pub status: String,
    pub created_datetime: DateTime<Utc>,
    pub status_history: Vec<StatusHistory>,
    pub header: String,
    pub description: String,
    pub equip_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatusHistory {
    pub status: String,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Subscription {
    pub valid_until: String,
    pub r#type: i64,
}

// =====================
// Updates
// =====================

/// Server-defined and open-ended; kept as a string-keyed map.
pub type DeviceUpdatePayload = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeviceUpdate {
    pub status: i64,
    #[serde(default)]
    pub payload: Vec<DeviceUpdatePayload>,
}
