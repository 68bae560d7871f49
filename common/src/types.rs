use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ChannelMode {
    Auto,
    ForceOn,
    ForceOff,
}

impl ChannelMode {
    pub const ALL: [Self; 3] = [Self::Auto, Self::ForceOn, Self::ForceOff];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::ForceOn => "MANUAL_ON",
            Self::ForceOff => "MANUAL_OFF",
        }
    }
}

impl FromStr for ChannelMode {
    type Err = ParseError;

    /// Accepts both the API spelling (`MANUAL_ON`) and the dashboard one (`ON`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(Self::Auto),
            "MANUAL_ON" | "ON" => Ok(Self::ForceOn),
            "MANUAL_OFF" | "OFF" => Ok(Self::ForceOff),
            _ => Err(ParseError::UnknownMode(value.to_string())),
        }
    }
}

impl TryFrom<String> for ChannelMode {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChannelMode> for &'static str {
    fn from(mode: ChannelMode) -> Self {
        mode.as_str()
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thermal function of a channel. Decides which way the hysteresis band points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ChannelRole {
    Heating,
    Cooling,
    Generic,
    ManualOnly,
}

impl ChannelRole {
    pub const ALL: [Self; 4] = [Self::Heating, Self::Cooling, Self::Generic, Self::ManualOnly];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heating => "HEATING",
            Self::Cooling => "COOLING",
            Self::Generic => "GENERIC",
            Self::ManualOnly => "MANUAL_ONLY",
        }
    }
}

impl FromStr for ChannelRole {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HEATING" => Ok(Self::Heating),
            "COOLING" => Ok(Self::Cooling),
            "GENERIC" => Ok(Self::Generic),
            "MANUAL_ONLY" => Ok(Self::ManualOnly),
            _ => Err(ParseError::UnknownRole(value.to_string())),
        }
    }
}

impl TryFrom<String> for ChannelRole {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChannelRole> for &'static str {
    fn from(role: ChannelRole) -> Self {
        role.as_str()
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub index: usize,
    pub state: bool,
    pub mode: &'static str,
    pub role: &'static str,
    #[serde(rename = "tempOn")]
    pub temp_on: f32,
    #[serde(rename = "tempOff")]
    pub temp_off: f32,
}

/// Status document served by the local API.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    /// Last validated reading in Celsius, `None` until the first good read.
    #[serde(rename = "currentTemp")]
    pub current_temp: Option<f32>,
    #[serde(rename = "displayTemp")]
    pub display_temp: Option<String>,
    pub unit: &'static str,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    #[serde(rename = "updateFrequency")]
    pub update_frequency: u32,
    #[serde(rename = "useFahrenheit")]
    pub use_fahrenheit: bool,
    pub registered: bool,
    #[serde(rename = "deviceId")]
    pub device_id: Option<u64>,
    #[serde(rename = "pendingCommands")]
    pub pending_commands: usize,
    pub relays: Vec<ChannelStatus>,
}
