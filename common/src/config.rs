use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    channel::{ChannelBank, RelayOutput, CHANNEL_COUNT, DEFAULT_THRESHOLD_OFF_C, DEFAULT_THRESHOLD_ON_C},
    error::StorageError,
    session::KeyValueStore,
    types::{ChannelMode, ChannelRole},
};

pub const SETTINGS_KEY: &str = "settings";
pub const MIN_UPDATE_FREQUENCY_SECONDS: u32 = 5;
pub const MAX_UPDATE_FREQUENCY_SECONDS: u32 = 300;
pub const DEFAULT_UPDATE_FREQUENCY_SECONDS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    pub heartbeat_interval_ms: u64,
    pub telemetry_interval_ms: u64,
    pub command_poll_interval_ms: u64,
    pub registration_retry_ms: u64,
    pub request_timeout_ms: u64,
    pub sensor_id: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 60_000,
            telemetry_interval_ms: 60_000,
            command_poll_interval_ms: 30_000,
            registration_retry_ms: 30_000,
            request_timeout_ms: 15_000,
            sensor_id: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub firmware_version: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.1.100:8000".to_string(),
            api_key: String::new(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Persisted channel configuration and display preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub modes: [ChannelMode; CHANNEL_COUNT],
    pub roles: [ChannelRole; CHANNEL_COUNT],
    #[serde(rename = "tempOn")]
    pub temp_on: [f32; CHANNEL_COUNT],
    #[serde(rename = "tempOff")]
    pub temp_off: [f32; CHANNEL_COUNT],
    #[serde(rename = "updateFrequencySeconds")]
    pub update_frequency_seconds: u32,
    #[serde(rename = "useFahrenheit")]
    pub use_fahrenheit: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            modes: [ChannelMode::ForceOff; CHANNEL_COUNT],
            roles: [ChannelRole::Heating; CHANNEL_COUNT],
            temp_on: [DEFAULT_THRESHOLD_ON_C; CHANNEL_COUNT],
            temp_off: [DEFAULT_THRESHOLD_OFF_C; CHANNEL_COUNT],
            update_frequency_seconds: DEFAULT_UPDATE_FREQUENCY_SECONDS,
            use_fahrenheit: false,
        }
    }
}

impl Settings {
    pub fn sanitize(&mut self) {
        self.update_frequency_seconds = clamp_update_frequency(self.update_frequency_seconds);

        for threshold in &mut self.temp_on {
            if !threshold.is_finite() {
                *threshold = DEFAULT_THRESHOLD_ON_C;
            }
        }
        for threshold in &mut self.temp_off {
            if !threshold.is_finite() {
                *threshold = DEFAULT_THRESHOLD_OFF_C;
            }
        }
    }

    /// Snapshot of the bank's configuration. Output states are not persisted.
    pub fn capture<O: RelayOutput>(
        bank: &ChannelBank<O>,
        update_frequency_seconds: u32,
        use_fahrenheit: bool,
    ) -> Self {
        let mut settings = Self {
            update_frequency_seconds,
            use_fahrenheit,
            ..Self::default()
        };
        for (index, channel) in bank.channels().iter().enumerate() {
            settings.modes[index] = channel.mode;
            settings.roles[index] = channel.role;
            settings.temp_on[index] = channel.threshold_on;
            settings.temp_off[index] = channel.threshold_off;
        }
        settings
    }

    pub fn apply_to<O: RelayOutput>(&self, bank: &mut ChannelBank<O>) {
        for index in 0..CHANNEL_COUNT {
            bank.set_mode(index, self.modes[index]);
            bank.set_role(index, self.roles[index]);
            bank.set_thresholds(index, self.temp_on[index], self.temp_off[index]);
        }
    }

    /// Missing or unreadable records fall back to defaults.
    pub fn load<K: KeyValueStore>(store: &K) -> Result<Self, StorageError> {
        let Some(raw) = store.read(SETTINGS_KEY)? else {
            return Ok(Self::default());
        };

        let mut settings = match serde_json::from_str::<Self>(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("stored settings unreadable ({err}); using defaults");
                Self::default()
            }
        };
        settings.sanitize();
        Ok(settings)
    }

    pub fn save<K: KeyValueStore>(&self, store: &K) -> Result<(), StorageError> {
        let raw = serde_json::to_string(self).map_err(|err| StorageError(err.to_string()))?;
        store.write(SETTINGS_KEY, &raw)
    }
}

pub fn clamp_update_frequency(seconds: u32) -> u32 {
    seconds.clamp(MIN_UPDATE_FREQUENCY_SECONDS, MAX_UPDATE_FREQUENCY_SECONDS)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub hostname: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            hostname: "multizone-thermostat".to_string(),
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub control: ControlConfig,
    pub api: ApiConfig,
    pub settings: Settings,
    pub network: NetworkConfig,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::{MemoryStore, RecordingRelays};

    #[test]
    fn sanitize_clamps_frequency_and_repairs_thresholds() {
        let mut settings = Settings {
            update_frequency_seconds: 1,
            temp_on: [f32::NAN, 20.0, 21.0, f32::INFINITY],
            ..Settings::default()
        };

        settings.sanitize();

        assert_eq!(settings.update_frequency_seconds, 5);
        assert_eq!(settings.temp_on, [25.0, 20.0, 21.0, 25.0]);

        settings.update_frequency_seconds = 3_600;
        settings.sanitize();
        assert_eq!(settings.update_frequency_seconds, 300);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let value = serde_json::to_value(Settings::default()).unwrap();

        assert_eq!(value["modes"][0], "MANUAL_OFF");
        assert_eq!(value["roles"][3], "HEATING");
        assert_eq!(value["tempOn"][1], 25.0);
        assert_eq!(value["tempOff"][2], 23.0);
        assert_eq!(value["updateFrequencySeconds"], 5);
        assert_eq!(value["useFahrenheit"], false);
    }

    #[test]
    fn save_then_load_restores_bank_configuration() {
        let store = MemoryStore::default();
        let mut bank = ChannelBank::new(RecordingRelays::default());
        bank.set_mode(1, ChannelMode::Auto);
        bank.set_role(1, ChannelRole::Cooling);
        bank.set_thresholds(1, 27.0, 24.5);

        Settings::capture(&bank, 60, true).save(&store).unwrap();

        let loaded = Settings::load(&store).unwrap();
        let mut restored = ChannelBank::new(RecordingRelays::default());
        loaded.apply_to(&mut restored);

        assert_eq!(restored.channels(), bank.channels());
        assert_eq!(loaded.update_frequency_seconds, 60);
        assert!(loaded.use_fahrenheit);
    }

    #[test]
    fn corrupt_or_partial_records_fall_back_to_defaults() {
        let store = MemoryStore::default();

        store.write(SETTINGS_KEY, "{not json").unwrap();
        assert_eq!(Settings::load(&store).unwrap(), Settings::default());

        store.write(SETTINGS_KEY, r#"{"updateFrequencySeconds": 2}"#).unwrap();
        let partial = Settings::load(&store).unwrap();
        assert_eq!(partial.update_frequency_seconds, 5);
        assert_eq!(partial.modes, [ChannelMode::ForceOff; CHANNEL_COUNT]);
    }

    #[test]
    fn missing_record_loads_defaults() {
        assert_eq!(Settings::load(&MemoryStore::default()).unwrap(), Settings::default());
    }
}
