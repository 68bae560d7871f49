use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    channel::CHANNEL_COUNT,
    error::CommandError,
    sync::PendingCommand,
    types::{ChannelMode, ChannelRole},
};

/// Remote command after validation. Relay indices are 0-based here; the wire
/// carries 1-based `relay_number`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    SetRelayMode {
        index: usize,
        mode: ChannelMode,
    },
    SetRelayRole {
        index: usize,
        role: ChannelRole,
    },
    SetThresholds {
        index: usize,
        threshold_on: f32,
        threshold_off: f32,
    },
    SetFrequency {
        seconds: u32,
    },
    SetUnit {
        fahrenheit: bool,
    },
    Restart,
}

#[derive(Deserialize)]
struct RelayModeParams {
    relay_number: u64,
    mode: ChannelMode,
}

#[derive(Deserialize)]
struct RelayRoleParams {
    relay_number: u64,
    #[serde(alias = "type")]
    role: ChannelRole,
}

#[derive(Deserialize)]
struct ThresholdParams {
    relay_number: u64,
    temp_on: f32,
    temp_off: f32,
}

#[derive(Deserialize)]
struct FrequencyParams {
    #[serde(alias = "frequency")]
    seconds: u32,
}

#[derive(Deserialize)]
struct UnitParams {
    #[serde(alias = "use_fahrenheit")]
    fahrenheit: bool,
}

impl DeviceCommand {
    pub fn parse(kind: &str, params: &str) -> Result<Self, CommandError> {
        match kind {
            "set_relay_mode" => {
                let p: RelayModeParams = decode(params)?;
                Ok(Self::SetRelayMode {
                    index: relay_index(p.relay_number)?,
                    mode: p.mode,
                })
            }
            "set_relay_type" => {
                let p: RelayRoleParams = decode(params)?;
                Ok(Self::SetRelayRole {
                    index: relay_index(p.relay_number)?,
                    role: p.role,
                })
            }
            "set_thresholds" => {
                let p: ThresholdParams = decode(params)?;
                if !p.temp_on.is_finite() || !p.temp_off.is_finite() {
                    return Err(CommandError::InvalidParams("thresholds must be finite".to_string()));
                }
                Ok(Self::SetThresholds {
                    index: relay_index(p.relay_number)?,
                    threshold_on: p.temp_on,
                    threshold_off: p.temp_off,
                })
            }
            "set_frequency" => {
                let p: FrequencyParams = decode(params)?;
                Ok(Self::SetFrequency { seconds: p.seconds })
            }
            "set_unit" => {
                let p: UnitParams = decode(params)?;
                Ok(Self::SetUnit {
                    fahrenheit: p.fahrenheit,
                })
            }
            "restart" => Ok(Self::Restart),
            other => Err(CommandError::UnknownType(other.to_string())),
        }
    }
}

impl TryFrom<&PendingCommand> for DeviceCommand {
    type Error = CommandError;

    fn try_from(command: &PendingCommand) -> Result<Self, Self::Error> {
        Self::parse(&command.kind, &command.params)
    }
}

fn decode<T: DeserializeOwned>(params: &str) -> Result<T, CommandError> {
    serde_json::from_str(params).map_err(|err| CommandError::InvalidParams(err.to_string()))
}

fn relay_index(relay_number: u64) -> Result<usize, CommandError> {
    match usize::try_from(relay_number) {
        Ok(number) if (1..=CHANNEL_COUNT).contains(&number) => Ok(number - 1),
        _ => Err(CommandError::RelayOutOfRange(relay_number)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_numbers_are_one_based() {
        assert_eq!(
            DeviceCommand::parse("set_relay_mode", r#"{"relay_number":1,"mode":"ON"}"#),
            Ok(DeviceCommand::SetRelayMode {
                index: 0,
                mode: ChannelMode::ForceOn,
            })
        );
        assert_eq!(
            DeviceCommand::parse("set_relay_type", r#"{"relay_number":4,"role":"COOLING"}"#),
            Ok(DeviceCommand::SetRelayRole {
                index: 3,
                role: ChannelRole::Cooling,
            })
        );
    }

    #[test]
    fn out_of_range_relays_are_rejected() {
        for number in [0, 5, 99] {
            let params = format!(r#"{{"relay_number":{number},"mode":"AUTO"}}"#);
            assert_eq!(
                DeviceCommand::parse("set_relay_mode", &params),
                Err(CommandError::RelayOutOfRange(number))
            );
        }
    }

    #[test]
    fn thresholds_parse_from_numbers() {
        assert_eq!(
            DeviceCommand::parse(
                "set_thresholds",
                r#"{"relay_number":2,"temp_on":21.5,"temp_off":19}"#
            ),
            Ok(DeviceCommand::SetThresholds {
                index: 1,
                threshold_on: 21.5,
                threshold_off: 19.0,
            })
        );
    }

    #[test]
    fn dashboard_param_names_are_accepted() {
        assert_eq!(
            DeviceCommand::parse("set_frequency", r#"{"frequency":30}"#),
            Ok(DeviceCommand::SetFrequency { seconds: 30 })
        );
        assert_eq!(
            DeviceCommand::parse("set_unit", r#"{"use_fahrenheit":true}"#),
            Ok(DeviceCommand::SetUnit { fahrenheit: true })
        );
        assert_eq!(
            DeviceCommand::parse("set_relay_type", r#"{"relay_number":1,"type":"GENERIC"}"#),
            Ok(DeviceCommand::SetRelayRole {
                index: 0,
                role: ChannelRole::Generic,
            })
        );
    }

    #[test]
    fn bad_input_is_reported() {
        assert_eq!(
            DeviceCommand::parse("self_destruct", "{}"),
            Err(CommandError::UnknownType("self_destruct".to_string()))
        );
        assert!(matches!(
            DeviceCommand::parse("set_relay_mode", r#"{"relay_number":1,"mode":"TURBO"}"#),
            Err(CommandError::InvalidParams(_))
        ));
        assert!(matches!(
            DeviceCommand::parse("set_thresholds", "null"),
            Err(CommandError::InvalidParams(_))
        ));
        assert_eq!(DeviceCommand::parse("restart", "null"), Ok(DeviceCommand::Restart));
    }
}
