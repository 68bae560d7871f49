use log::info;

use crate::{
    hysteresis::next_state,
    types::{ChannelMode, ChannelRole, ChannelStatus},
};

pub const CHANNEL_COUNT: usize = 4;
pub const DEFAULT_THRESHOLD_ON_C: f32 = 25.0;
pub const DEFAULT_THRESHOLD_OFF_C: f32 = 23.0;

/// Physical relay bank. `energized` is the logical state; drivers handle polarity.
pub trait RelayOutput {
    fn drive(&mut self, index: usize, energized: bool);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub mode: ChannelMode,
    pub role: ChannelRole,
    pub threshold_on: f32,
    pub threshold_off: f32,
    pub output_state: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            mode: ChannelMode::ForceOff,
            role: ChannelRole::Heating,
            threshold_on: DEFAULT_THRESHOLD_ON_C,
            threshold_off: DEFAULT_THRESHOLD_OFF_C,
            output_state: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayChanged {
    pub index: usize,
    pub new_state: bool,
    pub temp: f32,
}

pub struct ChannelBank<O> {
    channels: [Channel; CHANNEL_COUNT],
    output: O,
}

impl<O: RelayOutput> ChannelBank<O> {
    /// Creates the bank with default channels and drives every relay off.
    pub fn new(mut output: O) -> Self {
        for index in 0..CHANNEL_COUNT {
            output.drive(index, false);
        }
        info!("all {CHANNEL_COUNT} relays initialized OFF");

        Self {
            channels: [Channel::default(); CHANNEL_COUNT],
            output,
        }
    }

    pub fn apply_control(&mut self, temp: f32) -> heapless::Vec<RelayChanged, CHANNEL_COUNT> {
        let mut changes = heapless::Vec::new();

        for (index, channel) in self.channels.iter_mut().enumerate() {
            let previous = channel.output_state;
            channel.output_state = next_state(
                channel.role,
                channel.mode,
                channel.threshold_on,
                channel.threshold_off,
                temp,
                previous,
            );
            self.output.drive(index, channel.output_state);

            if previous != channel.output_state {
                info!(
                    "Relay {} -> {} @ {temp:.1}C",
                    index + 1,
                    if channel.output_state { "ON" } else { "OFF" }
                );
                let pushed = changes.push(RelayChanged {
                    index,
                    new_state: channel.output_state,
                    temp,
                });
                debug_assert!(pushed.is_ok());
            }
        }

        changes
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn channels(&self) -> &[Channel; CHANNEL_COUNT] {
        &self.channels
    }

    pub fn state(&self, index: usize) -> Option<bool> {
        self.channel(index).map(|channel| channel.output_state)
    }

    pub fn mode(&self, index: usize) -> Option<ChannelMode> {
        self.channel(index).map(|channel| channel.mode)
    }

    pub fn role(&self, index: usize) -> Option<ChannelRole> {
        self.channel(index).map(|channel| channel.role)
    }

    pub fn thresholds(&self, index: usize) -> Option<(f32, f32)> {
        self.channel(index)
            .map(|channel| (channel.threshold_on, channel.threshold_off))
    }

    /// Returns `false` when `index` is out of range and nothing was changed.
    pub fn set_mode(&mut self, index: usize, mode: ChannelMode) -> bool {
        let Some(channel) = self.channels.get_mut(index) else {
            return false;
        };
        channel.mode = mode;
        true
    }

    pub fn set_role(&mut self, index: usize, role: ChannelRole) -> bool {
        let Some(channel) = self.channels.get_mut(index) else {
            return false;
        };
        channel.role = role;
        info!("Relay {} type set to {role}", index + 1);
        true
    }

    pub fn set_thresholds(&mut self, index: usize, threshold_on: f32, threshold_off: f32) -> bool {
        let Some(channel) = self.channels.get_mut(index) else {
            return false;
        };
        channel.threshold_on = threshold_on;
        channel.threshold_off = threshold_off;
        true
    }

    pub fn status(&self) -> Vec<ChannelStatus> {
        self.channels
            .iter()
            .enumerate()
            .map(|(index, channel)| ChannelStatus {
                index,
                state: channel.output_state,
                mode: channel.mode.as_str(),
                role: channel.role.as_str(),
                temp_on: channel.threshold_on,
                temp_off: channel.threshold_off,
            })
            .collect()
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}
