//! Property tests for the relay decision and sample validation paths.

use embedded_hal::delay::DelayNs;
use multizone_common::{
    next_state, ChannelBank, ChannelMode, ChannelRole, RelayOutput, SampleValidator,
    TemperatureProbe, TemperatureSource, CHANNEL_COUNT,
};
use proptest::prelude::*;

fn temp() -> impl Strategy<Value = f32> {
    (-400i32..=900).prop_map(|tenths| tenths as f32 / 10.0)
}

/// Ordered pair `(low, high)` with at least 0.1 between them.
fn band() -> impl Strategy<Value = (f32, f32)> {
    (-300i32..=600, 1i32..=100).prop_map(|(low, width)| {
        let low = low as f32 / 10.0;
        (low, low + width as f32 / 10.0)
    })
}

proptest! {
    #[test]
    fn heating_holds_state_inside_dead_band(
        (on, off) in band(),
        temps in proptest::collection::vec(temp(), 1..64),
        initial in any::<bool>(),
    ) {
        let mut state = initial;
        for t in temps {
            let next = next_state(ChannelRole::Heating, ChannelMode::Auto, on, off, t, state);
            if t <= on {
                prop_assert!(next);
            } else if t >= off {
                prop_assert!(!next);
            } else {
                prop_assert_eq!(next, state);
            }
            state = next;
        }
    }

    #[test]
    fn cooling_and_generic_hold_state_inside_dead_band(
        (off, on) in band(),
        temps in proptest::collection::vec(temp(), 1..64),
        generic in any::<bool>(),
    ) {
        let role = if generic { ChannelRole::Generic } else { ChannelRole::Cooling };
        let mut state = false;
        for t in temps {
            let next = next_state(role, ChannelMode::Auto, on, off, t, state);
            if t >= on {
                prop_assert!(next);
            } else if t <= off {
                prop_assert!(!next);
            } else {
                prop_assert_eq!(next, state);
            }
            state = next;
        }
    }

    #[test]
    fn forced_modes_ignore_temperature(
        role_index in 0usize..4,
        (on, off) in band(),
        t in temp(),
        prev in any::<bool>(),
    ) {
        let role = ChannelRole::ALL[role_index];
        prop_assert!(next_state(role, ChannelMode::ForceOn, on, off, t, prev));
        prop_assert!(!next_state(role, ChannelMode::ForceOff, on, off, t, prev));
    }

    #[test]
    fn manual_only_in_auto_is_always_off(
        on in temp(),
        off in temp(),
        t in temp(),
        prev in any::<bool>(),
    ) {
        prop_assert!(!next_state(ChannelRole::ManualOnly, ChannelMode::Auto, on, off, t, prev));
    }

    #[test]
    fn physical_outputs_track_logical_state(
        modes in proptest::collection::vec(0usize..3, CHANNEL_COUNT),
        temps in proptest::collection::vec(temp(), 1..32),
    ) {
        let mut bank = ChannelBank::new(Outputs::default());
        for (index, mode) in modes.into_iter().enumerate() {
            bank.set_mode(index, ChannelMode::ALL[mode]);
        }

        for t in temps {
            bank.apply_control(t);
            for index in 0..CHANNEL_COUNT {
                prop_assert_eq!(Some(bank.output().0[index]), bank.state(index));
            }
        }
    }

    #[test]
    fn close_samples_average_to_their_mean(
        base in -490i32..=830,
        offsets in proptest::collection::vec(0i32..=20, 3),
    ) {
        let samples: Vec<f32> = offsets
            .iter()
            .map(|offset| (base + offset) as f32 / 10.0)
            .collect();
        let expected = (samples[0] + samples[1] + samples[2]) / 3.0;

        let mut validator = SampleValidator::new(Probe(samples), NoDelay);
        let mean = validator.acquire().expect("samples within 2C of each other");

        prop_assert!((mean - expected).abs() < 1e-3, "mean {} expected {}", mean, expected);
    }
}

#[derive(Default)]
struct Outputs([bool; CHANNEL_COUNT]);

impl RelayOutput for Outputs {
    fn drive(&mut self, index: usize, energized: bool) {
        self.0[index] = energized;
    }
}

struct Probe(Vec<f32>);

impl TemperatureProbe for Probe {
    fn read_celsius(&mut self) -> f32 {
        if self.0.is_empty() {
            -127.0
        } else {
            self.0.remove(0)
        }
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}
