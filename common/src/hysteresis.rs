use crate::types::{ChannelMode, ChannelRole};

/// Next logical output for one channel.
///
/// Forced modes ignore temperature. In `Auto`, heating channels engage when
/// the temperature falls to `threshold_on` and release at `threshold_off`;
/// cooling and generic channels use the mirrored comparisons. Between the two
/// thresholds the previous state is kept. Thresholds are taken as given even
/// when inverted for the role; the `on` comparison is checked first.
pub fn next_state(
    role: ChannelRole,
    mode: ChannelMode,
    threshold_on: f32,
    threshold_off: f32,
    current_temp: f32,
    prev_state: bool,
) -> bool {
    match mode {
        ChannelMode::ForceOn => true,
        ChannelMode::ForceOff => false,
        ChannelMode::Auto => match role {
            ChannelRole::ManualOnly => false,
            ChannelRole::Heating => {
                if current_temp <= threshold_on {
                    true
                } else if current_temp >= threshold_off {
                    false
                } else {
                    prev_state
                }
            }
            ChannelRole::Cooling | ChannelRole::Generic => {
                if current_temp >= threshold_on {
                    true
                } else if current_temp <= threshold_off {
                    false
                } else {
                    prev_state
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heating_engages_when_cold_and_releases_when_warm() {
        let role = ChannelRole::Heating;
        let mode = ChannelMode::Auto;

        assert!(next_state(role, mode, 21.0, 23.0, 20.5, false));
        assert!(next_state(role, mode, 21.0, 23.0, 21.0, false));
        assert!(!next_state(role, mode, 21.0, 23.0, 23.0, true));
        assert!(!next_state(role, mode, 21.0, 23.0, 30.0, true));
    }

    #[test]
    fn heating_holds_inside_dead_band() {
        let role = ChannelRole::Heating;
        let mode = ChannelMode::Auto;

        assert!(next_state(role, mode, 21.0, 23.0, 22.0, true));
        assert!(!next_state(role, mode, 21.0, 23.0, 22.0, false));
    }

    #[test]
    fn cooling_and_generic_mirror_heating() {
        for role in [ChannelRole::Cooling, ChannelRole::Generic] {
            assert!(next_state(role, ChannelMode::Auto, 26.0, 24.0, 26.0, false));
            assert!(!next_state(role, ChannelMode::Auto, 26.0, 24.0, 24.0, true));
            assert!(next_state(role, ChannelMode::Auto, 26.0, 24.0, 25.0, true));
            assert!(!next_state(role, ChannelMode::Auto, 26.0, 24.0, 25.0, false));
        }
    }

    #[test]
    fn manual_only_never_engages_in_auto() {
        for temp in [-40.0, 0.0, 22.0, 80.0] {
            assert!(!next_state(ChannelRole::ManualOnly, ChannelMode::Auto, 25.0, 23.0, temp, true));
        }
        assert!(next_state(ChannelRole::ManualOnly, ChannelMode::ForceOn, 25.0, 23.0, 22.0, false));
    }

    #[test]
    fn inverted_heating_thresholds_are_accepted_as_given() {
        // on=20 above off=18 is backwards for heating. 19 satisfies both
        // comparisons and `on` wins, so the dead band collapses into a plain
        // threshold at 20.
        let role = ChannelRole::Heating;
        assert!(next_state(role, ChannelMode::Auto, 20.0, 18.0, 19.0, false));
        assert!(next_state(role, ChannelMode::Auto, 20.0, 18.0, 17.0, false));
        assert!(!next_state(role, ChannelMode::Auto, 20.0, 18.0, 20.5, true));

        // Inverted cooling pair: on=18 below off=20 never holds state either.
        let role = ChannelRole::Cooling;
        assert!(next_state(role, ChannelMode::Auto, 18.0, 20.0, 19.0, false));
        assert!(!next_state(role, ChannelMode::Auto, 18.0, 20.0, 17.5, true));
    }
}
