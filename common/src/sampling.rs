use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::error::{ReadFailure, SampleFault};

/// Value the probe driver reports when the sensor is disconnected.
pub const FAULT_SENTINEL_C: f32 = -127.0;
pub const MIN_PLAUSIBLE_C: f32 = -50.0;
pub const MAX_PLAUSIBLE_C: f32 = 85.0;
pub const MAX_DEVIATION_C: f32 = 2.0;
pub const SAMPLES_PER_ATTEMPT: usize = 3;
pub const MAX_ATTEMPTS: u8 = 2;
pub const SAMPLE_DELAY_MS: u32 = 100;
pub const RETRY_DELAY_MS: u32 = 200;

/// One raw conversion from the sensor. Faults are reported in-band as
/// [`FAULT_SENTINEL_C`].
pub trait TemperatureProbe {
    fn read_celsius(&mut self) -> f32;
}

/// Anything that yields a trusted Celsius reading.
pub trait TemperatureSource {
    fn acquire(&mut self) -> Result<f32, ReadFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedTemperature {
    pub celsius: f32,
    /// Monotonic milliseconds of the read.
    pub tick: u64,
}

pub struct SampleValidator<P, D> {
    probe: P,
    delay: D,
}

impl<P: TemperatureProbe, D: DelayNs> SampleValidator<P, D> {
    pub fn new(probe: P, delay: D) -> Self {
        Self { probe, delay }
    }

    fn attempt(&mut self) -> Result<f32, SampleFault> {
        let mut samples = [0.0_f32; SAMPLES_PER_ATTEMPT];

        for slot in samples.iter_mut() {
            self.delay.delay_ms(SAMPLE_DELAY_MS);
            let sample = self.probe.read_celsius();

            if sample == FAULT_SENTINEL_C {
                return Err(SampleFault::Sentinel);
            }
            // NaN fails the range check as well.
            if !(MIN_PLAUSIBLE_C..=MAX_PLAUSIBLE_C).contains(&sample) {
                return Err(SampleFault::OutOfRange(sample));
            }
            *slot = sample;
        }

        let mean = samples.iter().sum::<f32>() / SAMPLES_PER_ATTEMPT as f32;
        let deviation = samples
            .iter()
            .map(|sample| (sample - mean).abs())
            .fold(0.0_f32, f32::max);

        if deviation > MAX_DEVIATION_C {
            return Err(SampleFault::Inconsistent(deviation));
        }

        debug!("samples {samples:?} -> {mean:.2}C (max deviation {deviation:.2}C)");
        Ok(mean)
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }
}

impl<P: TemperatureProbe, D: DelayNs> TemperatureSource for SampleValidator<P, D> {
    fn acquire(&mut self) -> Result<f32, ReadFailure> {
        let mut attempt = 1;
        loop {
            match self.attempt() {
                Ok(celsius) => return Ok(celsius),
                Err(fault) if attempt >= MAX_ATTEMPTS => {
                    return Err(ReadFailure {
                        attempts: attempt,
                        last: fault,
                    })
                }
                Err(fault) => {
                    warn!("temperature attempt {attempt} failed: {fault}; retrying");
                    self.delay.delay_ms(RETRY_DELAY_MS);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordedDelay, ScriptedProbe};

    fn validator(readings: &[f32]) -> SampleValidator<ScriptedProbe, RecordedDelay> {
        SampleValidator::new(ScriptedProbe::new(readings), RecordedDelay::default())
    }

    #[test]
    fn consistent_samples_yield_their_mean() {
        let mut validator = validator(&[20.0, 21.0, 22.0]);

        assert_eq!(validator.acquire(), Ok(21.0));
        assert_eq!(validator.probe().reads, 3);
        assert_eq!(validator.delay.delays_ms, vec![100, 100, 100]);
    }

    #[test]
    fn deviation_at_the_limit_is_accepted() {
        let mut validator = validator(&[18.0, 21.0, 21.0]);
        assert_eq!(validator.acquire(), Ok(20.0));
    }

    #[test]
    fn sentinel_abandons_the_attempt_and_retries() {
        let mut validator = validator(&[FAULT_SENTINEL_C, 19.5, 19.5, 19.5]);

        assert_eq!(validator.acquire(), Ok(19.5));
        // The faulted attempt stops after its first sample.
        assert_eq!(validator.probe().reads, 4);
        assert_eq!(validator.delay.delays_ms, vec![100, 200, 100, 100, 100]);
    }

    #[test]
    fn out_of_range_sample_aborts_early() {
        let mut validator = validator(&[22.0, 90.0, 22.0, 22.0, 22.0]);

        assert_eq!(validator.acquire(), Ok(22.0));
        assert_eq!(validator.probe().reads, 5);
    }

    #[test]
    fn two_failed_attempts_report_the_last_fault() {
        let mut validator = validator(&[10.0, 20.0, 30.0, FAULT_SENTINEL_C]);

        let failure = validator.acquire().unwrap_err();

        assert_eq!(failure.attempts, MAX_ATTEMPTS);
        assert_eq!(failure.last, SampleFault::Sentinel);
        assert_eq!(validator.delay.delays_ms.iter().filter(|ms| **ms == RETRY_DELAY_MS).count(), 1);
    }

    #[test]
    fn spread_samples_are_inconsistent() {
        let mut validator = validator(&[10.0, 20.0, 30.0, 10.0, 20.0, 30.0]);

        let failure = validator.acquire().unwrap_err();

        assert!(matches!(failure.last, SampleFault::Inconsistent(dev) if dev > 9.9));
        assert_eq!(validator.probe().reads, 6);
    }

    #[test]
    fn nan_counts_as_out_of_range() {
        let mut validator = validator(&[f32::NAN, f32::NAN]);

        let failure = validator.acquire().unwrap_err();
        assert!(matches!(failure.last, SampleFault::OutOfRange(value) if value.is_nan()));
    }
}
