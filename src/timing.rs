//! Start Timing
//!
//! Converts a request's timing mode and value into the absolute dsp time at
//! which the device should begin producing audio.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::{Result, SoundSnapError};

/// Absolute audio clock used for sample-accurate scheduling.
pub trait DspClock {
    /// Current dsp time in seconds.
    fn dsp_time(&self) -> f64;
}

/// How a request's start time is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive)]
pub enum TimingMode {
    /// Start on the current device clock.
    #[default]
    Immediate = 0,
    /// Start `value` seconds after the current device clock.
    Delay = 1,
    /// Start at the absolute dsp time `value`.
    Schedule = 2,
}

impl TimingMode {
    /// Decode a raw discriminant (as persisted by hosts that store modes numerically).
    pub fn from_raw(raw: i64) -> Result<Self> {
        <Self as FromPrimitive>::from_i64(raw).ok_or(SoundSnapError::InvalidTimingMode(raw))
    }
}

impl TryFrom<i32> for TimingMode {
    type Error = SoundSnapError;

    fn try_from(raw: i32) -> Result<Self> {
        Self::from_raw(raw as i64)
    }
}

/// Timing mode plus its associated value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timing {
    /// Interpretation of `value`.
    pub mode: TimingMode,
    /// Delay in seconds or absolute dsp time, depending on `mode`. Ignored for `Immediate`.
    pub value: f64,
}

impl Timing {
    /// Start on the current clock.
    pub const fn immediate() -> Self {
        Self {
            mode: TimingMode::Immediate,
            value: 0.0,
        }
    }

    /// Start `seconds` after the current clock.
    pub const fn delay(seconds: f64) -> Self {
        Self {
            mode: TimingMode::Delay,
            value: seconds,
        }
    }

    /// Start at the absolute dsp time `dsp_time`.
    pub const fn schedule(dsp_time: f64) -> Self {
        Self {
            mode: TimingMode::Schedule,
            value: dsp_time,
        }
    }

    /// Absolute start time against `clock`.
    pub fn evaluate(&self, clock: &dyn DspClock) -> f64 {
        evaluate_dsp_time(clock, self.mode, self.value)
    }
}

/// Absolute dsp time at which playback starts for the given mode and value.
///
/// `Schedule` returns `value` verbatim and never reads the clock.
pub fn evaluate_dsp_time(clock: &dyn DspClock, mode: TimingMode, value: f64) -> f64 {
    match mode {
        TimingMode::Immediate => clock.dsp_time(),
        TimingMode::Delay => clock.dsp_time() + value,
        TimingMode::Schedule => value,
    }
}

/// Same as [`evaluate_dsp_time`] for a raw, not yet validated mode discriminant.
pub fn evaluate_raw_dsp_time(clock: &dyn DspClock, raw_mode: i64, value: f64) -> Result<f64> {
    let mode = TimingMode::from_raw(raw_mode)?;
    Ok(evaluate_dsp_time(clock, mode, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedClock(Cell<f64>);

    impl DspClock for FixedClock {
        fn dsp_time(&self) -> f64 {
            self.0.get()
        }
    }

    #[test]
    fn test_immediate_uses_clock() {
        let clock = FixedClock(Cell::new(12.5));
        assert_eq!(evaluate_dsp_time(&clock, TimingMode::Immediate, 99.0), 12.5);
    }

    #[test]
    fn test_delay_is_relative_to_clock() {
        let clock = FixedClock(Cell::new(3.0));
        assert_eq!(evaluate_dsp_time(&clock, TimingMode::Delay, 0.25), 3.25);
    }

    #[test]
    fn test_schedule_ignores_clock() {
        let clock = FixedClock(Cell::new(3.0));
        assert_eq!(evaluate_dsp_time(&clock, TimingMode::Schedule, 42.0), 42.0);
        clock.0.set(100.0);
        assert_eq!(Timing::schedule(42.0).evaluate(&clock), 42.0);
    }

    #[test]
    fn test_unknown_raw_mode_is_rejected() {
        let clock = FixedClock(Cell::new(0.0));
        assert_eq!(TimingMode::from_raw(2).unwrap(), TimingMode::Schedule);
        assert!(matches!(
            evaluate_raw_dsp_time(&clock, 7, 1.0),
            Err(SoundSnapError::InvalidTimingMode(7))
        ));
        assert!(TimingMode::try_from(-1).is_err());
    }
}
