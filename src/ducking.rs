//! Overlap Ducking
//!
//! Attenuates a new request when instances of the same sound (or group)
//! started within a few tens of milliseconds of it. Only active instances
//! with a positive volume take part.

use crate::builder::{SnapBuilder, SoundBuilder};
use crate::device::AudioClip;
use crate::group::SnapGroup;
use crate::handle::Handle;
use crate::pool::UnitPool;
use crate::timing::DspClock;
use crate::Result;

/// Start-time distance below which the new request is silenced.
pub const SILENCE_WINDOW: f64 = 0.025;
/// Start-time distance below which a neighbour applies [`NEAR_RATE`].
pub const NEAR_WINDOW: f64 = 0.05;
/// Start-time distance below which a neighbour applies [`FAR_RATE`].
pub const FAR_WINDOW: f64 = 0.1;
/// Multiplier per neighbour closer than [`NEAR_WINDOW`].
pub const NEAR_RATE: f32 = 0.8;
/// Multiplier per neighbour closer than [`FAR_WINDOW`].
pub const FAR_RATE: f32 = 0.9;

/// Volume multiplier for a request starting at `candidate_dsp_time`.
///
/// Any neighbour inside [`SILENCE_WINDOW`] yields 0 immediately; otherwise
/// the rates of all near neighbours compound.
pub fn overlap_volume_rate(
    candidate_dsp_time: f64,
    active_dsp_times: impl IntoIterator<Item = f64>,
) -> f32 {
    let mut rate = 1.0;
    for start in active_dsp_times {
        let diff = (candidate_dsp_time - start).abs();
        if diff < SILENCE_WINDOW {
            return 0.0;
        }
        if diff < NEAR_WINDOW {
            rate *= NEAR_RATE;
        } else if diff < FAR_WINDOW {
            rate *= FAR_RATE;
        }
    }
    rate
}

/// `base_volume` attenuated by [`overlap_volume_rate`].
pub fn duck(
    candidate_dsp_time: f64,
    base_volume: f32,
    active_dsp_times: impl IntoIterator<Item = f64>,
) -> f32 {
    base_volume * overlap_volume_rate(candidate_dsp_time, active_dsp_times)
}

/// Start times of the handles that are active and audible.
fn audible_start_times(handles: impl IntoIterator<Item = Handle>) -> Vec<f64> {
    handles
        .into_iter()
        .filter(|handle| handle.volume().is_ok_and(|volume| volume > 0.0))
        .filter_map(|handle| handle.play_dsp_time().ok())
        .collect()
}

fn same_clip_start_times(pool: &UnitPool, clip: &AudioClip) -> Vec<f64> {
    audible_start_times(
        pool.active_handles()
            .filter(|handle| handle.clip().ok().flatten().as_ref() == Some(clip)),
    )
}

macro_rules! ducking_helpers {
    ($builder:ty) => {
        impl $builder {
            /// Duck against the playbacks registered in `group`.
            pub fn adjust_volume_for_overlap(
                self,
                group: &SnapGroup,
                clock: &dyn DspClock,
            ) -> Result<Self> {
                let start = self.play_dsp_time(clock)?;
                let volume = self.volume()?;
                let ducked = duck(start, volume, audible_start_times(group.handles()));
                self.with_volume(ducked)
            }

            /// Duck against playbacks of the same clip anywhere in `pool`.
            ///
            /// A builder without a clip is left unchanged.
            pub fn adjust_volume_for_simultaneous_clips(self, pool: &UnitPool) -> Result<Self> {
                let Some(clip) = self.clip()? else {
                    return Ok(self);
                };
                let start = self.play_dsp_time(pool.clock().as_ref())?;
                let volume = self.volume()?;
                let ducked = duck(start, volume, same_clip_start_times(pool, &clip));
                self.with_volume(ducked)
            }
        }
    };
}

ducking_helpers!(SnapBuilder);
ducking_helpers!(SoundBuilder);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_close_start_silences() {
        assert_eq!(duck(1.01, 1.0, [1.0]), 0.0);
    }

    #[test]
    fn test_far_neighbour_applies_once() {
        assert_relative_eq!(duck(1.07, 1.0, [1.0]), 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_rates_compound() {
        assert_relative_eq!(overlap_volume_rate(1.0, [0.96, 0.93]), 0.72, epsilon = 1e-6);
    }

    #[test]
    fn test_distant_neighbours_ignored() {
        assert_eq!(overlap_volume_rate(5.0, [4.0, 6.0, 5.5]), 1.0);
    }

    #[test]
    fn test_silence_wins_regardless_of_order() {
        assert_eq!(overlap_volume_rate(1.0, [0.96, 1.01, 0.93]), 0.0);
    }
}
