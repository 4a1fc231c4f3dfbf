//! Randomised volume and pitch setters.

use rand::Rng;

use super::{SnapBuilder, SoundBuilder};
use crate::{Result, SoundSnapError};

/// Uniform pick in `[min, max]`; reversed bounds are swapped.
///
/// Both bounds must be finite.
pub(crate) fn pick<R: Rng + ?Sized>(rng: &mut R, min: f32, max: f32) -> Result<f32> {
    if !min.is_finite() || !max.is_finite() {
        return Err(SoundSnapError::config(format!(
            "random range bounds must be finite, got [{min}, {max}]"
        )));
    }
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    Ok(rng.random_range(low..=high))
}

macro_rules! random_setters {
    ($builder:ty) => {
        impl $builder {
            /// Set a volume picked uniformly from `[min, max]`.
            pub fn with_random_volume(self, min: f32, max: f32) -> Result<Self> {
                self.with_random_volume_using(&mut rand::rng(), min, max)
            }

            /// [`with_random_volume`](Self::with_random_volume) with a caller-supplied generator.
            pub fn with_random_volume_using<R: Rng + ?Sized>(
                self,
                rng: &mut R,
                min: f32,
                max: f32,
            ) -> Result<Self> {
                let volume = pick(rng, min, max)?;
                self.with_volume(volume)
            }

            /// Set a pitch picked uniformly from `[min, max]`.
            pub fn with_random_pitch(self, min: f32, max: f32) -> Result<Self> {
                self.with_random_pitch_using(&mut rand::rng(), min, max)
            }

            /// [`with_random_pitch`](Self::with_random_pitch) with a caller-supplied generator.
            pub fn with_random_pitch_using<R: Rng + ?Sized>(
                self,
                rng: &mut R,
                min: f32,
                max: f32,
            ) -> Result<Self> {
                let pitch = pick(rng, min, max)?;
                self.with_pitch(pitch)
            }
        }
    };
}

random_setters!(SnapBuilder);
random_setters!(SoundBuilder);
