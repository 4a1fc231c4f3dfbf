//! Advanced Builder Shape
//!
//! Sample-accurate loop window with a pass count and optional carry-over.

use super::{require_clip, shared_builder_methods, BuilderPool, BuilderRef, CommonParams};
use crate::request::{LoopCount, LoopSettings, LoopWindow, PlaybackRequest, RequestParams};
use crate::{Result, SoundSnapError};

/// Staging buffer of a [`SoundBuilder`].
#[derive(Debug, Clone)]
pub struct SoundParams {
    pub(crate) common: CommonParams,
    end_sample: i32,
    loop_start_sample: i32,
    loop_count: LoopCount,
    carry_over: bool,
}

impl Default for SoundParams {
    fn default() -> Self {
        Self {
            common: CommonParams::default(),
            end_sample: -1,
            loop_start_sample: 0,
            loop_count: LoopCount::ONCE,
            carry_over: true,
        }
    }
}

/// Arena of [`SoundParams`] buffers.
pub type SoundBuilderPool = BuilderPool<SoundParams>;

thread_local! {
    static DEFAULT_SOUND_BUILDERS: SoundBuilderPool = SoundBuilderPool::new();
}

/// Fluent builder for loop-window playback requests.
///
/// An unset (negative) end sample resolves to the clip's length when the
/// request is built.
#[derive(Debug, Clone)]
pub struct SoundBuilder {
    pub(crate) inner: BuilderRef<SoundParams>,
}

impl SoundBuilder {
    /// Rent from this thread's default arena.
    pub fn get() -> Self {
        DEFAULT_SOUND_BUILDERS.with(Self::rent)
    }

    /// Rent from an explicit arena.
    pub fn rent(pool: &SoundBuilderPool) -> Self {
        Self { inner: pool.rent() }
    }

    /// This thread's default arena.
    pub fn default_pool() -> SoundBuilderPool {
        DEFAULT_SOUND_BUILDERS.with(SoundBuilderPool::clone)
    }

    pub(crate) fn from_request(request: &PlaybackRequest) -> Self {
        let params = request.params();
        let window = match params.looping {
            LoopSettings::Window(window) => window,
            LoopSettings::Native(_) => LoopWindow {
                end_sample: -1,
                loop_start_sample: 0,
                loop_count: LoopCount::ONCE,
                carry_over: true,
            },
        };
        let staged = SoundParams {
            common: CommonParams {
                clip: Some(params.clip.clone()),
                output: params.output.clone(),
                mute: params.mute,
                volume: params.volume,
                pitch: params.pitch,
                priority: params.priority,
                pan_stereo: params.pan_stereo,
                start_sample: params.start_sample,
                timing: params.timing,
                scheduled_end_time: params.scheduled_end_time,
                callbacks: request.callbacks().clone(),
            },
            end_sample: window.end_sample,
            loop_start_sample: window.loop_start_sample,
            loop_count: window.loop_count,
            carry_over: window.carry_over,
        };
        DEFAULT_SOUND_BUILDERS.with(|pool| Self {
            inner: pool.rent_with(staged),
        })
    }

    shared_builder_methods!();

    /// Staged end sample (negative until resolved at build time).
    pub fn end_sample(&self) -> Result<i32> {
        self.inner.read(|p| p.end_sample)
    }

    /// Staged loop start sample.
    pub fn loop_start_sample(&self) -> Result<i32> {
        self.inner.read(|p| p.loop_start_sample)
    }

    /// Staged pass count.
    pub fn loop_count(&self) -> Result<LoopCount> {
        self.inner.read(|p| p.loop_count)
    }

    /// Staged carry-over flag.
    pub fn carry_over(&self) -> Result<bool> {
        self.inner.read(|p| p.carry_over)
    }

    /// Set the loop boundary; negative means the clip's end.
    pub fn with_end_sample(self, sample: i32) -> Result<Self> {
        self.inner.write(|p| p.end_sample = sample)?;
        Ok(self)
    }

    /// Set where each new pass begins.
    pub fn with_loop_start_sample(self, sample: i32) -> Result<Self> {
        self.inner.write(|p| p.loop_start_sample = sample)?;
        Ok(self)
    }

    /// Set the number of passes through the window.
    pub fn with_loop(self, count: LoopCount) -> Result<Self> {
        self.inner.write(|p| p.loop_count = count)?;
        Ok(self)
    }

    /// Keep (or drop) the overshoot past the boundary when wrapping.
    pub fn with_carry_over(self, carry_over: bool) -> Result<Self> {
        self.inner.write(|p| p.carry_over = carry_over)?;
        Ok(self)
    }

    /// Add a hook fired after each wrap.
    pub fn with_on_loop(self, callback: impl Fn(()) + 'static) -> Result<Self> {
        self.inner.write(|p| {
            p.common.callbacks.on_loop.push(callback);
        })?;
        Ok(self)
    }

    /// Snapshot the staged fields and return the buffer to its arena.
    pub fn build(self) -> Result<PlaybackRequest> {
        let staged = self.inner.take_checked(|p| require_clip(&p.common))?;
        let SoundParams {
            common,
            end_sample,
            loop_start_sample,
            loop_count,
            carry_over,
        } = staged;
        let Some(clip) = common.clip else {
            return Err(SoundSnapError::MissingSource);
        };
        let end_sample = if end_sample < 0 {
            i32::try_from(clip.samples()).unwrap_or(i32::MAX)
        } else {
            end_sample
        };
        let params = RequestParams {
            clip,
            position: [0.0; 3],
            output: common.output,
            mute: common.mute,
            volume: common.volume,
            pitch: common.pitch,
            priority: common.priority,
            pan_stereo: common.pan_stereo,
            start_sample: common.start_sample,
            looping: LoopSettings::Window(LoopWindow {
                end_sample,
                loop_start_sample,
                loop_count,
                carry_over,
            }),
            timing: common.timing,
            scheduled_end_time: common.scheduled_end_time,
        };
        Ok(PlaybackRequest::new(params, common.callbacks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::AudioClip;

    #[test]
    fn test_defaults() {
        let pool = SoundBuilderPool::new();
        let builder = SoundBuilder::rent(&pool);
        assert_eq!(builder.end_sample().unwrap(), -1);
        assert_eq!(builder.loop_start_sample().unwrap(), 0);
        assert_eq!(builder.loop_count().unwrap(), LoopCount::ONCE);
        assert!(builder.carry_over().unwrap());
    }

    #[test]
    fn test_unset_end_resolves_to_clip_length() {
        let pool = SoundBuilderPool::new();
        let clip = AudioClip::new("pad", 48_000, 48_000, 2);
        let request = SoundBuilder::rent(&pool)
            .with_clip(clip)
            .and_then(SoundBuilder::build)
            .unwrap();
        match request.looping() {
            LoopSettings::Window(window) => assert_eq!(window.end_sample, 48_000),
            other => panic!("unexpected loop settings {other:?}"),
        }
    }

    #[test]
    fn test_end_resolved_from_clip_set_last() {
        let pool = SoundBuilderPool::new();
        let short = AudioClip::new("short", 100, 48_000, 1);
        let long = AudioClip::new("long", 900, 48_000, 1);
        let request = SoundBuilder::rent(&pool)
            .with_clip(short)
            .and_then(|b| b.with_loop(LoopCount::Finite(3)))
            .and_then(|b| b.with_clip(long))
            .and_then(SoundBuilder::build)
            .unwrap();
        let LoopSettings::Window(window) = *request.looping() else {
            panic!("expected a loop window");
        };
        assert_eq!(window.end_sample, 900);
        assert_eq!(window.loop_count, LoopCount::Finite(3));
    }

    #[test]
    fn test_explicit_end_is_kept() {
        let pool = SoundBuilderPool::new();
        let request = SoundBuilder::rent(&pool)
            .with_clip(AudioClip::new("pad", 48_000, 48_000, 2))
            .and_then(|b| b.with_end_sample(1_000))
            .and_then(|b| b.with_loop_start_sample(200))
            .and_then(|b| b.with_carry_over(false))
            .and_then(SoundBuilder::build)
            .unwrap();
        assert_eq!(
            *request.looping(),
            LoopSettings::Window(LoopWindow {
                end_sample: 1_000,
                loop_start_sample: 200,
                loop_count: LoopCount::ONCE,
                carry_over: false,
            })
        );
    }
}
