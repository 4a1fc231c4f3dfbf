//! Simple Builder Shape
//!
//! One-shot or natively looping playback with a world position.

use super::{require_clip, shared_builder_methods, BuilderPool, BuilderRef, CommonParams};
use crate::device::Vec3;
use crate::request::{LoopSettings, PlaybackRequest, RequestParams};
use crate::Result;

/// Staging buffer of a [`SnapBuilder`].
#[derive(Debug, Clone, Default)]
pub struct SnapParams {
    pub(crate) common: CommonParams,
    position: Vec3,
    looping: bool,
}

/// Arena of [`SnapParams`] buffers.
pub type SnapBuilderPool = BuilderPool<SnapParams>;

thread_local! {
    static DEFAULT_SNAP_BUILDERS: SnapBuilderPool = SnapBuilderPool::new();
}

/// Fluent builder for simple playback requests.
///
/// ```no_run
/// # use soundsnap::{AudioClip, SnapBuilder};
/// # fn demo(clip: AudioClip) -> soundsnap::Result<()> {
/// let request = SnapBuilder::get()
///     .with_clip(clip)?
///     .with_volume(0.8)?
///     .with_delay(0.1)?
///     .build()?;
/// # let _ = request;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SnapBuilder {
    pub(crate) inner: BuilderRef<SnapParams>,
}

impl SnapBuilder {
    /// Rent from this thread's default arena.
    pub fn get() -> Self {
        DEFAULT_SNAP_BUILDERS.with(Self::rent)
    }

    /// Rent from an explicit arena.
    pub fn rent(pool: &SnapBuilderPool) -> Self {
        Self { inner: pool.rent() }
    }

    /// This thread's default arena.
    pub fn default_pool() -> SnapBuilderPool {
        DEFAULT_SNAP_BUILDERS.with(SnapBuilderPool::clone)
    }

    /// Rent a builder pre-filled with every field of `request`.
    pub(crate) fn from_request(request: &PlaybackRequest) -> Self {
        let params = request.params();
        let common = CommonParams {
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
        };
        let looping = match params.looping {
            LoopSettings::Native(looping) => looping,
            LoopSettings::Window(_) => false,
        };
        let staged = SnapParams {
            common,
            position: params.position,
            looping,
        };
        DEFAULT_SNAP_BUILDERS.with(|pool| Self {
            inner: pool.rent_with(staged),
        })
    }

    shared_builder_methods!();

    /// Staged world position.
    pub fn position(&self) -> Result<Vec3> {
        self.inner.read(|p| p.position)
    }

    /// Staged native loop flag.
    pub fn looping(&self) -> Result<bool> {
        self.inner.read(|p| p.looping)
    }

    /// Set the world position.
    pub fn with_position(self, position: Vec3) -> Result<Self> {
        self.inner.write(|p| p.position = position)?;
        Ok(self)
    }

    /// Loop forever on the device's native flag while `looping` is set.
    pub fn with_loop(self, looping: bool) -> Result<Self> {
        self.inner.write(|p| p.looping = looping)?;
        Ok(self)
    }

    /// Add a hook fired when playback is stopped or destroyed.
    pub fn with_on_stop(self, callback: impl Fn(()) + 'static) -> Result<Self> {
        self.inner.write(|p| {
            p.common.callbacks.on_stop.push(callback);
        })?;
        Ok(self)
    }

    /// Add a hook fired when playback finishes on its own.
    pub fn with_on_complete(self, callback: impl Fn(()) + 'static) -> Result<Self> {
        self.inner.write(|p| {
            p.common.callbacks.on_complete.push(callback);
        })?;
        Ok(self)
    }

    /// Snapshot the staged fields and return the buffer to its arena.
    ///
    /// Fails with `MissingSource` (leaving the builder usable) when no clip is set.
    pub fn build(self) -> Result<PlaybackRequest> {
        let staged = self.inner.take_checked(|p| require_clip(&p.common))?;
        let SnapParams {
            common,
            position,
            looping,
        } = staged;
        let Some(clip) = common.clip else {
            return Err(crate::SoundSnapError::MissingSource);
        };
        let params = RequestParams {
            clip,
            position,
            output: common.output,
            mute: common.mute,
            volume: common.volume,
            pitch: common.pitch,
            priority: common.priority,
            pan_stereo: common.pan_stereo,
            start_sample: common.start_sample,
            looping: LoopSettings::Native(looping),
            timing: common.timing,
            scheduled_end_time: common.scheduled_end_time,
        };
        Ok(PlaybackRequest::new(params, common.callbacks))
    }
}
