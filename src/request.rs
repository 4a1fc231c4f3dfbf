//! Playback Requests
//!
//! The immutable snapshot a builder produces and a playback unit consumes.

use crate::builder::{RequestBuilder, SnapBuilder, SoundBuilder};
use crate::callbacks::PlaybackCallbacks;
use crate::device::{AudioClip, MixerGroup, Vec3};
use crate::timing::{DspClock, Timing};

/// Default voice priority (mid-range, as most engines use).
pub const DEFAULT_PRIORITY: i32 = 128;

/// How many passes through the loop window a sample-accurate request makes.
///
/// `Finite(n)` counts total passes: `Finite(0)` and `Finite(1)` both end at
/// the first boundary, `Finite(3)` wraps twice and ends at the third.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    /// End after this many passes.
    Finite(u32),
    /// Never end on its own.
    Infinite,
}

impl LoopCount {
    /// Play the window once.
    pub const ONCE: LoopCount = LoopCount::Finite(0);

    /// Signed representation used by profiles: negative means infinite.
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 {
            LoopCount::Infinite
        } else {
            LoopCount::Finite(raw as u32)
        }
    }

    /// Inverse of [`from_raw`](Self::from_raw).
    pub fn to_raw(self) -> i32 {
        match self {
            LoopCount::Finite(n) => n.min(i32::MAX as u32) as i32,
            LoopCount::Infinite => -1,
        }
    }
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::ONCE
    }
}

/// Sample-accurate loop window of the advanced request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopWindow {
    /// Boundary sample; crossing it ends a pass.
    pub end_sample: i32,
    /// Where each new pass starts.
    pub loop_start_sample: i32,
    /// Remaining passes.
    pub loop_count: LoopCount,
    /// Keep the overshoot past `end_sample` when wrapping.
    pub carry_over: bool,
}

/// Loop behaviour of a request; the variant records which builder shape made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSettings {
    /// Simple shape: the device's native loop flag, infinite while `true`.
    Native(bool),
    /// Advanced shape: explicit window and pass count.
    Window(LoopWindow),
}

impl LoopSettings {
    /// Whether the request came from the advanced builder shape.
    pub fn is_window(&self) -> bool {
        matches!(self, LoopSettings::Window(_))
    }
}

/// Every plain parameter of a request. Comparable, unlike the callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    /// Source clip.
    pub clip: AudioClip,
    /// World position (simple shape; origin otherwise).
    pub position: Vec3,
    /// Mixer routing.
    pub output: Option<MixerGroup>,
    /// Start muted.
    pub mute: bool,
    /// Linear volume.
    pub volume: f32,
    /// Playback rate.
    pub pitch: f32,
    /// Voice priority.
    pub priority: i32,
    /// Stereo pan.
    pub pan_stereo: f32,
    /// First sample to play.
    pub start_sample: i32,
    /// Loop behaviour.
    pub looping: LoopSettings,
    /// Start timing.
    pub timing: Timing,
    /// Absolute dsp time at which the device stops, if any.
    pub scheduled_end_time: Option<f64>,
}

/// Immutable playback request.
///
/// Produced exactly once by a builder's `build()`, consumed by a unit when
/// played. Cloning is cheap: the clip and callbacks are reference counted.
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    params: RequestParams,
    callbacks: PlaybackCallbacks,
}

impl PlaybackRequest {
    pub(crate) fn new(params: RequestParams, callbacks: PlaybackCallbacks) -> Self {
        Self { params, callbacks }
    }

    /// All plain parameters.
    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    /// Lifecycle hooks attached when the request was built.
    pub fn callbacks(&self) -> &PlaybackCallbacks {
        &self.callbacks
    }

    /// Source clip.
    pub fn clip(&self) -> &AudioClip {
        &self.params.clip
    }

    /// Mixer routing.
    pub fn output(&self) -> Option<&MixerGroup> {
        self.params.output.as_ref()
    }

    /// Linear volume.
    pub fn volume(&self) -> f32 {
        self.params.volume
    }

    /// Loop behaviour.
    pub fn looping(&self) -> &LoopSettings {
        &self.params.looping
    }

    /// Start timing.
    pub fn timing(&self) -> Timing {
        self.params.timing
    }

    /// Absolute start time against `clock`.
    pub fn play_dsp_time(&self, clock: &dyn DspClock) -> f64 {
        self.params.timing.evaluate(clock)
    }

    pub(crate) fn into_parts(self) -> (RequestParams, PlaybackCallbacks) {
        (self.params, self.callbacks)
    }

    /// Rent a builder of the matching shape pre-filled with this request.
    ///
    /// Building it again yields a request with equal [`params`](Self::params).
    pub fn to_builder(&self) -> RequestBuilder {
        match self.params.looping {
            LoopSettings::Native(_) => RequestBuilder::Snap(SnapBuilder::from_request(self)),
            LoopSettings::Window(_) => RequestBuilder::Sound(SoundBuilder::from_request(self)),
        }
    }
}
