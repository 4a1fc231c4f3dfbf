//! Device Abstraction
//!
//! The pool never renders audio itself. Each playback unit owns one
//! [`PlaybackDevice`], an opaque sample-playback primitive supplied by the
//! host engine, and drives it only through the capabilities listed here.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::timing::DspClock;

/// World-space position carried by spatial requests (x, y, z).
pub type Vec3 = [f32; 3];

#[derive(Debug)]
struct ClipInfo {
    name: String,
    samples: u32,
    frequency: u32,
    channels: u16,
}

/// Shared descriptor of a decoded audio clip.
///
/// Clips compare by identity: two clips are the same source only if they were
/// cloned from the same descriptor, even when their metadata is identical.
#[derive(Clone)]
pub struct AudioClip(Arc<ClipInfo>);

impl AudioClip {
    /// Describe a clip of `samples` frames at `frequency` Hz.
    pub fn new(name: impl Into<String>, samples: u32, frequency: u32, channels: u16) -> Self {
        Self(Arc::new(ClipInfo {
            name: name.into(),
            samples,
            frequency,
            channels,
        }))
    }

    /// Clip name, used for diagnostics and profile lookup.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Length in sample frames.
    pub fn samples(&self) -> u32 {
        self.0.samples
    }

    /// Sample rate in Hz.
    pub fn frequency(&self) -> u32 {
        self.0.frequency
    }

    /// Channel count.
    pub fn channels(&self) -> u16 {
        self.0.channels
    }

    /// Length in seconds.
    pub fn length_seconds(&self) -> f32 {
        if self.0.frequency == 0 {
            return 0.0;
        }
        self.0.samples as f32 / self.0.frequency as f32
    }
}

impl PartialEq for AudioClip {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for AudioClip {}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("name", &self.0.name)
            .field("samples", &self.0.samples)
            .field("frequency", &self.0.frequency)
            .finish()
    }
}

/// Mixer routing target, compared by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MixerGroup(Arc<str>);

impl MixerGroup {
    /// Route to the mixer group called `name`.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Low-level sample playback primitive owned by a playback unit.
///
/// Implementations wrap whatever voice object the host engine provides. All
/// calls come from the host's single tick thread.
pub trait PlaybackDevice {
    /// Assign (or clear) the clip to play.
    fn set_clip(&mut self, clip: Option<AudioClip>);
    /// Currently assigned clip.
    fn clip(&self) -> Option<&AudioClip>;

    /// Start playing on the current clock.
    fn play(&mut self);
    /// Start playing `delay` seconds from now.
    fn play_delayed(&mut self, delay: f64);
    /// Start playing at absolute dsp time `dsp_time`.
    fn play_scheduled(&mut self, dsp_time: f64);
    /// Pause, keeping the current position.
    fn pause(&mut self);
    /// Resume after [`pause`](Self::pause).
    fn unpause(&mut self);
    /// Stop and rewind.
    fn stop(&mut self);
    /// Move a pending scheduled start.
    fn set_scheduled_start_time(&mut self, dsp_time: f64);
    /// Stop automatically at absolute dsp time `dsp_time`.
    fn set_scheduled_end_time(&mut self, dsp_time: f64);

    /// Whether the device is currently producing audio.
    fn is_playing(&self) -> bool;
    /// Playback position in samples.
    fn time_samples(&self) -> i32;
    /// Seek to a position in samples.
    fn set_time_samples(&mut self, samples: i32);
    /// Playback position in seconds.
    fn time(&self) -> f32;
    /// Seek to a position in seconds.
    fn set_time(&mut self, seconds: f32);

    /// Output volume (linear).
    fn volume(&self) -> f32;
    /// Set output volume (linear).
    fn set_volume(&mut self, volume: f32);
    /// Playback rate multiplier.
    fn pitch(&self) -> f32;
    /// Set playback rate multiplier.
    fn set_pitch(&mut self, pitch: f32);
    /// Stereo pan, -1 (left) to 1 (right).
    fn pan_stereo(&self) -> f32;
    /// Set stereo pan.
    fn set_pan_stereo(&mut self, pan: f32);
    /// Voice priority (0 = highest).
    fn priority(&self) -> i32;
    /// Set voice priority.
    fn set_priority(&mut self, priority: i32);
    /// Whether output is muted.
    fn mute(&self) -> bool;
    /// Mute or unmute.
    fn set_mute(&mut self, mute: bool);
    /// Native clip looping flag.
    fn looping(&self) -> bool;
    /// Set the native clip looping flag.
    fn set_looping(&mut self, looping: bool);
    /// Mixer routing.
    fn output(&self) -> Option<&MixerGroup>;
    /// Change mixer routing.
    fn set_output(&mut self, group: Option<MixerGroup>);
    /// World-space position of the voice.
    fn position(&self) -> Vec3;
    /// Move the voice.
    fn set_position(&mut self, position: Vec3);
}

/// Creates devices when a pool grows.
pub trait DeviceFactory {
    /// Allocate a fresh, idle device.
    fn create_device(&self) -> Box<dyn PlaybackDevice>;
}

/// Device factory plus the clock its devices run on.
#[derive(Clone)]
pub struct AudioBackend {
    factory: Rc<dyn DeviceFactory>,
    clock: Rc<dyn DspClock>,
}

impl AudioBackend {
    /// Bundle a device factory with its clock.
    pub fn new(factory: Rc<dyn DeviceFactory>, clock: Rc<dyn DspClock>) -> Self {
        Self { factory, clock }
    }

    /// Allocate a device.
    pub fn create_device(&self) -> Box<dyn PlaybackDevice> {
        self.factory.create_device()
    }

    /// The backend's dsp clock.
    pub fn clock(&self) -> &Rc<dyn DspClock> {
        &self.clock
    }
}

impl fmt::Debug for AudioBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBackend")
            .field("dsp_time", &self.clock.dsp_time())
            .finish_non_exhaustive()
    }
}
