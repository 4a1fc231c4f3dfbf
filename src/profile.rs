//! Playback Profiles
//!
//! Serializable presets for both request shapes. A profile names its clip and
//! mixer group by string; a [`ClipLibrary`] resolves those names into the
//! live descriptors when the profile is turned into a builder.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::builder::{SnapBuilder, SoundBuilder};
use crate::device::{AudioClip, MixerGroup, Vec3};
use crate::handle::Handle;
use crate::pool::UnitPool;
use crate::request::{LoopCount, DEFAULT_PRIORITY};
use crate::settings::ConfigFormat;
use crate::timing::Timing;
use crate::Result;

/// Name lookup for clips and mixer groups referenced by profiles.
#[derive(Debug, Clone, Default)]
pub struct ClipLibrary {
    clips: HashMap<String, AudioClip>,
    groups: HashMap<String, MixerGroup>,
}

impl ClipLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `clip` under its own name, replacing any previous entry.
    pub fn insert_clip(&mut self, clip: AudioClip) -> Option<AudioClip> {
        self.clips.insert(clip.name().to_owned(), clip)
    }

    /// Register `group` under its own name, replacing any previous entry.
    pub fn insert_group(&mut self, group: MixerGroup) -> Option<MixerGroup> {
        self.groups.insert(group.name().to_owned(), group)
    }

    /// Clip registered as `name`.
    pub fn clip(&self, name: &str) -> Option<&AudioClip> {
        self.clips.get(name)
    }

    /// Mixer group registered as `name`.
    pub fn group(&self, name: &str) -> Option<&MixerGroup> {
        self.groups.get(name)
    }

    /// Number of registered clips.
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    fn resolve_clip(&self, name: &str) -> Option<AudioClip> {
        let clip = self.clip(name).cloned();
        if clip.is_none() {
            tracing::debug!(clip = name, "profile references an unknown clip");
        }
        clip
    }

    fn resolve_group(&self, name: Option<&str>) -> Option<MixerGroup> {
        let name = name?;
        let group = self.group(name).cloned();
        if group.is_none() {
            tracing::debug!(group = name, "profile references an unknown mixer group");
        }
        group
    }
}

fn delay_timing(delay: f64) -> Timing {
    if delay <= 0.0 {
        Timing::immediate()
    } else {
        Timing::delay(delay)
    }
}

/// Preset for the simple request shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapProfile {
    /// Clip name looked up in the library.
    pub clip: String,
    /// Mixer group name, if routed.
    pub output: Option<String>,
    /// Start muted.
    pub mute: bool,
    /// Linear volume.
    pub volume: f32,
    /// Playback rate.
    pub pitch: f32,
    /// Device priority.
    pub priority: i32,
    /// Stereo pan in [-1, 1].
    pub pan_stereo: f32,
    /// First sample played.
    pub start_sample: i32,
    /// Native device loop flag.
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Seconds before starting; zero or less starts immediately.
    pub delay: f64,
    /// World position.
    pub position: Vec3,
}

impl Default for SnapProfile {
    fn default() -> Self {
        Self {
            clip: String::new(),
            output: None,
            mute: false,
            volume: 1.0,
            pitch: 1.0,
            priority: DEFAULT_PRIORITY,
            pan_stereo: 0.0,
            start_sample: 0,
            looping: false,
            delay: 0.0,
            position: [0.0; 3],
        }
    }
}

impl SnapProfile {
    /// Rent a builder from this thread's default arena, filled from the profile.
    pub fn create_builder(&self, library: &ClipLibrary) -> Result<SnapBuilder> {
        let mut builder = SnapBuilder::get();
        if let Some(clip) = library.resolve_clip(&self.clip) {
            builder = builder.with_clip(clip)?;
        }
        builder
            .with_output(library.resolve_group(self.output.as_deref()))?
            .with_mute(self.mute)?
            .with_volume(self.volume)?
            .with_pitch(self.pitch)?
            .with_priority(self.priority)?
            .with_pan_stereo(self.pan_stereo)?
            .with_start_sample(self.start_sample)?
            .with_loop(self.looping)?
            .with_position(self.position)?
            .with_timing(delay_timing(self.delay))
    }

    /// Build and play in one step.
    pub fn play(&self, library: &ClipLibrary, pool: &UnitPool) -> Result<Handle> {
        let builder = self.create_builder(library)?;
        let request = builder.clone().build();
        if request.is_err() {
            builder.dispose();
        }
        Ok(pool.play(request?))
    }

    /// Parse a JSON profile.
    pub fn from_json(text: &str) -> Result<Self> {
        ConfigFormat::Json.parse(text)
    }

    /// Parse a RON profile.
    pub fn from_ron(text: &str) -> Result<Self> {
        ConfigFormat::Ron.parse(text)
    }

    /// Load from a `.json` or `.ron` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        ConfigFormat::load(path.as_ref())
    }
}

/// Preset for the advanced request shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundProfile {
    /// Clip name looked up in the library.
    pub clip: String,
    /// Mixer group name, if routed.
    pub output: Option<String>,
    /// Start muted.
    pub mute: bool,
    /// Linear volume.
    pub volume: f32,
    /// Playback rate.
    pub pitch: f32,
    /// Device priority.
    pub priority: i32,
    /// Stereo pan in [-1, 1].
    pub pan_stereo: f32,
    /// First sample played.
    pub start_sample: i32,
    /// Loop window end; negative means the clip's length.
    pub end_sample: i32,
    /// Where each wrap resumes.
    pub loop_start_sample: i32,
    /// Passes through the window; negative loops forever.
    pub loop_count: i32,
    /// Keep the overshoot past the window end on wrap.
    pub carry_over: bool,
    /// Seconds before starting; zero or less starts immediately.
    pub delay: f64,
}

impl Default for SoundProfile {
    fn default() -> Self {
        Self {
            clip: String::new(),
            output: None,
            mute: false,
            volume: 1.0,
            pitch: 1.0,
            priority: DEFAULT_PRIORITY,
            pan_stereo: 0.0,
            start_sample: 0,
            end_sample: -1,
            loop_start_sample: 0,
            loop_count: 0,
            carry_over: true,
            delay: 0.0,
        }
    }
}

impl SoundProfile {
    /// Rent a builder from this thread's default arena, filled from the profile.
    pub fn create_builder(&self, library: &ClipLibrary) -> Result<SoundBuilder> {
        let mut builder = SoundBuilder::get();
        if let Some(clip) = library.resolve_clip(&self.clip) {
            builder = builder.with_clip(clip)?;
        }
        builder
            .with_output(library.resolve_group(self.output.as_deref()))?
            .with_mute(self.mute)?
            .with_volume(self.volume)?
            .with_pitch(self.pitch)?
            .with_priority(self.priority)?
            .with_pan_stereo(self.pan_stereo)?
            .with_start_sample(self.start_sample)?
            .with_end_sample(self.end_sample)?
            .with_loop_start_sample(self.loop_start_sample)?
            .with_loop(LoopCount::from_raw(self.loop_count))?
            .with_carry_over(self.carry_over)?
            .with_timing(delay_timing(self.delay))
    }

    /// Build and play in one step.
    pub fn play(&self, library: &ClipLibrary, pool: &UnitPool) -> Result<Handle> {
        let builder = self.create_builder(library)?;
        let request = builder.clone().build();
        if request.is_err() {
            builder.dispose();
        }
        Ok(pool.play(request?))
    }

    /// Parse a JSON profile.
    pub fn from_json(text: &str) -> Result<Self> {
        ConfigFormat::Json.parse(text)
    }

    /// Parse a RON profile.
    pub fn from_ron(text: &str) -> Result<Self> {
        ConfigFormat::Ron.parse(text)
    }

    /// Load from a `.json` or `.ron` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        ConfigFormat::load(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::LoopSettings;
    use crate::settings::PoolSettings;
    use crate::timing::TimingMode;
    use crate::virtual_device::VirtualBackend;
    use crate::SoundSnapError;

    fn library() -> ClipLibrary {
        let mut library = ClipLibrary::new();
        library.insert_clip(AudioClip::new("door", 48_000, 48_000, 2));
        library.insert_group(MixerGroup::new("sfx"));
        library
    }

    #[test]
    fn test_snap_profile_fills_builder() {
        let profile = SnapProfile::from_json(
            r#"{"clip": "door", "output": "sfx", "volume": 0.5, "loop": true, "delay": 0.25}"#,
        )
        .unwrap();
        let builder = profile.create_builder(&library()).unwrap();
        assert_eq!(builder.volume().unwrap(), 0.5);
        assert!(builder.looping().unwrap());
        assert_eq!(builder.timing().unwrap().mode, TimingMode::Delay);
        assert_eq!(builder.output().unwrap().map(|g| g.name().to_owned()), Some("sfx".into()));
        let request = builder.build().unwrap();
        assert_eq!(request.clip().name(), "door");
    }

    #[test]
    fn test_zero_delay_is_immediate() {
        let profile = SnapProfile {
            clip: "door".into(),
            delay: 0.0,
            ..SnapProfile::default()
        };
        let builder = profile.create_builder(&library()).unwrap();
        assert_eq!(builder.timing().unwrap().mode, TimingMode::Immediate);
        builder.dispose();
    }

    #[test]
    fn test_unknown_clip_fails_to_build() {
        let profile = SnapProfile {
            clip: "missing".into(),
            ..SnapProfile::default()
        };
        let builder = profile.create_builder(&library()).unwrap();
        assert!(matches!(builder.clone().build(), Err(SoundSnapError::MissingSource)));
        builder.dispose();
    }

    #[test]
    fn test_sound_profile_from_ron() {
        let profile = SoundProfile::from_ron(
            "(clip: \"door\", end_sample: 1000, loop_start_sample: 200, loop_count: -1)",
        )
        .unwrap();
        assert!(profile.carry_over);
        let request = profile.create_builder(&library()).unwrap().build().unwrap();
        match request.params().looping {
            LoopSettings::Window(window) => {
                assert_eq!(window.end_sample, 1000);
                assert_eq!(window.loop_start_sample, 200);
                assert_eq!(window.loop_count, LoopCount::Infinite);
            }
            other => panic!("unexpected loop settings {other:?}"),
        }
    }

    #[test]
    fn test_profile_plays_on_pool() {
        let backend = VirtualBackend::new();
        let pool = UnitPool::new(PoolSettings::default(), backend.audio_backend());
        let profile = SoundProfile {
            clip: "door".into(),
            output: Some("sfx".into()),
            ..SoundProfile::default()
        };
        let handle = profile.play(&library(), &pool).unwrap();
        assert!(handle.is_active());
        assert_eq!(pool.diagnostics().missing_mixer_group, 0);
    }
}
