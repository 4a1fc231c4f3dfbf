//! Parameter Builders
//!
//! Fluent staging objects for playback requests. Buffers live in a
//! [`BuilderPool`] arena threaded onto a singly-linked free list; a builder
//! is only the buffer's index plus the version captured at rental, so copies
//! are cheap and any use after the buffer went back to the pool fails with
//! [`SoundSnapError::StaleReference`].
//!
//! Two shapes exist: [`SnapBuilder`] (one-shot or natively looping
//! playback) and [`SoundBuilder`] (sample-accurate loop window with a pass
//! count). Each shape has its own thread-confined default pool.

mod random;
mod snap;
mod sound;

pub use snap::{SnapBuilder, SnapBuilderPool, SnapParams};
pub use sound::{SoundBuilder, SoundBuilderPool, SoundParams};

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::callbacks::PlaybackCallbacks;
use crate::device::{AudioClip, MixerGroup};
use crate::handle::Handle;
use crate::pool::UnitPool;
use crate::request::{PlaybackRequest, DEFAULT_PRIORITY};
use crate::slot::{SlotKey, SlotStatus, Versioned};
use crate::timing::Timing;
use crate::{Result, SoundSnapError};

/// Fields shared by both builder shapes.
#[derive(Debug, Clone)]
pub(crate) struct CommonParams {
    pub clip: Option<AudioClip>,
    pub output: Option<MixerGroup>,
    pub mute: bool,
    pub volume: f32,
    pub pitch: f32,
    pub priority: i32,
    pub pan_stereo: f32,
    pub start_sample: i32,
    pub timing: Timing,
    pub scheduled_end_time: Option<f64>,
    pub callbacks: PlaybackCallbacks,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            clip: None,
            output: None,
            mute: false,
            volume: 1.0,
            pitch: 1.0,
            priority: DEFAULT_PRIORITY,
            pan_stereo: 0.0,
            start_sample: 0,
            timing: Timing::immediate(),
            scheduled_end_time: None,
            callbacks: PlaybackCallbacks::default(),
        }
    }
}

struct BufferEntry<P> {
    slot: Versioned<P>,
    next_free: Option<u32>,
}

pub(crate) struct BuilderArena<P> {
    entries: Vec<BufferEntry<P>>,
    free_head: Option<u32>,
    retired: usize,
}

impl<P: Default> BuilderArena<P> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            retired: 0,
        }
    }

    /// Pop the free-list head, or grow the arena when the list is empty.
    fn rent(&mut self) -> SlotKey {
        match self.free_head {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                self.free_head = entry.next_free.take();
                SlotKey::new(index as usize, entry.slot.version())
            }
            None => {
                self.entries.push(BufferEntry {
                    slot: Versioned::new(P::default()),
                    next_free: None,
                });
                SlotKey::new(self.entries.len() - 1, 0)
            }
        }
    }

    fn entry(&self, key: SlotKey) -> Result<&P> {
        self.entries
            .get(key.index())
            .and_then(|entry| entry.slot.get(key.version()))
            .ok_or_else(SoundSnapError::stale_builder)
    }

    fn entry_mut(&mut self, key: SlotKey) -> Result<&mut P> {
        self.entries
            .get_mut(key.index())
            .and_then(|entry| entry.slot.get_mut(key.version()))
            .ok_or_else(SoundSnapError::stale_builder)
    }

    /// Reset and recycle a buffer that `key` still owns. Returns `false` for a stale key.
    fn release(&mut self, key: SlotKey) -> bool {
        match self.entry_mut(key) {
            Ok(params) => *params = P::default(),
            Err(_) => return false,
        }
        self.recycle(key.index());
        true
    }

    fn take(&mut self, key: SlotKey) -> Result<P> {
        let params = mem::take(self.entry_mut(key)?);
        self.recycle(key.index());
        Ok(params)
    }

    fn recycle(&mut self, index: usize) {
        let entry = &mut self.entries[index];
        match entry.slot.bump() {
            SlotStatus::Recyclable => {
                entry.next_free = self.free_head;
                self.free_head = Some(index as u32);
            }
            SlotStatus::Retired => self.retired += 1,
        }
    }

    fn free_len(&self) -> usize {
        let mut len = 0;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            len += 1;
            cursor = self.entries[index as usize].next_free;
        }
        len
    }
}

/// Arena of reusable staging buffers for one builder shape.
///
/// Cloning yields another reference to the same arena. The arena is not
/// thread-safe; it belongs to the host's tick thread.
pub struct BuilderPool<P> {
    arena: Rc<RefCell<BuilderArena<P>>>,
}

impl<P: Default> BuilderPool<P> {
    /// An empty arena; buffers are allocated on first rental.
    pub fn new() -> Self {
        Self {
            arena: Rc::new(RefCell::new(BuilderArena::new())),
        }
    }

    pub(crate) fn rent(&self) -> BuilderRef<P> {
        let key = self.arena.borrow_mut().rent();
        BuilderRef {
            pool: self.clone(),
            key,
        }
    }

    pub(crate) fn rent_with(&self, params: P) -> BuilderRef<P> {
        let mut arena = self.arena.borrow_mut();
        let key = arena.rent();
        *arena.entries[key.index()].slot.value_mut() = params;
        drop(arena);
        BuilderRef {
            pool: self.clone(),
            key,
        }
    }

    /// Buffers ever allocated (checked out, free, or retired).
    pub fn allocated(&self) -> usize {
        self.arena.borrow().entries.len()
    }

    /// Buffers waiting on the free list.
    pub fn free_len(&self) -> usize {
        self.arena.borrow().free_len()
    }

    /// Buffers permanently retired after exhausting their version range.
    pub fn retired(&self) -> usize {
        self.arena.borrow().retired
    }
}

impl<P: Default> Default for BuilderPool<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for BuilderPool<P> {
    fn clone(&self) -> Self {
        Self {
            arena: Rc::clone(&self.arena),
        }
    }
}

impl<P> fmt::Debug for BuilderPool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.arena.borrow();
        f.debug_struct("BuilderPool")
            .field("allocated", &arena.entries.len())
            .field("retired", &arena.retired)
            .finish()
    }
}

/// Version-checked reference to one checked-out buffer.
pub(crate) struct BuilderRef<P> {
    pool: BuilderPool<P>,
    key: SlotKey,
}

impl<P: Default> BuilderRef<P> {
    pub fn is_valid(&self) -> bool {
        self.pool.arena.borrow().entry(self.key).is_ok()
    }

    pub fn read<R>(&self, f: impl FnOnce(&P) -> R) -> Result<R> {
        let arena = self.pool.arena.borrow();
        arena.entry(self.key).map(f)
    }

    pub fn write(&self, f: impl FnOnce(&mut P)) -> Result<()> {
        let mut arena = self.pool.arena.borrow_mut();
        arena.entry_mut(self.key).map(f)
    }

    /// Validate with `check`, then move the staged fields out and recycle the buffer.
    ///
    /// A failed check leaves the buffer checked out and untouched.
    pub fn take_checked(&self, check: impl FnOnce(&P) -> Result<()>) -> Result<P> {
        let mut arena = self.pool.arena.borrow_mut();
        check(arena.entry(self.key)?)?;
        arena.take(self.key)
    }

    pub fn dispose(&self) {
        self.pool.arena.borrow_mut().release(self.key);
    }
}

impl<P> Clone for BuilderRef<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            key: self.key,
        }
    }
}

impl<P> fmt::Debug for BuilderRef<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderRef")
            .field("index", &self.key.index())
            .field("version", &self.key.version())
            .finish()
    }
}

pub(crate) fn require_clip(common: &CommonParams) -> Result<()> {
    if common.clip.is_none() {
        return Err(SoundSnapError::MissingSource);
    }
    Ok(())
}

/// Getters and setters shared by both builder shapes. Expects an `inner:
/// BuilderRef<P>` field where `P` has a `common: CommonParams` field.
macro_rules! shared_builder_methods {
    () => {
        /// Whether this builder still owns its buffer.
        pub fn is_valid(&self) -> bool {
            self.inner.is_valid()
        }

        /// Return the buffer to its pool.
        ///
        /// Idempotent: disposing a builder that was already built or disposed does nothing.
        pub fn dispose(&self) {
            self.inner.dispose();
        }

        /// Staged clip.
        pub fn clip(&self) -> $crate::Result<Option<$crate::device::AudioClip>> {
            self.inner.read(|p| p.common.clip.clone())
        }

        /// Staged mixer routing.
        pub fn output(&self) -> $crate::Result<Option<$crate::device::MixerGroup>> {
            self.inner.read(|p| p.common.output.clone())
        }

        /// Staged mute flag.
        pub fn mute(&self) -> $crate::Result<bool> {
            self.inner.read(|p| p.common.mute)
        }

        /// Staged volume.
        pub fn volume(&self) -> $crate::Result<f32> {
            self.inner.read(|p| p.common.volume)
        }

        /// Staged pitch.
        pub fn pitch(&self) -> $crate::Result<f32> {
            self.inner.read(|p| p.common.pitch)
        }

        /// Staged priority.
        pub fn priority(&self) -> $crate::Result<i32> {
            self.inner.read(|p| p.common.priority)
        }

        /// Staged stereo pan.
        pub fn pan_stereo(&self) -> $crate::Result<f32> {
            self.inner.read(|p| p.common.pan_stereo)
        }

        /// Staged start sample.
        pub fn start_sample(&self) -> $crate::Result<i32> {
            self.inner.read(|p| p.common.start_sample)
        }

        /// Staged start timing.
        pub fn timing(&self) -> $crate::Result<$crate::timing::Timing> {
            self.inner.read(|p| p.common.timing)
        }

        /// Staged scheduled end time.
        pub fn scheduled_end_time(&self) -> $crate::Result<Option<f64>> {
            self.inner.read(|p| p.common.scheduled_end_time)
        }

        /// Absolute start time the staged timing resolves to on `clock`.
        pub fn play_dsp_time(&self, clock: &dyn $crate::timing::DspClock) -> $crate::Result<f64> {
            self.inner.read(|p| p.common.timing.evaluate(clock))
        }

        /// Set the source clip.
        pub fn with_clip(self, clip: $crate::device::AudioClip) -> $crate::Result<Self> {
            self.inner.write(|p| p.common.clip = Some(clip))?;
            Ok(self)
        }

        /// Set (or clear) mixer routing.
        pub fn with_output(
            self,
            output: Option<$crate::device::MixerGroup>,
        ) -> $crate::Result<Self> {
            self.inner.write(|p| p.common.output = output)?;
            Ok(self)
        }

        /// Start muted or not.
        pub fn with_mute(self, mute: bool) -> $crate::Result<Self> {
            self.inner.write(|p| p.common.mute = mute)?;
            Ok(self)
        }

        /// Set linear volume. Not range-checked.
        pub fn with_volume(self, volume: f32) -> $crate::Result<Self> {
            self.inner.write(|p| p.common.volume = volume)?;
            Ok(self)
        }

        /// Set playback rate. Not range-checked.
        pub fn with_pitch(self, pitch: f32) -> $crate::Result<Self> {
            self.inner.write(|p| p.common.pitch = pitch)?;
            Ok(self)
        }

        /// Set voice priority.
        pub fn with_priority(self, priority: i32) -> $crate::Result<Self> {
            self.inner.write(|p| p.common.priority = priority)?;
            Ok(self)
        }

        /// Set stereo pan.
        pub fn with_pan_stereo(self, pan: f32) -> $crate::Result<Self> {
            self.inner.write(|p| p.common.pan_stereo = pan)?;
            Ok(self)
        }

        /// Set the first sample to play.
        pub fn with_start_sample(self, sample: i32) -> $crate::Result<Self> {
            self.inner.write(|p| p.common.start_sample = sample)?;
            Ok(self)
        }

        /// Start on the current clock.
        pub fn with_immediate(self) -> $crate::Result<Self> {
            self.with_timing($crate::timing::Timing::immediate())
        }

        /// Start `seconds` after the clock reading at play time.
        pub fn with_delay(self, seconds: f64) -> $crate::Result<Self> {
            self.with_timing($crate::timing::Timing::delay(seconds))
        }

        /// Start at absolute dsp time `dsp_time`.
        pub fn with_schedule(self, dsp_time: f64) -> $crate::Result<Self> {
            self.with_timing($crate::timing::Timing::schedule(dsp_time))
        }

        /// Set start timing directly.
        pub fn with_timing(self, timing: $crate::timing::Timing) -> $crate::Result<Self> {
            self.inner.write(|p| p.common.timing = timing)?;
            Ok(self)
        }

        /// Stop at absolute dsp time `dsp_time`; a negative value clears it.
        pub fn with_scheduled_end_time(self, dsp_time: f64) -> $crate::Result<Self> {
            self.inner
                .write(|p| p.common.scheduled_end_time = (dsp_time >= 0.0).then_some(dsp_time))?;
            Ok(self)
        }

        /// Add a hook fired when the device begins producing audio.
        pub fn with_on_start(self, callback: impl Fn(()) + 'static) -> $crate::Result<Self> {
            self.inner
                .write(|p| {
                    p.common.callbacks.on_start.push(callback);
                })?;
            Ok(self)
        }

        /// Add a hook fired when playback ends, with its cause.
        pub fn with_on_end(
            self,
            callback: impl Fn($crate::callbacks::PlaybackEndCause) + 'static,
        ) -> $crate::Result<Self> {
            self.inner
                .write(|p| {
                    p.common.callbacks.on_end.push(callback);
                })?;
            Ok(self)
        }

        /// Build and play on `pool`.
        ///
        /// Fails only for builder errors; a saturated pool yields an invalid handle.
        pub fn play(self, pool: &$crate::pool::UnitPool) -> $crate::Result<$crate::handle::Handle> {
            let request = self.build()?;
            Ok(pool.play(request))
        }

        /// Build and play on the process-wide default pool.
        pub fn play_default(self) -> $crate::Result<$crate::handle::Handle> {
            match $crate::provider::default_pool() {
                Ok(pool) => self.play(&pool),
                Err(err) => {
                    self.dispose();
                    Err(err)
                }
            }
        }
    };
}

pub(crate) use shared_builder_methods;

/// A builder of either shape, as returned by [`PlaybackRequest::to_builder`].
#[derive(Debug, Clone)]
pub enum RequestBuilder {
    /// Simple shape.
    Snap(SnapBuilder),
    /// Advanced shape.
    Sound(SoundBuilder),
}

impl RequestBuilder {
    /// Build the request, consuming the buffer.
    pub fn build(self) -> Result<PlaybackRequest> {
        match self {
            RequestBuilder::Snap(builder) => builder.build(),
            RequestBuilder::Sound(builder) => builder.build(),
        }
    }

    /// Whether the builder still owns its buffer.
    pub fn is_valid(&self) -> bool {
        match self {
            RequestBuilder::Snap(builder) => builder.is_valid(),
            RequestBuilder::Sound(builder) => builder.is_valid(),
        }
    }

    /// Return the buffer without building.
    pub fn dispose(&self) {
        match self {
            RequestBuilder::Snap(builder) => builder.dispose(),
            RequestBuilder::Sound(builder) => builder.dispose(),
        }
    }

    /// Build and play on `pool`.
    pub fn play(self, pool: &UnitPool) -> Result<Handle> {
        Ok(pool.play(self.build()?))
    }
}
