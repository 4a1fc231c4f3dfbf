//! Playback Handles
//!
//! A [`Handle`] never owns its unit. It holds a weak reference to the pool
//! plus the slot index and version captured when the request was accepted,
//! and every access re-checks that version. Once the unit finishes, is
//! stopped, or is reused, every accessor fails with `StaleReference` and
//! [`Handle::is_active`] returns `false`.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use crate::callbacks::{CallbackId, PlaybackCallbacks, PlaybackEndCause};
use crate::device::{AudioClip, MixerGroup, PlaybackDevice, Vec3};
use crate::pool::{PoolCore, UnitPool, UnitState};
use crate::request::{LoopSettings, PlaybackRequest};
use crate::slot::SlotKey;
use crate::unit::{dispatch_all, PlaybackUnit, UnitEvent};
use crate::{Result, SoundSnapError};

/// Version-checked reference to one playback.
#[derive(Clone)]
pub struct Handle {
    pool: Weak<RefCell<PoolCore>>,
    key: SlotKey,
}

impl Handle {
    pub(crate) fn new(pool: Weak<RefCell<PoolCore>>, key: SlotKey) -> Self {
        Self { pool, key }
    }

    /// A handle that is never active, returned for dropped requests.
    pub fn invalid() -> Self {
        Self {
            pool: Weak::new(),
            key: SlotKey::new(0, 0),
        }
    }

    fn core(&self) -> Result<Rc<RefCell<PoolCore>>> {
        self.pool.upgrade().ok_or_else(SoundSnapError::stale_handle)
    }

    fn read<R>(&self, f: impl FnOnce(&PlaybackUnit) -> R) -> Result<R> {
        let core = self.core()?;
        let core = core.borrow();
        core.unit(self.key).map(f)
    }

    fn write<R>(&self, f: impl FnOnce(&mut PlaybackUnit) -> R) -> Result<R> {
        let core = self.core()?;
        let mut core = core.borrow_mut();
        core.unit_mut(self.key).map(f)
    }

    fn read_device<R>(&self, f: impl FnOnce(&dyn PlaybackDevice) -> R) -> Result<R> {
        self.read(|unit| f(unit.device()))
    }

    fn write_device(&self, f: impl FnOnce(&mut dyn PlaybackDevice)) -> Result<()> {
        self.write(|unit| f(unit.device_mut()))
    }

    /// Run a pool operation that may queue lifecycle events, then dispatch
    /// them once the pool is released.
    fn control<R>(
        &self,
        f: impl FnOnce(&mut PoolCore, SlotKey, &mut Vec<UnitEvent>) -> Result<R>,
    ) -> Result<R> {
        let core = self.core()?;
        let mut events = Vec::new();
        let result = f(&mut core.borrow_mut(), self.key, &mut events);
        dispatch_all(events);
        result
    }

    /// Whether the playback this handle was issued for is still running.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.pool
            .upgrade()
            .is_some_and(|core| core.borrow().unit(self.key).is_ok())
    }

    /// The pool the playback runs on.
    pub fn pool(&self) -> Result<UnitPool> {
        self.core().map(UnitPool::from_core)
    }

    /// Current unit state.
    pub fn state(&self) -> Result<UnitState> {
        self.read(PlaybackUnit::state)
    }

    /// Stop the playback; `on_stop` and `on_end(Stop)` fire.
    pub fn stop(&self) -> Result<()> {
        self.control(|core, key, events| core.end_unit(key, PlaybackEndCause::Stop, events))
    }

    /// Pause a starting or playing playback.
    pub fn pause(&self) -> Result<()> {
        self.write(PlaybackUnit::pause)
    }

    /// Resume a paused playback in the state it was paused in.
    pub fn unpause(&self) -> Result<()> {
        self.write(PlaybackUnit::unpause)
    }

    /// Move a pending scheduled start.
    pub fn set_scheduled_start_time(&self, dsp_time: f64) -> Result<()> {
        self.write(|unit| unit.set_scheduled_start_time(dsp_time))
    }

    /// Stop automatically at absolute dsp time `dsp_time`.
    pub fn set_scheduled_end_time(&self, dsp_time: f64) -> Result<()> {
        self.write(|unit| unit.set_scheduled_end_time(dsp_time))
    }

    /// Absolute dsp time the playback was scheduled to start at.
    pub fn play_dsp_time(&self) -> Result<f64> {
        self.read(PlaybackUnit::play_dsp_time)
    }

    /// Whether the device is producing audio.
    pub fn is_playing(&self) -> Result<bool> {
        self.read_device(|device| device.is_playing())
    }

    /// Assigned clip.
    pub fn clip(&self) -> Result<Option<AudioClip>> {
        self.read_device(|device| device.clip().cloned())
    }

    /// Swap the clip mid-playback.
    pub fn set_clip(&self, clip: AudioClip) -> Result<()> {
        self.write_device(|device| device.set_clip(Some(clip)))
    }

    /// Mixer routing.
    pub fn output(&self) -> Result<Option<MixerGroup>> {
        self.read_device(|device| device.output().cloned())
    }

    /// Change mixer routing.
    pub fn set_output(&self, group: Option<MixerGroup>) -> Result<()> {
        self.write_device(|device| device.set_output(group))
    }

    /// World position.
    pub fn position(&self) -> Result<Vec3> {
        self.read_device(|device| device.position())
    }

    /// Move the voice.
    pub fn set_position(&self, position: Vec3) -> Result<()> {
        self.write_device(|device| device.set_position(position))
    }

    /// Linear volume.
    pub fn volume(&self) -> Result<f32> {
        self.read_device(|device| device.volume())
    }

    /// Set linear volume.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.write_device(|device| device.set_volume(volume))
    }

    /// Playback rate.
    pub fn pitch(&self) -> Result<f32> {
        self.read_device(|device| device.pitch())
    }

    /// Set playback rate.
    pub fn set_pitch(&self, pitch: f32) -> Result<()> {
        self.write_device(|device| device.set_pitch(pitch))
    }

    /// Stereo pan.
    pub fn pan_stereo(&self) -> Result<f32> {
        self.read_device(|device| device.pan_stereo())
    }

    /// Set stereo pan.
    pub fn set_pan_stereo(&self, pan: f32) -> Result<()> {
        self.write_device(|device| device.set_pan_stereo(pan))
    }

    /// Voice priority.
    pub fn priority(&self) -> Result<i32> {
        self.read_device(|device| device.priority())
    }

    /// Set voice priority.
    pub fn set_priority(&self, priority: i32) -> Result<()> {
        self.write_device(|device| device.set_priority(priority))
    }

    /// Mute flag.
    pub fn mute(&self) -> Result<bool> {
        self.read_device(|device| device.mute())
    }

    /// Mute or unmute.
    pub fn set_mute(&self, mute: bool) -> Result<()> {
        self.write_device(|device| device.set_mute(mute))
    }

    /// Native loop flag.
    pub fn looping(&self) -> Result<bool> {
        self.read_device(|device| device.looping())
    }

    /// Toggle the native loop flag. Has no effect on a loop window.
    pub fn set_looping(&self, looping: bool) -> Result<()> {
        self.write_device(|device| device.set_looping(looping))
    }

    /// Loop behaviour, including the passes still left in a loop window.
    pub fn loop_settings(&self) -> Result<LoopSettings> {
        self.read(PlaybackUnit::loop_settings)
    }

    /// Position in seconds.
    pub fn time(&self) -> Result<f32> {
        self.read_device(|device| device.time())
    }

    /// Seek in seconds.
    pub fn set_time(&self, seconds: f32) -> Result<()> {
        self.write_device(|device| device.set_time(seconds))
    }

    /// Position in samples.
    pub fn time_samples(&self) -> Result<i32> {
        self.read_device(|device| device.time_samples())
    }

    /// Seek in samples.
    pub fn set_time_samples(&self, samples: i32) -> Result<()> {
        self.write_device(|device| device.set_time_samples(samples))
    }

    fn attach<R>(&self, f: impl FnOnce(&mut PlaybackCallbacks) -> R) -> Result<R> {
        self.write(|unit| f(unit.callbacks_mut()))
    }

    /// Run `callback` when the device begins producing audio.
    pub fn on_start(&self, callback: impl Fn(()) + 'static) -> Result<CallbackId> {
        self.attach(|callbacks| callbacks.on_start.push(callback))
    }

    /// Run `callback` after each wrap of a loop window.
    pub fn on_loop(&self, callback: impl Fn(()) + 'static) -> Result<CallbackId> {
        self.attach(|callbacks| callbacks.on_loop.push(callback))
    }

    /// Run `callback` when the playback is stopped or destroyed.
    pub fn on_stop(&self, callback: impl Fn(()) + 'static) -> Result<CallbackId> {
        self.attach(|callbacks| callbacks.on_stop.push(callback))
    }

    /// Run `callback` when the playback finishes on its own.
    pub fn on_complete(&self, callback: impl Fn(()) + 'static) -> Result<CallbackId> {
        self.attach(|callbacks| callbacks.on_complete.push(callback))
    }

    /// Run `callback` when the playback ends for any cause.
    pub fn on_end(&self, callback: impl Fn(PlaybackEndCause) + 'static) -> Result<CallbackId> {
        self.attach(|callbacks| callbacks.on_end.push(callback))
    }

    /// Detach a callback. Returns `false` if it was not attached to this playback.
    pub fn remove_callback(&self, id: CallbackId) -> Result<bool> {
        self.attach(|callbacks| callbacks.remove(id))
    }

    /// Read the live parameters back into a request.
    ///
    /// The request carries the callbacks of the request that started the
    /// playback; callbacks attached through the handle afterwards are not
    /// included.
    pub fn capture(&self) -> Result<PlaybackRequest> {
        self.read(PlaybackUnit::capture)?
            .ok_or_else(SoundSnapError::stale_handle)
    }

    /// Replay on the same unit, interrupting the current playback.
    ///
    /// The current playback ends with cause `Stop` and this handle goes
    /// stale; the returned handle refers to the new playback.
    pub fn retrigger(&self, request: PlaybackRequest) -> Result<Handle> {
        let key = self.control(|core, key, events| core.retrigger(key, request, events))?;
        Ok(Handle::new(self.pool.clone(), key))
    }

    #[cfg(test)]
    pub(crate) fn key(&self) -> SlotKey {
        self.key
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::invalid()
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.pool, &other.pool) && self.key == other.key
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.pool.as_ptr() as *const () as usize).hash(state);
        self.key.hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.key.index())
            .field("version", &self.key.version())
            .field("active", &self.is_active())
            .finish()
    }
}
