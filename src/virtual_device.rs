//! Virtual Device
//!
//! A headless [`PlaybackDevice`] driven by a settable clock. It renders no
//! audio: it only advances a sample cursor the way a real voice would, so the
//! pool's state machine can be exercised deterministically in tests and in
//! the simulation binary.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::device::{AudioBackend, AudioClip, DeviceFactory, MixerGroup, PlaybackDevice, Vec3};
use crate::request::DEFAULT_PRIORITY;
use crate::timing::DspClock;

/// Manually advanced dsp clock.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<f64>,
}

impl VirtualClock {
    /// A clock reading `start` seconds.
    pub fn new(start: f64) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, dsp_time: f64) {
        self.now.set(dsp_time);
    }

    /// Move forward by `dt` seconds.
    pub fn advance(&self, dt: f64) {
        self.now.set(self.now.get() + dt);
    }
}

impl DspClock for VirtualClock {
    fn dsp_time(&self) -> f64 {
        self.now.get()
    }
}

/// How often each transport call reached a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    /// `play` calls.
    pub play: u32,
    /// `play_delayed` calls.
    pub play_delayed: u32,
    /// `play_scheduled` calls.
    pub play_scheduled: u32,
    /// `pause` calls.
    pub pause: u32,
    /// `unpause` calls.
    pub unpause: u32,
    /// `stop` calls.
    pub stop: u32,
    /// Seeks through `set_time_samples` or `set_time`.
    pub seeks: u32,
}

#[derive(Debug)]
struct DeviceState {
    clip: Option<AudioClip>,
    output: Option<MixerGroup>,
    position: Vec3,
    volume: f32,
    pitch: f32,
    pan_stereo: f32,
    priority: i32,
    mute: bool,
    looping: bool,
    playing: bool,
    paused: bool,
    pending_start: Option<f64>,
    scheduled_end: Option<f64>,
    cursor: f64,
    counters: DeviceCounters,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            clip: None,
            output: None,
            position: [0.0; 3],
            volume: 1.0,
            pitch: 1.0,
            pan_stereo: 0.0,
            priority: DEFAULT_PRIORITY,
            mute: false,
            looping: false,
            playing: false,
            paused: false,
            pending_start: None,
            scheduled_end: None,
            cursor: 0.0,
            counters: DeviceCounters::default(),
        }
    }
}

impl DeviceState {
    fn halt(&mut self) {
        self.playing = false;
        self.paused = false;
        self.pending_start = None;
        self.scheduled_end = None;
        self.cursor = 0.0;
    }

    /// Advance to `now`, `dt` seconds after the previous step.
    fn advance(&mut self, now: f64, dt: f64) {
        if self.paused {
            return;
        }
        let mut elapsed = dt;
        if let Some(start) = self.pending_start {
            if now < start {
                return;
            }
            self.pending_start = None;
            self.playing = true;
            elapsed = (now - start).clamp(0.0, dt);
        }
        if !self.playing {
            return;
        }
        if self.scheduled_end.is_some_and(|end| now >= end) {
            self.halt();
            return;
        }
        let Some(clip) = &self.clip else {
            self.halt();
            return;
        };
        let length = clip.samples() as f64;
        self.cursor += elapsed * clip.frequency() as f64 * self.pitch as f64;
        if self.cursor >= length {
            if self.looping && length > 0.0 {
                self.cursor %= length;
            } else {
                self.halt();
            }
        }
    }

    fn rate(&self) -> f64 {
        self.clip.as_ref().map_or(0.0, |clip| clip.frequency() as f64)
    }
}

/// Simulated voice. Create through [`VirtualBackend`].
pub struct VirtualDevice {
    state: Rc<RefCell<DeviceState>>,
    clock: Rc<VirtualClock>,
    clip: Option<AudioClip>,
    output: Option<MixerGroup>,
}

impl fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("state", &self.state.borrow())
            .finish()
    }
}

impl PlaybackDevice for VirtualDevice {
    fn set_clip(&mut self, clip: Option<AudioClip>) {
        self.state.borrow_mut().clip = clip.clone();
        self.clip = clip;
    }

    fn clip(&self) -> Option<&AudioClip> {
        self.clip.as_ref()
    }

    fn play(&mut self) {
        let mut state = self.state.borrow_mut();
        state.counters.play += 1;
        state.pending_start = None;
        state.paused = false;
        state.playing = true;
    }

    fn play_delayed(&mut self, delay: f64) {
        let now = self.clock.dsp_time();
        let mut state = self.state.borrow_mut();
        state.counters.play_delayed += 1;
        state.playing = false;
        state.paused = false;
        state.pending_start = Some(now + delay);
    }

    fn play_scheduled(&mut self, dsp_time: f64) {
        let mut state = self.state.borrow_mut();
        state.counters.play_scheduled += 1;
        state.playing = false;
        state.paused = false;
        state.pending_start = Some(dsp_time);
    }

    fn pause(&mut self) {
        let mut state = self.state.borrow_mut();
        state.counters.pause += 1;
        if state.playing || state.pending_start.is_some() {
            state.paused = true;
        }
    }

    fn unpause(&mut self) {
        let mut state = self.state.borrow_mut();
        state.counters.unpause += 1;
        state.paused = false;
    }

    fn stop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.counters.stop += 1;
        state.halt();
    }

    fn set_scheduled_start_time(&mut self, dsp_time: f64) {
        let mut state = self.state.borrow_mut();
        if state.pending_start.is_some() {
            state.pending_start = Some(dsp_time);
        }
    }

    fn set_scheduled_end_time(&mut self, dsp_time: f64) {
        self.state.borrow_mut().scheduled_end = Some(dsp_time);
    }

    fn is_playing(&self) -> bool {
        let state = self.state.borrow();
        state.playing && !state.paused
    }

    fn time_samples(&self) -> i32 {
        self.state.borrow().cursor as i32
    }

    fn set_time_samples(&mut self, samples: i32) {
        let mut state = self.state.borrow_mut();
        state.counters.seeks += 1;
        state.cursor = samples.max(0) as f64;
    }

    fn time(&self) -> f32 {
        let state = self.state.borrow();
        let rate = state.rate();
        if rate == 0.0 {
            return 0.0;
        }
        (state.cursor / rate) as f32
    }

    fn set_time(&mut self, seconds: f32) {
        let mut state = self.state.borrow_mut();
        state.counters.seeks += 1;
        state.cursor = (seconds.max(0.0) as f64) * state.rate();
    }

    fn volume(&self) -> f32 {
        self.state.borrow().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.borrow_mut().volume = volume;
    }

    fn pitch(&self) -> f32 {
        self.state.borrow().pitch
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.state.borrow_mut().pitch = pitch;
    }

    fn pan_stereo(&self) -> f32 {
        self.state.borrow().pan_stereo
    }

    fn set_pan_stereo(&mut self, pan: f32) {
        self.state.borrow_mut().pan_stereo = pan;
    }

    fn priority(&self) -> i32 {
        self.state.borrow().priority
    }

    fn set_priority(&mut self, priority: i32) {
        self.state.borrow_mut().priority = priority;
    }

    fn mute(&self) -> bool {
        self.state.borrow().mute
    }

    fn set_mute(&mut self, mute: bool) {
        self.state.borrow_mut().mute = mute;
    }

    fn looping(&self) -> bool {
        self.state.borrow().looping
    }

    fn set_looping(&mut self, looping: bool) {
        self.state.borrow_mut().looping = looping;
    }

    fn output(&self) -> Option<&MixerGroup> {
        self.output.as_ref()
    }

    fn set_output(&mut self, group: Option<MixerGroup>) {
        self.state.borrow_mut().output = group.clone();
        self.output = group;
    }

    fn position(&self) -> Vec3 {
        self.state.borrow().position
    }

    fn set_position(&mut self, position: Vec3) {
        self.state.borrow_mut().position = position;
    }
}

/// Test-side view of one [`VirtualDevice`].
#[derive(Clone)]
pub struct VirtualDeviceProbe {
    state: Rc<RefCell<DeviceState>>,
}

impl VirtualDeviceProbe {
    /// Producing audio (started and not paused).
    pub fn is_playing(&self) -> bool {
        let state = self.state.borrow();
        state.playing && !state.paused
    }

    /// Paused by the unit.
    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    /// Pending scheduled start, if any.
    pub fn scheduled_start(&self) -> Option<f64> {
        self.state.borrow().pending_start
    }

    /// Scheduled end, if any.
    pub fn scheduled_end(&self) -> Option<f64> {
        self.state.borrow().scheduled_end
    }

    /// Cursor in samples.
    pub fn time_samples(&self) -> i32 {
        self.state.borrow().cursor as i32
    }

    /// Output volume.
    pub fn volume(&self) -> f32 {
        self.state.borrow().volume
    }

    /// Native loop flag.
    pub fn looping(&self) -> bool {
        self.state.borrow().looping
    }

    /// Assigned clip.
    pub fn clip(&self) -> Option<AudioClip> {
        self.state.borrow().clip.clone()
    }

    /// Transport call counters.
    pub fn counters(&self) -> DeviceCounters {
        self.state.borrow().counters
    }

    /// Move the cursor without counting a seek.
    pub fn force_time_samples(&self, samples: i32) {
        self.state.borrow_mut().cursor = samples.max(0) as f64;
    }

    /// Stop the voice as if the engine had stopped it on its own.
    pub fn force_stopped(&self) {
        self.state.borrow_mut().halt();
    }
}

impl fmt::Debug for VirtualDeviceProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDeviceProbe")
            .field("state", &self.state.borrow())
            .finish()
    }
}

/// Device factory that keeps a probe to every device it made.
#[derive(Clone, Default)]
pub struct VirtualBackend {
    clock: Rc<VirtualClock>,
    devices: Rc<RefCell<Vec<VirtualDeviceProbe>>>,
}

impl VirtualBackend {
    /// A backend whose clock starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared clock.
    pub fn clock(&self) -> &Rc<VirtualClock> {
        &self.clock
    }

    /// Bundle as an [`AudioBackend`] for a pool.
    pub fn audio_backend(&self) -> AudioBackend {
        AudioBackend::new(Rc::new(self.clone()), self.clock.clone())
    }

    /// Probes for every device created so far, in creation order.
    pub fn devices(&self) -> Vec<VirtualDeviceProbe> {
        self.devices.borrow().clone()
    }

    /// Probe for the `index`-th created device.
    pub fn device(&self, index: usize) -> Option<VirtualDeviceProbe> {
        self.devices.borrow().get(index).cloned()
    }

    /// Number of devices created.
    pub fn device_count(&self) -> usize {
        self.devices.borrow().len()
    }

    /// Move the clock forward by `dt` and advance every device.
    pub fn advance(&self, dt: f64) {
        self.clock.advance(dt);
        let now = self.clock.dsp_time();
        for probe in self.devices.borrow().iter() {
            probe.state.borrow_mut().advance(now, dt);
        }
    }
}

impl DeviceFactory for VirtualBackend {
    fn create_device(&self) -> Box<dyn PlaybackDevice> {
        let state = Rc::new(RefCell::new(DeviceState::default()));
        self.devices.borrow_mut().push(VirtualDeviceProbe {
            state: Rc::clone(&state),
        });
        Box::new(VirtualDevice {
            state,
            clock: Rc::clone(&self.clock),
            clip: None,
            output: None,
        })
    }
}

impl fmt::Debug for VirtualBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualBackend")
            .field("dsp_time", &self.clock.dsp_time())
            .field("devices", &self.devices.borrow().len())
            .finish()
    }
}
