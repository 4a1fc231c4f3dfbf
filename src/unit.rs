//! Playback Unit State Machine
//!
//! One unit owns one device and runs one request at a time. Units never call
//! user code directly: every lifecycle notification is queued as a
//! [`UnitEvent`] which the pool dispatches once it has released its own
//! borrow, so callbacks may re-enter the pool freely.

use std::mem;

use crate::callbacks::{CallbackList, PlaybackCallbacks, PlaybackEndCause};
use crate::device::PlaybackDevice;
use crate::request::{LoopCount, LoopSettings, LoopWindow, PlaybackRequest};
use crate::timing::{DspClock, TimingMode};

/// Lifecycle state of a playback unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitState {
    /// Idle and available to rent.
    #[default]
    Free,
    /// Waiting for a delayed or scheduled start.
    Starting,
    /// Producing audio.
    Playing,
    /// Paused by the caller.
    Paused,
}

impl UnitState {
    /// Rented (any state other than `Free`).
    pub fn is_active(self) -> bool {
        self != UnitState::Free
    }
}

/// Deferred lifecycle notification.
pub(crate) enum UnitEvent {
    Start(CallbackList<()>),
    Loop(CallbackList<()>),
    End(PlaybackCallbacks, PlaybackEndCause),
}

impl UnitEvent {
    pub fn dispatch(self) {
        match self {
            UnitEvent::Start(list) | UnitEvent::Loop(list) => list.invoke(()),
            UnitEvent::End(callbacks, cause) => callbacks.fire_end(cause),
        }
    }
}

pub(crate) fn dispatch_all(events: Vec<UnitEvent>) {
    for event in events {
        event.dispatch();
    }
}

pub(crate) struct PlaybackUnit {
    device: Box<dyn PlaybackDevice>,
    state: UnitState,
    resume_state: UnitState,
    play_dsp_time: f64,
    looping: LoopSettings,
    callbacks: PlaybackCallbacks,
    request: Option<PlaybackRequest>,
}

impl PlaybackUnit {
    pub fn new(mut device: Box<dyn PlaybackDevice>) -> Self {
        device.set_looping(false);
        Self {
            device,
            state: UnitState::Free,
            resume_state: UnitState::Free,
            play_dsp_time: 0.0,
            looping: LoopSettings::Native(false),
            callbacks: PlaybackCallbacks::default(),
            request: None,
        }
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == UnitState::Free
    }

    pub fn device(&self) -> &dyn PlaybackDevice {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> &mut dyn PlaybackDevice {
        self.device.as_mut()
    }

    pub fn play_dsp_time(&self) -> f64 {
        self.play_dsp_time
    }

    pub fn callbacks_mut(&mut self) -> &mut PlaybackCallbacks {
        &mut self.callbacks
    }

    pub fn loop_settings(&self) -> LoopSettings {
        self.looping
    }

    /// Configure the device from `request` and start it.
    ///
    /// The caller ends any playback still running on this unit first.
    pub fn play(
        &mut self,
        request: PlaybackRequest,
        clock: &dyn DspClock,
        events: &mut Vec<UnitEvent>,
    ) {
        debug_assert!(self.is_free(), "unit must be ended before replay");
        let original = request.clone();
        let (params, callbacks) = request.into_parts();

        let device = self.device.as_mut();
        device.set_position(params.position);
        device.set_clip(Some(params.clip));
        device.set_looping(matches!(params.looping, LoopSettings::Native(true)));
        device.set_output(params.output);
        device.set_mute(params.mute);
        device.set_volume(params.volume);
        device.set_pitch(params.pitch);
        device.set_priority(params.priority);
        device.set_pan_stereo(params.pan_stereo);
        device.set_time_samples(params.start_sample);

        self.looping = params.looping;
        self.callbacks = callbacks;
        self.play_dsp_time = params.timing.evaluate(clock);

        match params.timing.mode {
            TimingMode::Immediate => {
                self.device.play();
                self.state = UnitState::Playing;
                events.push(UnitEvent::Start(self.callbacks.on_start.clone()));
            }
            TimingMode::Delay => {
                self.device.play_delayed(params.timing.value);
                self.state = UnitState::Starting;
            }
            TimingMode::Schedule => {
                self.device.play_scheduled(params.timing.value);
                self.state = UnitState::Starting;
            }
        }

        if let Some(end) = params.scheduled_end_time {
            self.device.set_scheduled_end_time(end);
        }
        self.resume_state = self.state;
        self.request = Some(original);
    }

    /// Per-tick update. Returns `true` when the playback finished this tick.
    pub fn tick(&mut self, events: &mut Vec<UnitEvent>) -> bool {
        if self.state == UnitState::Starting && self.device.is_playing() {
            self.state = UnitState::Playing;
            self.resume_state = UnitState::Playing;
            events.push(UnitEvent::Start(self.callbacks.on_start.clone()));
        }
        if self.state != UnitState::Playing {
            return false;
        }

        match self.looping {
            LoopSettings::Native(_) => {
                if self.device.looping() || self.device.is_playing() {
                    return false;
                }
                self.end(PlaybackEndCause::Finish, events)
            }
            LoopSettings::Window(window) => self.check_window(window, events),
        }
    }

    fn check_window(&mut self, mut window: LoopWindow, events: &mut Vec<UnitEvent>) -> bool {
        if self.device.time_samples() < window.end_sample && self.device.is_playing() {
            return false;
        }

        if let LoopCount::Finite(remaining) = &mut window.loop_count {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                return self.end(PlaybackEndCause::Finish, events);
            }
        }
        self.looping = LoopSettings::Window(window);
        self.wrap(&window, events);
        false
    }

    /// Reposition to the loop start, keeping the overshoot when asked to.
    fn wrap(&mut self, window: &LoopWindow, events: &mut Vec<UnitEvent>) {
        let playing = self.device.is_playing();
        let target = if window.carry_over && playing {
            let gap = self.device.time_samples().saturating_sub(window.end_sample);
            window.loop_start_sample.saturating_add(gap)
        } else {
            window.loop_start_sample
        };
        self.device.set_time_samples(target);
        if !playing {
            self.device.play();
        }
        events.push(UnitEvent::Loop(self.callbacks.on_loop.clone()));
    }

    pub fn pause(&mut self) {
        if !matches!(self.state, UnitState::Starting | UnitState::Playing) {
            return;
        }
        self.device.pause();
        self.resume_state = self.state;
        self.state = UnitState::Paused;
    }

    pub fn unpause(&mut self) {
        if self.state != UnitState::Paused {
            return;
        }
        self.device.unpause();
        self.state = self.resume_state;
    }

    pub fn set_scheduled_start_time(&mut self, dsp_time: f64) {
        self.play_dsp_time = dsp_time;
        self.device.set_scheduled_start_time(dsp_time);
    }

    pub fn set_scheduled_end_time(&mut self, dsp_time: f64) {
        self.device.set_scheduled_end_time(dsp_time);
    }

    /// Stop the device and queue the end notification.
    ///
    /// Returns `false` (and does nothing) when the unit is already free.
    pub fn end(&mut self, cause: PlaybackEndCause, events: &mut Vec<UnitEvent>) -> bool {
        if self.is_free() {
            return false;
        }
        self.state = UnitState::Free;
        self.resume_state = UnitState::Free;
        self.device.stop();
        self.request = None;
        let callbacks = mem::take(&mut self.callbacks);
        events.push(UnitEvent::End(callbacks, cause));
        true
    }

    /// Current device parameters as a request carrying the original callbacks.
    pub fn capture(&self) -> Option<PlaybackRequest> {
        let original = self.request.as_ref()?;
        let mut params = original.params().clone();
        let device = self.device.as_ref();
        if let Some(clip) = device.clip() {
            params.clip = clip.clone();
        }
        params.output = device.output().cloned();
        params.position = device.position();
        params.mute = device.mute();
        params.volume = device.volume();
        params.pitch = device.pitch();
        params.priority = device.priority();
        params.pan_stereo = device.pan_stereo();
        params.looping = match self.looping {
            LoopSettings::Native(_) => LoopSettings::Native(device.looping()),
            window @ LoopSettings::Window(_) => window,
        };
        Some(PlaybackRequest::new(params, original.callbacks().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{SnapBuilder, SnapBuilderPool, SoundBuilder, SoundBuilderPool};
    use crate::device::{AudioClip, DeviceFactory};
    use crate::virtual_device::{VirtualBackend, VirtualDeviceProbe};
    use std::cell::Cell;
    use std::rc::Rc;

    fn unit(backend: &VirtualBackend) -> (PlaybackUnit, VirtualDeviceProbe) {
        let unit = PlaybackUnit::new(backend.create_device());
        let probe = backend.device(backend.device_count() - 1).unwrap();
        (unit, probe)
    }

    fn window_request(end: i32, loop_start: i32, count: LoopCount, carry: bool) -> PlaybackRequest {
        let pool = SoundBuilderPool::new();
        SoundBuilder::rent(&pool)
            .with_clip(AudioClip::new("pad", 48_000, 1_000, 1))
            .and_then(|b| b.with_end_sample(end))
            .and_then(|b| b.with_loop_start_sample(loop_start))
            .and_then(|b| b.with_loop(count))
            .and_then(|b| b.with_carry_over(carry))
            .and_then(SoundBuilder::build)
            .unwrap()
    }

    #[test]
    fn test_carry_over_keeps_gap() {
        let backend = VirtualBackend::new();
        let (mut unit, probe) = unit(&backend);
        let mut events = Vec::new();
        let request = window_request(1_000, 200, LoopCount::Infinite, true);
        unit.play(request, backend.clock().as_ref(), &mut events);

        probe.force_time_samples(1_005);
        assert!(!unit.tick(&mut events));
        assert_eq!(probe.time_samples(), 205);
    }

    #[test]
    fn test_without_carry_over_resets_exactly() {
        let backend = VirtualBackend::new();
        let (mut unit, probe) = unit(&backend);
        let mut events = Vec::new();
        let request = window_request(1_000, 200, LoopCount::Infinite, false);
        unit.play(request, backend.clock().as_ref(), &mut events);

        probe.force_time_samples(1_005);
        unit.tick(&mut events);
        assert_eq!(probe.time_samples(), 200);
    }

    #[test]
    fn test_stopped_device_restarts_at_loop_start() {
        let backend = VirtualBackend::new();
        let (mut unit, probe) = unit(&backend);
        let mut events = Vec::new();
        let request = window_request(1_000, 200, LoopCount::Infinite, true);
        unit.play(request, backend.clock().as_ref(), &mut events);

        probe.force_stopped();
        unit.tick(&mut events);
        assert!(probe.is_playing());
        assert_eq!(probe.time_samples(), 200);
        assert_eq!(probe.counters().play, 2);
    }

    #[test]
    fn test_finite_count_counts_passes() {
        let backend = VirtualBackend::new();
        let (mut unit, probe) = unit(&backend);
        let mut events = Vec::new();
        unit.play(
            window_request(1_000, 0, LoopCount::Finite(3), true),
            backend.clock().as_ref(),
            &mut events,
        );

        let mut boundaries = 0;
        let finished = loop {
            probe.force_time_samples(1_000);
            boundaries += 1;
            if unit.tick(&mut events) {
                break true;
            }
            assert!(boundaries < 10);
        };
        assert!(finished);
        assert_eq!(boundaries, 3);
        assert!(unit.is_free());
    }

    #[test]
    fn test_zero_count_finishes_at_first_boundary() {
        let backend = VirtualBackend::new();
        let (mut unit, probe) = unit(&backend);
        let mut events = Vec::new();
        unit.play(
            window_request(1_000, 0, LoopCount::ONCE, true),
            backend.clock().as_ref(),
            &mut events,
        );
        probe.force_time_samples(1_200);
        assert!(unit.tick(&mut events));
    }

    #[test]
    fn test_delayed_start_waits_for_device() {
        let backend = VirtualBackend::new();
        let (mut unit, _probe) = unit(&backend);
        let started = Rc::new(Cell::new(0));
        let counter = Rc::clone(&started);
        let pool = SnapBuilderPool::new();
        let request = SnapBuilder::rent(&pool)
            .with_clip(AudioClip::new("hit", 10_000, 1_000, 1))
            .and_then(|b| b.with_delay(0.5))
            .and_then(|b| b.with_on_start(move |()| counter.set(counter.get() + 1)))
            .and_then(SnapBuilder::build)
            .unwrap();

        let mut events = Vec::new();
        unit.play(request, backend.clock().as_ref(), &mut events);
        assert_eq!(unit.state(), UnitState::Starting);
        assert_eq!(unit.play_dsp_time(), 0.5);
        assert!(events.is_empty());

        backend.advance(0.25);
        unit.tick(&mut events);
        assert_eq!(unit.state(), UnitState::Starting);

        backend.advance(0.5);
        unit.tick(&mut events);
        assert_eq!(unit.state(), UnitState::Playing);
        dispatch_all(events);
        assert_eq!(started.get(), 1);
    }

    #[test]
    fn test_unpause_restores_starting() {
        let backend = VirtualBackend::new();
        let (mut unit, _probe) = unit(&backend);
        let pool = SnapBuilderPool::new();
        let request = SnapBuilder::rent(&pool)
            .with_clip(AudioClip::new("hit", 10_000, 1_000, 1))
            .and_then(|b| b.with_schedule(5.0))
            .and_then(SnapBuilder::build)
            .unwrap();
        let mut events = Vec::new();
        unit.play(request, backend.clock().as_ref(), &mut events);

        unit.pause();
        assert_eq!(unit.state(), UnitState::Paused);
        unit.unpause();
        assert_eq!(unit.state(), UnitState::Starting);
    }

    #[test]
    fn test_end_is_idempotent() {
        let backend = VirtualBackend::new();
        let (mut unit, probe) = unit(&backend);
        let pool = SnapBuilderPool::new();
        let request = SnapBuilder::rent(&pool)
            .with_clip(AudioClip::new("hit", 10_000, 1_000, 1))
            .and_then(SnapBuilder::build)
            .unwrap();
        let mut events = Vec::new();
        unit.play(request, backend.clock().as_ref(), &mut events);

        assert!(unit.end(PlaybackEndCause::Stop, &mut events));
        assert!(!unit.end(PlaybackEndCause::Stop, &mut events));
        assert_eq!(probe.counters().stop, 1);
    }
}
