//! Unit Pool
//!
//! Owns every playback unit for its whole lifetime. Units are rented for a
//! request and go back to the free list when the playback ends; they are
//! never destroyed before the pool itself. Each unit sits in a versioned
//! slot, and a [`Handle`] is the slot index plus the version captured when
//! the request was accepted.
//!
//! The pool is single-threaded: it is driven from the host's tick thread
//! and shared by cheap clones of [`UnitPool`].

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::callbacks::PlaybackEndCause;
use crate::device::AudioBackend;
use crate::handle::Handle;
use crate::request::PlaybackRequest;
use crate::settings::PoolSettings;
use crate::slot::{SlotKey, SlotStatus, Versioned};
use crate::timing::DspClock;
use crate::unit::{dispatch_all, PlaybackUnit, UnitEvent};
use crate::{Result, SoundSnapError};

pub use crate::unit::UnitState;

/// Counters for the pool's non-fatal conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolDiagnostics {
    /// Requests dropped because every unit was busy at the ceiling.
    pub capacity_exceeded: u64,
    /// Requests played without a mixer group.
    pub missing_mixer_group: u64,
    /// Units taken out of circulation after exhausting their versions.
    pub retired_units: u64,
}

pub(crate) struct PoolCore {
    units: Vec<Versioned<PlaybackUnit>>,
    free_count: usize,
    settings: PoolSettings,
    backend: AudioBackend,
    diagnostics: PoolDiagnostics,
    ticking: bool,
}

impl PoolCore {
    fn new(settings: PoolSettings, backend: AudioBackend) -> Self {
        let mut core = Self {
            units: Vec::with_capacity(settings.initial_unit_count),
            free_count: 0,
            settings,
            backend,
            diagnostics: PoolDiagnostics::default(),
            ticking: false,
        };
        for _ in 0..core.settings.initial_unit_count {
            core.create_unit();
            core.free_count += 1;
        }
        core
    }

    fn create_unit(&mut self) -> usize {
        let unit = PlaybackUnit::new(self.backend.create_device());
        self.units.push(Versioned::new(unit));
        let index = self.units.len() - 1;
        debug!(index, "created playback unit");
        index
    }

    fn live_units(&self) -> usize {
        self.units.len() - self.diagnostics.retired_units as usize
    }

    fn rent(&mut self) -> Result<usize> {
        if self.free_count > 0 {
            let free = self
                .units
                .iter()
                .position(|slot| slot.value().is_free() && !slot.is_retired());
            if let Some(index) = free {
                self.free_count -= 1;
                return Ok(index);
            }
        }

        match self.settings.max_units() {
            Some(max) if self.live_units() >= max => {
                self.diagnostics.capacity_exceeded += 1;
                if self.settings.warn_on_capacity_exceeded {
                    warn!(max, "max playback unit count exceeded, request dropped");
                }
                Err(SoundSnapError::CapacityExceeded { max })
            }
            _ => Ok(self.create_unit()),
        }
    }

    /// Bump a unit's slot after its playback ended and put it back in circulation.
    fn release(&mut self, index: usize) {
        match self.units[index].bump() {
            SlotStatus::Recyclable => self.free_count += 1,
            SlotStatus::Retired => self.retire(index),
        }
    }

    fn retire(&mut self, index: usize) {
        self.diagnostics.retired_units += 1;
        debug!(index, "playback unit retired after exhausting its versions");
    }

    /// Start `request` on the rented unit `index`. Every accepted request,
    /// retriggers included, passes through here.
    fn start(
        &mut self,
        index: usize,
        request: PlaybackRequest,
        events: &mut Vec<UnitEvent>,
    ) -> SlotKey {
        if request.output().is_none() {
            self.diagnostics.missing_mixer_group += 1;
            if self.settings.warn_on_missing_mixer_group {
                warn!(clip = request.clip().name(), "playing without a mixer group");
            }
        }
        let clock = Rc::clone(self.backend.clock());
        let slot = &mut self.units[index];
        slot.value_mut().play(request, clock.as_ref(), events);
        SlotKey::new(index, slot.version())
    }

    pub(crate) fn play(
        &mut self,
        request: PlaybackRequest,
        events: &mut Vec<UnitEvent>,
    ) -> Result<SlotKey> {
        let index = self.rent()?;
        Ok(self.start(index, request, events))
    }

    /// Replay on the unit `key` points at, interrupting its current playback.
    pub(crate) fn retrigger(
        &mut self,
        key: SlotKey,
        request: PlaybackRequest,
        events: &mut Vec<UnitEvent>,
    ) -> Result<SlotKey> {
        let index = key.index();
        let slot = self
            .units
            .get_mut(index)
            .filter(|slot| slot.is_valid(key.version()))
            .ok_or_else(SoundSnapError::stale_handle)?;
        slot.value_mut().end(PlaybackEndCause::Stop, events);
        match slot.bump() {
            SlotStatus::Recyclable => Ok(self.start(index, request, events)),
            SlotStatus::Retired => {
                self.retire(index);
                self.play(request, events)
            }
        }
    }

    pub(crate) fn unit(&self, key: SlotKey) -> Result<&PlaybackUnit> {
        self.units
            .get(key.index())
            .and_then(|slot| slot.get(key.version()))
            .ok_or_else(SoundSnapError::stale_handle)
    }

    pub(crate) fn unit_mut(&mut self, key: SlotKey) -> Result<&mut PlaybackUnit> {
        self.units
            .get_mut(key.index())
            .and_then(|slot| slot.get_mut(key.version()))
            .ok_or_else(SoundSnapError::stale_handle)
    }

    pub(crate) fn end_unit(
        &mut self,
        key: SlotKey,
        cause: PlaybackEndCause,
        events: &mut Vec<UnitEvent>,
    ) -> Result<()> {
        if self.unit_mut(key)?.end(cause, events) {
            self.release(key.index());
        }
        Ok(())
    }

    fn tick_unit(&mut self, index: usize, events: &mut Vec<UnitEvent>) {
        if self.units[index].value_mut().tick(events) {
            self.release(index);
        }
    }

    fn end_all(&mut self, cause: PlaybackEndCause, events: &mut Vec<UnitEvent>) {
        for index in 0..self.units.len() {
            if self.units[index].value_mut().end(cause, events) {
                self.release(index);
            }
        }
    }

    pub(crate) fn clock(&self) -> Rc<dyn DspClock> {
        Rc::clone(self.backend.clock())
    }
}

impl Drop for PoolCore {
    fn drop(&mut self) {
        let mut events = Vec::new();
        self.end_all(PlaybackEndCause::Destroy, &mut events);
        debug!(units = self.units.len(), "playback unit pool torn down");
        dispatch_all(events);
    }
}

/// Shared reference to a pool of playback units.
///
/// Clones refer to the same pool. When the last clone is dropped every
/// active unit ends with [`PlaybackEndCause::Destroy`].
#[derive(Clone)]
pub struct UnitPool {
    core: Rc<RefCell<PoolCore>>,
}

impl UnitPool {
    /// Build a pool and pre-create `settings.initial_unit_count` units.
    pub fn new(settings: PoolSettings, backend: AudioBackend) -> Self {
        Self {
            core: Rc::new(RefCell::new(PoolCore::new(settings, backend))),
        }
    }

    pub(crate) fn from_core(core: Rc<RefCell<PoolCore>>) -> Self {
        Self { core }
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<PoolCore>> {
        Rc::downgrade(&self.core)
    }

    /// Play `request` on a free unit.
    ///
    /// Under a saturated ceiling the request is dropped: the returned handle
    /// is invalid and the drop is recorded in [`diagnostics`](Self::diagnostics).
    pub fn play(&self, request: PlaybackRequest) -> Handle {
        self.try_play(request).unwrap_or_else(|_| Handle::invalid())
    }

    /// Like [`play`](Self::play), but reports a dropped request as `CapacityExceeded`.
    pub fn try_play(&self, request: PlaybackRequest) -> Result<Handle> {
        let mut events = Vec::new();
        let result = self.core.borrow_mut().play(request, &mut events);
        dispatch_all(events);
        result.map(|key| Handle::new(self.downgrade(), key))
    }

    /// Advance every unit's state machine once, in creation order.
    ///
    /// Call once per frame from the host loop. Callbacks fired by one unit
    /// run before the next unit is ticked. A call from inside a callback is
    /// ignored.
    pub fn tick(&self) {
        {
            let mut core = self.core.borrow_mut();
            if core.ticking {
                warn!("tick re-entered from a playback callback, ignoring");
                return;
            }
            core.ticking = true;
        }
        let _guard = TickGuard(&self.core);

        let mut index = 0;
        loop {
            let mut events = Vec::new();
            {
                let mut core = self.core.borrow_mut();
                if index >= core.units.len() {
                    break;
                }
                core.tick_unit(index, &mut events);
            }
            dispatch_all(events);
            index += 1;
        }
    }

    /// End every active unit with cause `Destroy`.
    pub fn shutdown(&self) {
        let mut events = Vec::new();
        self.core
            .borrow_mut()
            .end_all(PlaybackEndCause::Destroy, &mut events);
        dispatch_all(events);
    }

    /// Handles to every rented unit, scanned lazily.
    ///
    /// Each step reads the pool's current state; units ended or rented while
    /// iterating are seen as they are at that moment.
    pub fn active_handles(&self) -> ActiveHandles {
        ActiveHandles {
            core: Rc::clone(&self.core),
            next: 0,
        }
    }

    /// Units created so far, retired ones included.
    pub fn unit_count(&self) -> usize {
        self.core.borrow().units.len()
    }

    /// Units waiting to be rented.
    pub fn free_unit_count(&self) -> usize {
        self.core.borrow().free_count
    }

    /// Units currently rented.
    pub fn active_count(&self) -> usize {
        self.core
            .borrow()
            .units
            .iter()
            .filter(|slot| slot.value().state().is_active())
            .count()
    }

    /// Diagnostic counters.
    pub fn diagnostics(&self) -> PoolDiagnostics {
        self.core.borrow().diagnostics
    }

    /// Settings the pool was built with.
    pub fn settings(&self) -> PoolSettings {
        self.core.borrow().settings.clone()
    }

    /// The backend's dsp clock.
    pub fn clock(&self) -> Rc<dyn DspClock> {
        self.core.borrow().clock()
    }

    /// Whether both values refer to the same pool.
    pub fn ptr_eq(&self, other: &UnitPool) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl fmt::Debug for UnitPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("UnitPool")
            .field("units", &core.units.len())
            .field("free", &core.free_count)
            .field("diagnostics", &core.diagnostics)
            .finish()
    }
}

/// Clears the pool's tick flag when a tick finishes or unwinds.
struct TickGuard<'a>(&'a Rc<RefCell<PoolCore>>);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut core) = self.0.try_borrow_mut() {
            core.ticking = false;
        }
    }
}

/// Lazy iterator over a pool's rented units. See [`UnitPool::active_handles`].
pub struct ActiveHandles {
    core: Rc<RefCell<PoolCore>>,
    next: usize,
}

impl Iterator for ActiveHandles {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        let core = self.core.borrow();
        while self.next < core.units.len() {
            let index = self.next;
            self.next += 1;
            let slot = &core.units[index];
            if slot.value().state().is_active() {
                let key = SlotKey::new(index, slot.version());
                return Some(Handle::new(Rc::downgrade(&self.core), key));
            }
        }
        None
    }
}
