//! Handle Groups
//!
//! A [`SnapGroup`] tracks live playbacks that belong together (footsteps,
//! impacts, one character's voice) so overlap ducking can compare against
//! them. Members remove themselves when their playback ends, so a group
//! never holds a stale handle.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::callbacks::CallbackId;
use crate::handle::Handle;
use crate::{Result, SoundSnapError};

#[derive(Default)]
struct GroupState {
    members: Vec<(Handle, CallbackId)>,
}

impl GroupState {
    fn position(&self, handle: &Handle) -> Option<usize> {
        self.members.iter().position(|(member, _)| member == handle)
    }
}

/// Set of active handles. Clones share the same set.
#[derive(Clone, Default)]
pub struct SnapGroup {
    state: Rc<RefCell<GroupState>>,
}

impl SnapGroup {
    /// An empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active playback; adding a member twice does nothing.
    pub fn add(&self, handle: &Handle) -> Result<()> {
        if !handle.is_active() {
            return Err(SoundSnapError::stale_handle());
        }
        if self.contains(handle) {
            return Ok(());
        }

        let group: Weak<RefCell<GroupState>> = Rc::downgrade(&self.state);
        let member = handle.clone();
        let id = handle.on_end(move |_| {
            if let Some(state) = group.upgrade() {
                let mut state = state.borrow_mut();
                if let Some(index) = state.position(&member) {
                    state.members.remove(index);
                }
            }
        })?;
        self.state.borrow_mut().members.push((handle.clone(), id));
        Ok(())
    }

    /// Drop a member without waiting for its playback to end.
    pub fn remove(&self, handle: &Handle) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            let index = state.position(handle);
            index.map(|index| state.members.remove(index))
        };
        match removed {
            Some((member, id)) => {
                let _ = member.remove_callback(id);
                true
            }
            None => false,
        }
    }

    /// Drop every member.
    pub fn clear(&self) {
        let members = std::mem::take(&mut self.state.borrow_mut().members);
        for (member, id) in members {
            let _ = member.remove_callback(id);
        }
    }

    /// Snapshot of the current members.
    pub fn handles(&self) -> Vec<Handle> {
        self.state
            .borrow()
            .members
            .iter()
            .map(|(handle, _)| handle.clone())
            .collect()
    }

    /// Whether `handle` is a member.
    pub fn contains(&self, handle: &Handle) -> bool {
        self.state.borrow().position(handle).is_some()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.state.borrow().members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().members.is_empty()
    }
}

impl fmt::Debug for SnapGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.handles()).finish()
    }
}

/// Groups addressed by a caller-chosen key.
#[derive(Debug)]
pub struct SnapGroupMap<K> {
    groups: HashMap<K, SnapGroup>,
}

impl<K: Eq + Hash> SnapGroupMap<K> {
    /// An empty map.
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// The group for `key`, created empty on first use.
    pub fn get_or_add(&mut self, key: K) -> SnapGroup {
        self.groups.entry(key).or_default().clone()
    }

    /// The group for `key` if it exists.
    pub fn get(&self, key: &K) -> Option<SnapGroup> {
        self.groups.get(key).cloned()
    }

    /// Clear and forget the group for `key`.
    pub fn remove_group(&mut self, key: &K) -> bool {
        match self.groups.remove(key) {
            Some(group) => {
                group.clear();
                true
            }
            None => false,
        }
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no group exists.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl<K: Eq + Hash> Default for SnapGroupMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{SnapBuilder, SnapBuilderPool};
    use crate::device::AudioClip;
    use crate::pool::UnitPool;
    use crate::settings::PoolSettings;
    use crate::virtual_device::VirtualBackend;

    fn setup() -> (VirtualBackend, UnitPool, SnapBuilderPool) {
        let backend = VirtualBackend::new();
        let settings = PoolSettings {
            warn_on_missing_mixer_group: false,
            ..PoolSettings::default()
        };
        let pool = UnitPool::new(settings, backend.audio_backend());
        (backend, pool, SnapBuilderPool::new())
    }

    fn play(pool: &UnitPool, builders: &SnapBuilderPool, samples: u32) -> Handle {
        SnapBuilder::rent(builders)
            .with_clip(AudioClip::new("step", samples, 1_000, 1))
            .and_then(|b| b.play(pool))
            .unwrap()
    }

    #[test]
    fn test_member_leaves_on_stop() {
        let (_backend, pool, builders) = setup();
        let group = SnapGroup::new();
        let handle = play(&pool, &builders, 100_000);
        group.add(&handle).unwrap();
        group.add(&handle).unwrap();
        assert_eq!(group.len(), 1);

        handle.stop().unwrap();
        assert!(group.is_empty());
    }

    #[test]
    fn test_member_leaves_on_finish() {
        let (backend, pool, builders) = setup();
        let group = SnapGroup::new();
        group.add(&play(&pool, &builders, 100)).unwrap();
        backend.advance(0.5);
        pool.tick();
        assert!(group.is_empty());
    }

    #[test]
    fn test_inactive_handle_rejected() {
        let group = SnapGroup::new();
        assert!(group.add(&Handle::invalid()).unwrap_err().is_stale());
    }

    #[test]
    fn test_map_remove_group_clears() {
        let (_backend, pool, builders) = setup();
        let mut map = SnapGroupMap::new();
        let handle = play(&pool, &builders, 100_000);
        map.get_or_add("steps").add(&handle).unwrap();
        assert_eq!(map.get(&"steps").map(|g| g.len()), Some(1));

        let group = map.get(&"steps").unwrap();
        assert!(map.remove_group(&"steps"));
        assert!(group.is_empty());
        assert!(map.get(&"steps").is_none());
        assert!(!map.remove_group(&"steps"));
    }

    #[test]
    fn test_remove_detaches_callback() {
        let (_backend, pool, builders) = setup();
        let group = SnapGroup::new();
        let handle = play(&pool, &builders, 100_000);
        group.add(&handle).unwrap();
        assert!(group.remove(&handle));
        assert!(!group.remove(&handle));
        // Re-adding after removal registers a fresh callback.
        group.add(&handle).unwrap();
        handle.stop().unwrap();
        assert!(group.is_empty());
    }
}
