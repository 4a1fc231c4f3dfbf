//! Integration tests for overlap ducking
//!
//! Covers the group-based and clip-based volume adjustment helpers on both
//! builder shapes, plus cancellation tokens wired to live playbacks.

use approx::assert_relative_eq;
use soundsnap::{
    AudioClip, CancellationMode, CancellationSource, MixerGroup, PoolSettings, SnapBuilder,
    SnapGroup, SnapGroupMap, SoundBuilder, UnitPool, VirtualBackend,
};

fn create_pool() -> (VirtualBackend, UnitPool) {
    let backend = VirtualBackend::new();
    let pool = UnitPool::new(PoolSettings::default(), backend.audio_backend());
    (backend, pool)
}

fn snap(clip: &AudioClip, delay: f64) -> SnapBuilder {
    SnapBuilder::get()
        .with_clip(clip.clone())
        .and_then(|b| b.with_output(Some(MixerGroup::new("sfx"))))
        .and_then(|b| b.with_delay(delay))
        .unwrap()
}

#[test]
fn test_group_ducking_follows_start_distance() {
    let (backend, pool) = create_pool();
    let clip = AudioClip::new("step", 100_000, 1_000, 1);
    let group = SnapGroup::new();
    let clock = backend.clock().as_ref();

    let first = snap(&clip, 0.0)
        .adjust_volume_for_overlap(&group, clock)
        .and_then(|b| b.play(&pool))
        .unwrap();
    assert_eq!(first.volume().unwrap(), 1.0);
    group.add(&first).unwrap();

    let silenced = snap(&clip, 0.01)
        .adjust_volume_for_overlap(&group, clock)
        .unwrap();
    assert_eq!(silenced.volume().unwrap(), 0.0);
    silenced.dispose();

    let far = snap(&clip, 0.07)
        .adjust_volume_for_overlap(&group, clock)
        .unwrap();
    assert_relative_eq!(far.volume().unwrap(), 0.9, epsilon = 1e-6);
    far.dispose();
}

#[test]
fn test_silent_members_do_not_duck() {
    let (backend, pool) = create_pool();
    let clip = AudioClip::new("step", 100_000, 1_000, 1);
    let group = SnapGroup::new();

    let muted = snap(&clip, 0.0)
        .with_volume(0.0)
        .and_then(|b| b.play(&pool))
        .unwrap();
    group.add(&muted).unwrap();

    let next = snap(&clip, 0.01)
        .adjust_volume_for_overlap(&group, backend.clock().as_ref())
        .unwrap();
    assert_eq!(next.volume().unwrap(), 1.0);
    next.dispose();
}

#[test]
fn test_stopped_members_leave_group() {
    let (backend, pool) = create_pool();
    let clip = AudioClip::new("step", 100_000, 1_000, 1);
    let group = SnapGroup::new();

    let first = snap(&clip, 0.0).play(&pool).unwrap();
    group.add(&first).unwrap();
    first.stop().unwrap();
    assert!(group.is_empty());

    let next = snap(&clip, 0.0)
        .adjust_volume_for_overlap(&group, backend.clock().as_ref())
        .unwrap();
    assert_eq!(next.volume().unwrap(), 1.0);
    next.dispose();
}

#[test]
fn test_simultaneous_clips_only_count_same_clip() {
    let (_backend, pool) = create_pool();
    let engine = AudioClip::new("engine", 100_000, 1_000, 1);
    let horn = AudioClip::new("horn", 100_000, 1_000, 1);

    SoundBuilder::get()
        .with_clip(engine.clone())
        .and_then(|b| b.with_output(Some(MixerGroup::new("sfx"))))
        .and_then(|b| b.play(&pool))
        .unwrap();

    let other_clip = SoundBuilder::get()
        .with_clip(horn)
        .and_then(|b| b.adjust_volume_for_simultaneous_clips(&pool))
        .unwrap();
    assert_eq!(other_clip.volume().unwrap(), 1.0);
    other_clip.dispose();

    let same_clip = SoundBuilder::get()
        .with_clip(engine.clone())
        .and_then(|b| b.with_delay(0.07))
        .and_then(|b| b.adjust_volume_for_simultaneous_clips(&pool))
        .unwrap();
    assert_relative_eq!(same_clip.volume().unwrap(), 0.9, epsilon = 1e-6);
    same_clip.dispose();

    // Identical metadata is not the same clip.
    let lookalike = SoundBuilder::get()
        .with_clip(AudioClip::new("engine", 100_000, 1_000, 1))
        .and_then(|b| b.adjust_volume_for_simultaneous_clips(&pool))
        .unwrap();
    assert_eq!(lookalike.volume().unwrap(), 1.0);
    lookalike.dispose();
}

#[test]
fn test_group_map_shares_groups_by_key() {
    let (_backend, pool) = create_pool();
    let clip = AudioClip::new("voice", 100_000, 1_000, 1);
    let mut groups = SnapGroupMap::new();

    let line = snap(&clip, 0.0).play(&pool).unwrap();
    groups.get_or_add("npc").add(&line).unwrap();
    assert_eq!(groups.get_or_add("npc").len(), 1);
    assert_eq!(groups.len(), 1);

    assert!(groups.remove_group(&"npc"));
    assert!(groups.is_empty());
    assert!(line.is_active(), "removing a group leaves playback running");
}

#[test]
fn test_cancellation_stops_whole_batch() {
    let (_backend, pool) = create_pool();
    let clip = AudioClip::new("rain", 100_000, 1_000, 1);
    let source = CancellationSource::new();
    let token = source.token();

    let handles = (0..3)
        .map(|i| {
            snap(&clip, i as f64)
                .play(&pool)
                .unwrap()
                .with_cancellation(&token, CancellationMode::Stop)
        })
        .collect::<Vec<_>>();
    assert_eq!(pool.active_count(), 3);

    source.cancel();
    assert!(handles.iter().all(|handle| !handle.is_active()));
    assert_eq!(pool.active_count(), 0);
    assert_eq!(pool.free_unit_count(), 3);
}
