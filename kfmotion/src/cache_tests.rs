use crate::runtime::testutil::{asset_id, empty_motion_data, position_motion};
use crate::{MotionDataCache, MotionData};
use glam::Vec3;
use std::sync::Arc;

fn cached_data() -> Arc<MotionData> {
    let mut data = empty_motion_data(2.0);
    data.joint_motions.push(position_motion(
        "pelvis",
        &[(0.0, Vec3::ZERO), (2.0, Vec3::new(1.0, 0.0, 0.0))],
    ));
    Arc::new(data)
}

#[test]
fn add_then_get_returns_same_data() {
    let mut cache = MotionDataCache::new();
    let id = asset_id(1);
    let data = cached_data();

    cache.add(id, data.clone());
    let fetched = cache.get(&id).expect("cached entry");
    assert!(Arc::ptr_eq(&fetched, &data));
}

#[test]
fn get_on_absent_id_returns_none() {
    let cache = MotionDataCache::new();
    assert!(cache.get(&asset_id(9)).is_none());
}

#[test]
fn remove_then_get_returns_none() {
    let mut cache = MotionDataCache::new();
    let id = asset_id(1);
    cache.add(id, cached_data());

    assert!(cache.remove(&id).is_some());
    assert!(cache.get(&id).is_none());
}

#[test]
fn clear_drops_all_entries() {
    let mut cache = MotionDataCache::new();
    cache.add(asset_id(1), cached_data());
    cache.add(asset_id(2), cached_data());
    assert_eq!(cache.len(), 2);

    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.get(&asset_id(1)).is_none());
}

#[test]
fn add_overwrites_silently() {
    let mut cache = MotionDataCache::new();
    let id = asset_id(1);
    let first = cached_data();
    let second = cached_data();

    cache.add(id, first.clone());
    cache.add(id, second.clone());

    let fetched = cache.get(&id).expect("cached entry");
    assert!(Arc::ptr_eq(&fetched, &second));
    assert!(!Arc::ptr_eq(&fetched, &first));
    assert_eq!(cache.len(), 1);
}

#[test]
fn eviction_does_not_invalidate_live_references() {
    let mut cache = MotionDataCache::new();
    let id = asset_id(1);
    cache.add(id, cached_data());

    let held = cache.get(&id).expect("cached entry");
    cache.clear();
    // The instance-side reference stays valid after a process-wide flush.
    assert_eq!(held.joint_motions.len(), 1);
}

#[test]
fn stats_report_totals() {
    let mut cache = MotionDataCache::new();
    cache.add(asset_id(1), cached_data());
    cache.add(asset_id(2), cached_data());

    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.joint_motions, 2);
    assert_eq!(stats.position_keys, 4);
    assert_eq!(stats.rotation_keys, 0);
    assert_eq!(stats.constraints, 0);
}
