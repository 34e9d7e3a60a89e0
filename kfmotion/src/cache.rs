//! Shared cache of parsed motion data, keyed by asset id.

use crate::{AssetId, MotionData, MotionStats};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-wide store mapping asset ids to parsed motion data.
///
/// Guarantees each asset is parsed at most once as long as callers check the
/// cache before parsing. Entries are `Arc`-shared: evicting an id only drops
/// the cache's reference, instances that already loaded it keep theirs.
///
/// The cache is not internally synchronized; insertions and removals must be
/// serialized with reads by the owning tick loop.
#[derive(Debug, Default)]
pub struct MotionDataCache {
    entries: HashMap<AssetId, Arc<MotionData>>,
}

/// Diagnostic totals across all cached motions.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub joint_motions: usize,
    pub position_keys: usize,
    pub rotation_keys: usize,
    pub scale_keys: usize,
    pub constraints: usize,
}

impl MotionDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `id`, silently replacing any previous entry (last
    /// writer wins).
    pub fn add(&mut self, id: AssetId, data: Arc<MotionData>) {
        debug!("caching motion data for {id}");
        self.entries.insert(id, data);
    }

    pub fn get(&self, id: &AssetId) -> Option<Arc<MotionData>> {
        self.entries.get(id).cloned()
    }

    pub fn remove(&mut self, id: &AssetId) -> Option<Arc<MotionData>> {
        debug!("evicting motion data for {id}");
        self.entries.remove(id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            entries: self.entries.len(),
            ..CacheStats::default()
        };
        for data in self.entries.values() {
            let MotionStats {
                joint_motions,
                position_keys,
                rotation_keys,
                scale_keys,
                constraints,
            } = data.stats();
            stats.joint_motions += joint_motions;
            stats.position_keys += position_keys;
            stats.rotation_keys += rotation_keys;
            stats.scale_keys += scale_keys;
            stats.constraints += constraints;
        }
        stats
    }
}
