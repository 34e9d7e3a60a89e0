//! Interfaces to the external character this engine animates.

use crate::JointPriority;
use glam::{Quat, Vec3};

/// Index of a joint within the external skeleton. Only valid for the
/// skeleton generation it was resolved under.
pub type JointIndex = usize;

/// Result of a terrain probe beneath a world position.
#[derive(Copy, Clone, Debug)]
pub struct GroundSample {
    pub position: Vec3,
    pub normal: Vec3,
}

/// The character a motion instance drives. Implemented by the renderer-side
/// skeleton owner; every world-space query the constraint solver needs goes
/// through here.
pub trait Character {
    /// Resolve a joint name to an index; `None` if the skeleton has no such
    /// joint (recoverable — that joint's channels are skipped).
    fn joint_index(&self, name: &str) -> Option<JointIndex>;

    /// Parent of `joint`; `None` at the root.
    fn joint_parent(&self, joint: JointIndex) -> Option<JointIndex>;

    /// Monotonic counter bumped on every structural skeleton change. Joint
    /// indices resolved under an older generation must be re-resolved.
    fn skeleton_generation(&self) -> u64;

    fn joint_world_position(&self, joint: JointIndex) -> Option<Vec3>;

    fn joint_world_rotation(&self, joint: JointIndex) -> Option<Quat>;

    /// Joint a named collision volume hangs off, for constraint sources and
    /// body targets.
    fn volume_joint(&self, name: &str) -> Option<JointIndex>;

    /// Terrain height and normal beneath `position`.
    fn ground_sample(&self, position: Vec3) -> GroundSample;
}

/// Local transform output for one animated joint, written during
/// `KeyframeMotion::update` and composited into the skeleton by the caller's
/// arbiter. Only the channels named in `usage` carry meaningful values.
#[derive(Clone, Debug)]
pub struct JointState {
    pub joint: Option<JointIndex>,
    pub usage: u32,
    pub priority: JointPriority,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl JointState {
    pub fn new(usage: u32, priority: JointPriority) -> Self {
        Self {
            joint: None,
            usage,
            priority,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Per-joint claim flags the caller maintains across overlapping motions
/// within one tick. A claimed joint is already owned by a higher-priority
/// motion; lower-priority motions leave it alone.
#[derive(Clone, Debug, Default)]
pub struct JointMask {
    claims: Vec<u8>,
}

impl JointMask {
    pub fn new(num_joints: usize) -> Self {
        Self {
            claims: vec![0; num_joints],
        }
    }

    pub fn claim(&mut self, joint: JointIndex) {
        if let Some(slot) = self.claims.get_mut(joint) {
            *slot = 1;
        }
    }

    pub fn is_claimed(&self, joint: JointIndex) -> bool {
        self.claims.get(joint).copied().unwrap_or(0) != 0
    }

    pub fn clear(&mut self) {
        self.claims.fill(0);
    }
}
