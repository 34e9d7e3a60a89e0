//! Per-instance constraint state: eased, chain-limited positional fix-up.

use super::character::{Character, JointIndex, JointMask, JointState};
use crate::model::{ConstraintDef, ConstraintKind, ConstraintTarget, MAX_CHAIN_LENGTH, USAGE_POSITION};
use glam::{Quat, Vec3};
use log::warn;

/// Joints in a full chain: the links plus the anchored root.
pub const CHAIN_JOINTS: usize = MAX_CHAIN_LENGTH + 1;

/// Backward/forward passes per frame. Chains are at most `MAX_CHAIN_LENGTH`
/// links, so a handful of passes closes everything a rigid chain can reach;
/// the remainder is reported as `fixup_error`.
const SOLVER_PASSES: usize = 8;

/// Runtime state for one authored constraint on one playing instance.
///
/// Segment lengths are cached on the first active frame and treated as rigid
/// for the lifetime of that activation. The fix-up error is diagnostic only:
/// an unreachable target degrades gracefully, it never fails the motion.
#[derive(Clone, Debug)]
pub struct ConstraintRuntime {
    bound: bool,
    active: bool,
    weight: f32,
    /// Links in the chain (joints - 1).
    chain_len: usize,
    /// Skeleton joints, root first, tip last.
    chain_joints: [JointIndex; CHAIN_JOINTS],
    /// Indices into the owning instance's joint-state list, parallel to
    /// `chain_joints`.
    chain_states: [usize; CHAIN_JOINTS],
    /// Current world positions, refreshed every applied frame.
    positions: [Vec3; CHAIN_JOINTS],
    link_lengths: [f32; MAX_CHAIN_LENGTH],
    link_fractions: [f32; MAX_CHAIN_LENGTH],
    total_length: f32,
    target_joint: Option<JointIndex>,
    fixup_error: f32,
}

impl ConstraintRuntime {
    pub(crate) fn new() -> Self {
        Self {
            bound: false,
            active: false,
            weight: 0.0,
            chain_len: 0,
            chain_joints: [0; CHAIN_JOINTS],
            chain_states: [0; CHAIN_JOINTS],
            positions: [Vec3::ZERO; CHAIN_JOINTS],
            link_lengths: [0.0; MAX_CHAIN_LENGTH],
            link_fractions: [0.0; MAX_CHAIN_LENGTH],
            total_length: 0.0,
            target_joint: None,
            fixup_error: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Current blend weight, 0 = fully curve-driven, 1 = fully constrained.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Residual distance the last solve could not close. Diagnostic only.
    pub fn fixup_error(&self) -> f32 {
        self.fixup_error
    }

    /// Segment lengths cached on the first active frame, root link first.
    pub fn link_lengths(&self) -> &[f32] {
        &self.link_lengths[..self.chain_len]
    }

    /// Each cached segment's fraction of the total chain length.
    pub fn link_fractions(&self) -> &[f32] {
        &self.link_fractions[..self.chain_len]
    }

    pub fn total_length(&self) -> f32 {
        self.total_length
    }

    /// Resolves the joint chain against the bound skeleton. The chain runs
    /// from the source volume's joint up `chain_length` parents; every chain
    /// joint must be animated by the owning motion so the fix-up has a state
    /// to write into.
    pub(crate) fn bind(
        &mut self,
        def: &ConstraintDef,
        character: &dyn Character,
        joint_states: &[JointState],
    ) {
        self.bound = false;

        let Some(tip) = character.volume_joint(&def.source_volume) else {
            warn!("constraint source volume '{}' not found", def.source_volume);
            self.active = false;
            return;
        };

        let mut chain = [0; CHAIN_JOINTS];
        chain[def.chain_length] = tip;
        let mut joint = tip;
        for link in (0..def.chain_length).rev() {
            let Some(parent) = character.joint_parent(joint) else {
                warn!(
                    "constraint chain for '{}' runs past the skeleton root",
                    def.source_volume
                );
                self.active = false;
                return;
            };
            chain[link] = parent;
            joint = parent;
        }

        let mut states = [0; CHAIN_JOINTS];
        for (slot, chain_joint) in states
            .iter_mut()
            .zip(chain.iter())
            .take(def.chain_length + 1)
        {
            let Some(state_index) = joint_states
                .iter()
                .position(|js| js.joint == Some(*chain_joint))
            else {
                warn!(
                    "constraint chain joint {chain_joint} is not animated by this motion"
                );
                self.active = false;
                return;
            };
            *slot = state_index;
        }

        self.chain_len = def.chain_length;
        self.chain_joints = chain;
        self.chain_states = states;
        self.target_joint = match def.target {
            ConstraintTarget::Body => {
                let Some(joint) = character.volume_joint(&def.target_volume) else {
                    warn!("constraint target volume '{}' not found", def.target_volume);
                    self.active = false;
                    return;
                };
                Some(joint)
            }
            ConstraintTarget::Ground => None,
        };
        self.bound = true;
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
        self.weight = 0.0;
    }

    /// Steps the constraint for one frame at motion-local `time`.
    pub(crate) fn update(
        &mut self,
        def: &ConstraintDef,
        time: f32,
        mask: &JointMask,
        character: &dyn Character,
        joint_states: &mut [JointState],
    ) {
        if !self.bound {
            return;
        }

        if time < def.ease_in_start || time > def.ease_out_stop {
            // Outside the window the constraint contributes nothing; a loop
            // wrap back before the window re-activates it from scratch.
            self.deactivate();
            return;
        }

        if !self.active && !self.activate(character) {
            return;
        }

        self.weight = ease_weight(def, time);
        self.apply(def, mask, character, joint_states);
    }

    /// First active frame: caches segment lengths off the current pose.
    fn activate(&mut self, character: &dyn Character) -> bool {
        if !self.refresh_positions(character) {
            return false;
        }

        let mut total = 0.0;
        for link in 0..self.chain_len {
            let length = self.positions[link + 1].distance(self.positions[link]);
            self.link_lengths[link] = length;
            total += length;
        }
        if total <= 0.0 {
            warn!("constraint chain has zero length, leaving inactive");
            return false;
        }
        for link in 0..self.chain_len {
            self.link_fractions[link] = self.link_lengths[link] / total;
        }
        self.total_length = total;
        self.weight = 0.0;
        self.fixup_error = 0.0;
        self.active = true;
        true
    }

    fn refresh_positions(&mut self, character: &dyn Character) -> bool {
        for i in 0..=self.chain_len {
            let Some(pos) = character.joint_world_position(self.chain_joints[i]) else {
                return false;
            };
            self.positions[i] = pos;
        }
        true
    }

    fn apply(
        &mut self,
        def: &ConstraintDef,
        mask: &JointMask,
        character: &dyn Character,
        joint_states: &mut [JointState],
    ) {
        let n = self.chain_len;
        if !self.refresh_positions(character) {
            return;
        }

        let tip_rotation = character
            .joint_world_rotation(self.chain_joints[n])
            .unwrap_or(Quat::IDENTITY);
        let contact = self.positions[n] + tip_rotation * def.source_offset;

        let (target_pos, normal) = match def.target {
            ConstraintTarget::Ground => {
                let sample = character.ground_sample(self.positions[0]);
                let normal = def.target_dir.unwrap_or(sample.normal);
                (sample.position + def.target_offset, normal)
            }
            ConstraintTarget::Body => {
                let Some(joint) = self.target_joint else {
                    return;
                };
                let Some(pos) = character.joint_world_position(joint) else {
                    return;
                };
                let rot = character
                    .joint_world_rotation(joint)
                    .unwrap_or(Quat::IDENTITY);
                (pos + rot * def.target_offset, def.target_dir.unwrap_or(Vec3::Y))
            }
        };

        let desired_contact = match def.kind {
            ConstraintKind::Point => target_pos,
            ConstraintKind::Plane => {
                let depth = (contact - target_pos).dot(normal);
                if depth >= 0.0 {
                    contact
                } else {
                    contact - normal * depth
                }
            }
        };
        let goal = self.positions[n] + (desired_contact - contact);

        let solved = self.solve(goal);
        self.fixup_error = solved[n].distance(goal);

        // Root stays anchored; blend the rest toward the solved pose.
        for i in 1..=n {
            let js = &mut joint_states[self.chain_states[i]];
            let Some(joint) = js.joint else {
                continue;
            };
            if mask.is_claimed(joint) {
                continue;
            }
            let parent_rotation = character
                .joint_world_rotation(self.chain_joints[i - 1])
                .unwrap_or(Quat::IDENTITY);
            let world = self.positions[i].lerp(solved[i], self.weight);
            let parent_world = self.positions[i - 1].lerp(solved[i - 1], self.weight);
            js.position = parent_rotation.inverse() * (world - parent_world);
            js.usage |= USAGE_POSITION;
        }
    }

    /// Position-only fix-up: drag the chain onto the goal from the tip, then
    /// re-anchor the root, restoring the cached segment lengths each pass.
    fn solve(&self, goal: Vec3) -> [Vec3; CHAIN_JOINTS] {
        let n = self.chain_len;
        let mut solved = self.positions;

        // A chain lying exactly along the root-goal axis has no direction to
        // fold into when the goal is closer than full extension; seed a bend.
        let axis = goal - self.positions[0];
        if axis.length() < self.total_length {
            let axis_dir = axis.normalize_or_zero();
            if axis_dir != Vec3::ZERO && self.is_colinear_with(axis_dir) {
                let bend = perpendicular(axis_dir) * 0.1 * self.total_length;
                for position in solved.iter_mut().take(n).skip(1) {
                    *position += bend;
                }
            }
        }

        for _ in 0..SOLVER_PASSES {
            solved[n] = goal;
            for i in (0..n).rev() {
                let dir = link_dir(solved[i], solved[i + 1], self.positions[i], self.positions[i + 1]);
                solved[i] = solved[i + 1] + dir * self.link_lengths[i];
            }

            solved[0] = self.positions[0];
            for i in 1..=n {
                let dir = link_dir(solved[i], solved[i - 1], self.positions[i], self.positions[i - 1]);
                solved[i] = solved[i - 1] + dir * self.link_lengths[i - 1];
            }
        }
        solved
    }

    fn is_colinear_with(&self, axis_dir: Vec3) -> bool {
        let root = self.positions[0];
        for i in 1..self.chain_len {
            let offset = self.positions[i] - root;
            let lateral = offset - axis_dir * offset.dot(axis_dir);
            if lateral.length_squared() > 1.0e-6 {
                return false;
            }
        }
        true
    }
}

/// Any unit vector orthogonal to `v`.
fn perpendicular(v: Vec3) -> Vec3 {
    let candidate = if v.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    v.cross(candidate).normalize_or_zero()
}

/// Direction from `to` toward `from`, falling back to the unsolved pose when
/// two solved joints coincide.
fn link_dir(from: Vec3, to: Vec3, fallback_from: Vec3, fallback_to: Vec3) -> Vec3 {
    let dir = (from - to).normalize_or_zero();
    if dir != Vec3::ZERO {
        return dir;
    }
    let dir = (fallback_from - fallback_to).normalize_or_zero();
    if dir != Vec3::ZERO { dir } else { Vec3::Y }
}

/// Linear ramp over the constraint's own ease schedule.
fn ease_weight(def: &ConstraintDef, time: f32) -> f32 {
    let rise = if def.ease_in_stop > def.ease_in_start {
        ((time - def.ease_in_start) / (def.ease_in_stop - def.ease_in_start)).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let fall = if def.ease_out_stop > def.ease_out_start {
        ((def.ease_out_stop - time) / (def.ease_out_stop - def.ease_out_start)).clamp(0.0, 1.0)
    } else if time >= def.ease_out_stop {
        0.0
    } else {
        1.0
    };
    rise.min(fall)
}
