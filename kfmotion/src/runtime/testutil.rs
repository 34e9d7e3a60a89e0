//! Shared fixtures for runtime tests.

use super::character::{Character, GroundSample, JointIndex};
use crate::{
    AssetId, AssetLoader, BoundingBox, CurveKey, HandPose, JointMotion, JointPriority, MotionData,
};
use glam::{Quat, Vec3};
use std::collections::HashMap;

pub(crate) struct TestJoint {
    pub name: String,
    pub parent: Option<usize>,
    /// Rest-pose offset from the parent (rotations are identity).
    pub offset: Vec3,
}

pub(crate) struct TestCharacter {
    pub joints: Vec<TestJoint>,
    pub volumes: HashMap<String, usize>,
    pub generation: u64,
    pub ground_height: f32,
}

impl TestCharacter {
    pub fn new(joints: &[(&str, Option<usize>, Vec3)]) -> Self {
        Self {
            joints: joints
                .iter()
                .map(|(name, parent, offset)| TestJoint {
                    name: (*name).to_string(),
                    parent: *parent,
                    offset: *offset,
                })
                .collect(),
            volumes: HashMap::new(),
            generation: 1,
            ground_height: 0.0,
        }
    }

    pub fn with_volume(mut self, name: &str, joint: usize) -> Self {
        self.volumes.insert(name.to_string(), joint);
        self
    }
}

impl Character for TestCharacter {
    fn joint_index(&self, name: &str) -> Option<JointIndex> {
        self.joints.iter().position(|j| j.name == name)
    }

    fn joint_parent(&self, joint: JointIndex) -> Option<JointIndex> {
        self.joints.get(joint)?.parent
    }

    fn skeleton_generation(&self) -> u64 {
        self.generation
    }

    fn joint_world_position(&self, joint: JointIndex) -> Option<Vec3> {
        let mut position = Vec3::ZERO;
        let mut current = Some(joint);
        while let Some(index) = current {
            let j = self.joints.get(index)?;
            position += j.offset;
            current = j.parent;
        }
        Some(position)
    }

    fn joint_world_rotation(&self, joint: JointIndex) -> Option<Quat> {
        self.joints.get(joint).map(|_| Quat::IDENTITY)
    }

    fn volume_joint(&self, name: &str) -> Option<JointIndex> {
        self.volumes.get(name).copied()
    }

    fn ground_sample(&self, position: Vec3) -> GroundSample {
        GroundSample {
            position: Vec3::new(position.x, self.ground_height, position.z),
            normal: Vec3::Y,
        }
    }
}

#[derive(Default)]
pub(crate) struct TestLoader {
    pub requests: Vec<AssetId>,
}

impl AssetLoader for TestLoader {
    fn request_fetch(&mut self, id: AssetId) {
        self.requests.push(id);
    }
}

pub(crate) fn asset_id(seed: u8) -> AssetId {
    AssetId::from_bytes([seed; 16])
}

pub(crate) fn empty_motion_data(duration: f32) -> MotionData {
    MotionData {
        joint_motions: Vec::new(),
        duration,
        looped: false,
        loop_in_point: 0.0,
        loop_out_point: duration,
        ease_in_duration: 0.0,
        ease_out_duration: 0.0,
        base_priority: JointPriority::Medium,
        max_priority: JointPriority::Medium,
        hand_pose: HandPose::Relaxed,
        emote_name: None,
        pelvis_bounds: BoundingBox::EMPTY,
        constraints: Vec::new(),
    }
}

pub(crate) fn position_motion(joint: &str, keys: &[(f32, Vec3)]) -> JointMotion {
    let mut jm = JointMotion::new(joint, JointPriority::Medium);
    for (time, value) in keys {
        jm.position.keys.push(CurveKey {
            time: *time,
            value: *value,
        });
    }
    jm.update_usage();
    jm
}

pub(crate) fn rotation_motion(joint: &str, keys: &[(f32, Quat)]) -> JointMotion {
    let mut jm = JointMotion::new(joint, JointPriority::Medium);
    for (time, value) in keys {
        jm.rotation.keys.push(CurveKey {
            time: *time,
            value: *value,
        });
    }
    jm.update_usage();
    jm
}

pub(crate) fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-5,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

pub(crate) fn assert_vec3_approx(actual: Vec3, expected: Vec3) {
    let diff = (actual - expected).length();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}
