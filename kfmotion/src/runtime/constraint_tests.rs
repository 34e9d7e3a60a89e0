use super::testutil::{
    TestCharacter, assert_approx, assert_vec3_approx, asset_id, empty_motion_data, rotation_motion,
};
use crate::{
    ConstraintDef, ConstraintKind, ConstraintTarget, InitStatus, JointMask, KeyframeMotion,
    Motion, MotionData, MotionDataCache,
};
use glam::{Quat, Vec3};
use std::sync::Arc;

const LINK: f32 = 0.5;

/// Four-joint leg hanging straight down from the hips at (0, 2, 0).
fn leg_character() -> TestCharacter {
    TestCharacter::new(&[
        ("hips", None, Vec3::new(0.0, 2.0, 0.0)),
        ("thigh", Some(0), Vec3::new(0.0, -LINK, 0.0)),
        ("shin", Some(1), Vec3::new(0.0, -LINK, 0.0)),
        ("foot", Some(2), Vec3::new(0.0, -LINK, 0.0)),
    ])
    .with_volume("footVol", 3)
}

fn ground_constraint(kind: ConstraintKind) -> ConstraintDef {
    ConstraintDef {
        kind,
        target: ConstraintTarget::Ground,
        chain_length: 3,
        source_volume: "footVol".to_string(),
        source_offset: Vec3::ZERO,
        target_volume: String::new(),
        target_offset: Vec3::ZERO,
        target_dir: None,
        ease_in_start: 0.0,
        ease_in_stop: 0.2,
        ease_out_start: 1.6,
        ease_out_stop: 1.8,
    }
}

fn leg_data(constraint: ConstraintDef) -> MotionData {
    let mut data = empty_motion_data(2.0);
    for joint in ["hips", "thigh", "shin", "foot"] {
        data.joint_motions
            .push(rotation_motion(joint, &[(0.0, Quat::IDENTITY)]));
    }
    data.constraints.push(constraint);
    data
}

fn active_motion(data: MotionData, character: &TestCharacter) -> KeyframeMotion {
    let id = asset_id(11);
    let mut cache = MotionDataCache::new();
    cache.add(id, Arc::new(data));
    let mut loader = super::testutil::TestLoader::default();

    let mut motion = KeyframeMotion::new(id);
    assert_eq!(
        motion.initialize(character, &mut cache, &mut loader),
        InitStatus::Success
    );
    assert!(motion.activate(character));
    motion
}

/// World position of the chain tip, accumulated from the written local
/// offsets below the anchored root.
fn tip_world(motion: &KeyframeMotion, root_world: Vec3) -> Vec3 {
    let states = motion.joint_states();
    root_world + states[1].position + states[2].position + states[3].position
}

#[test]
fn constraint_weight_ramps_over_its_ease_window() {
    let character = leg_character();
    let mut motion = active_motion(leg_data(ground_constraint(ConstraintKind::Point)), &character);
    let mask = JointMask::new(4);

    motion.update(0.0, &mask, &character);
    assert!(motion.constraints()[0].is_active());
    assert_eq!(motion.constraints()[0].weight(), 0.0);

    motion.update(0.1, &mask, &character);
    assert_approx(motion.constraints()[0].weight(), 0.5);

    motion.update(0.2, &mask, &character);
    assert_eq!(motion.constraints()[0].weight(), 1.0);

    motion.update(1.0, &mask, &character);
    assert_eq!(motion.constraints()[0].weight(), 1.0);

    motion.update(1.7, &mask, &character);
    assert_approx(motion.constraints()[0].weight(), 0.5);
}

#[test]
fn constraint_deactivates_past_its_ease_window() {
    let character = leg_character();
    let mut motion = active_motion(leg_data(ground_constraint(ConstraintKind::Point)), &character);
    let mask = JointMask::new(4);

    motion.update(0.5, &mask, &character);
    assert!(motion.constraints()[0].is_active());

    motion.update(1.9, &mask, &character);
    assert!(!motion.constraints()[0].is_active());
    assert_eq!(motion.constraints()[0].weight(), 0.0);
}

#[test]
fn unreachable_ground_target_reports_fixup_error() {
    let character = leg_character();
    let mut motion = active_motion(leg_data(ground_constraint(ConstraintKind::Point)), &character);
    let mask = JointMask::new(4);

    // Full weight; the ground under the hips is 2m down but the chain only
    // reaches 1.5m, leaving a residual of 0.5m.
    motion.update(0.5, &mask, &character);
    let constraint = &motion.constraints()[0];
    assert_eq!(constraint.weight(), 1.0);
    assert_approx(constraint.fixup_error(), 0.5);
    assert_vec3_approx(
        tip_world(&motion, Vec3::new(0.0, 2.0, 0.0)),
        Vec3::new(0.0, 0.5, 0.0),
    );
}

#[test]
fn cached_link_lengths_stay_rigid_while_active() {
    let character = leg_character();
    let mut motion = active_motion(leg_data(ground_constraint(ConstraintKind::Point)), &character);
    let mask = JointMask::new(4);

    motion.update(0.0, &mask, &character);
    let cached: Vec<f32> = motion.constraints()[0].link_lengths().to_vec();
    assert_eq!(cached, vec![LINK, LINK, LINK]);
    assert_approx(motion.constraints()[0].total_length(), 3.0 * LINK);
    for fraction in motion.constraints()[0].link_fractions() {
        assert_approx(*fraction, 1.0 / 3.0);
    }

    for time in [0.3, 0.6, 0.9, 1.2] {
        motion.update(time, &mask, &character);
        assert_eq!(motion.constraints()[0].link_lengths(), cached.as_slice());
        // The written local offsets preserve the cached segment lengths.
        for state in &motion.joint_states()[1..=3] {
            assert_approx(state.position.length(), LINK);
        }
    }
}

#[test]
fn reachable_body_target_closes_the_gap() {
    let mut character = TestCharacter::new(&[
        ("hips", None, Vec3::new(0.0, 2.0, 0.0)),
        ("thigh", Some(0), Vec3::new(0.0, -LINK, 0.0)),
        ("shin", Some(1), Vec3::new(0.0, -LINK, 0.0)),
        ("foot", Some(2), Vec3::new(0.0, -LINK, 0.0)),
        ("chest", Some(0), Vec3::new(0.9, -0.4, 0.0)),
    ]);
    character.volumes.insert("footVol".to_string(), 3);
    character.volumes.insert("chestVol".to_string(), 4);

    let mut def = ground_constraint(ConstraintKind::Point);
    def.target = ConstraintTarget::Body;
    def.target_volume = "chestVol".to_string();

    let mut data = leg_data(def);
    data.joint_motions
        .push(rotation_motion("chest", &[(0.0, Quat::IDENTITY)]));
    let mut motion = active_motion(data, &character);
    let mask = JointMask::new(5);

    // Target is 0.985m from the root, well within the 1.5m chain.
    motion.update(0.5, &mask, &character);
    let constraint = &motion.constraints()[0];
    assert_eq!(constraint.weight(), 1.0);
    assert!(constraint.fixup_error() < 0.05);

    let tip = tip_world(&motion, Vec3::new(0.0, 2.0, 0.0));
    assert!(tip.distance(Vec3::new(0.9, 1.6, 0.0)) < 0.05);
}

#[test]
fn plane_constraint_only_corrects_penetration() {
    let character = leg_character();
    let mut motion = active_motion(leg_data(ground_constraint(ConstraintKind::Plane)), &character);
    let mask = JointMask::new(4);

    // Tip rests at y=0.5, above the ground plane: nothing to correct.
    motion.update(0.5, &mask, &character);
    assert_eq!(motion.constraints()[0].fixup_error(), 0.0);
    for state in &motion.joint_states()[1..=3] {
        assert_vec3_approx(state.position, Vec3::new(0.0, -LINK, 0.0));
    }

    // Raise the ground above the tip and it is pushed back onto the plane.
    let mut raised = leg_character();
    raised.ground_height = 0.75;
    let mut motion = active_motion(leg_data(ground_constraint(ConstraintKind::Plane)), &raised);
    motion.update(0.5, &mask, &raised);
    assert!(motion.constraints()[0].fixup_error() < 0.05);
    let tip = tip_world(&motion, Vec3::new(0.0, 2.0, 0.0));
    assert!(tip.y > 0.7);
}

#[test]
fn claimed_chain_joints_are_not_written() {
    let character = leg_character();
    let mut motion = active_motion(leg_data(ground_constraint(ConstraintKind::Point)), &character);
    let mut mask = JointMask::new(4);
    mask.claim(3);

    motion.update(0.5, &mask, &character);
    // The foot is owned by a higher-priority motion; the rest still solve.
    assert_eq!(motion.joint_states()[3].position, Vec3::ZERO);
    assert!(motion.joint_states()[1].position != Vec3::ZERO);
}

#[test]
fn missing_source_volume_leaves_constraint_unbound() {
    let character = leg_character();
    let mut def = ground_constraint(ConstraintKind::Point);
    def.source_volume = "noSuchVol".to_string();
    let mut motion = active_motion(leg_data(def), &character);
    let mask = JointMask::new(4);

    motion.update(0.5, &mask, &character);
    assert!(!motion.constraints()[0].is_bound());
    assert!(!motion.constraints()[0].is_active());
    assert_eq!(motion.constraints()[0].weight(), 0.0);
}
