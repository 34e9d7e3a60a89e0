use glam::{Quat, Vec3};

/// Channel drives the joint's local position.
pub const USAGE_POSITION: u32 = 1 << 0;
/// Channel drives the joint's local rotation.
pub const USAGE_ROTATION: u32 = 1 << 1;
/// Channel drives the joint's local scale.
pub const USAGE_SCALE: u32 = 1 << 2;

/// Longest joint chain a positional constraint may fix up (links, not joints).
pub const MAX_CHAIN_LENGTH: usize = 4;

/// Upper bound on serialized motion duration, seconds.
pub const MAX_MOTION_DURATION: f32 = 60.0;

/// Upper bound on animated joints per motion.
pub const MAX_ANIMATED_JOINTS: usize = 216;

/// Quantization range for position keys, meters around the rest point.
pub const MAX_PELVIS_OFFSET: f32 = 5.0;

/// Quantization range for scale keys.
pub const MAX_JOINT_SCALE: f32 = 10.0;

/// Screen coverage below which the arbiter should not activate keyframe
/// motions for a character.
pub const MIN_REQUIRED_PIXEL_AREA: f32 = 40.0;

/// Joint the local-space bounding box is accumulated for during parsing.
pub const PELVIS_JOINT_NAME: &str = "pelvis";

/// Target volume name that selects a ground target on the wire.
pub const GROUND_TARGET_NAME: &str = "GROUND";

/// Ordinal a blending arbiter uses to pick a winner when several motions
/// drive the same joint.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum JointPriority {
    Unused,
    #[default]
    Low,
    Medium,
    High,
    Highest,
}

impl JointPriority {
    pub(crate) fn from_i32(value: i32) -> Self {
        match value {
            i32::MIN..=0 => JointPriority::Unused,
            1 => JointPriority::Low,
            2 => JointPriority::Medium,
            3 => JointPriority::High,
            _ => JointPriority::Highest,
        }
    }

    pub(crate) fn to_i32(self) -> i32 {
        match self {
            JointPriority::Unused => 0,
            JointPriority::Low => 1,
            JointPriority::Medium => 2,
            JointPriority::High => 3,
            JointPriority::Highest => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum Interpolation {
    Step,
    #[default]
    Linear,
    /// Shortest-path spherical interpolation; only meaningful for rotation
    /// channels.
    Spherical,
}

/// Authored hand pose the motion requests while it plays.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum HandPose {
    Spread,
    #[default]
    Relaxed,
    Point,
    Fist,
    RelaxedLeft,
    PointLeft,
    FistLeft,
    RelaxedRight,
    PointRight,
    FistRight,
    SaluteRight,
    Typing,
    PeaceRight,
}

impl HandPose {
    pub(crate) fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => HandPose::Spread,
            1 => HandPose::Relaxed,
            2 => HandPose::Point,
            3 => HandPose::Fist,
            4 => HandPose::RelaxedLeft,
            5 => HandPose::PointLeft,
            6 => HandPose::FistLeft,
            7 => HandPose::RelaxedRight,
            8 => HandPose::PointRight,
            9 => HandPose::FistRight,
            10 => HandPose::SaluteRight,
            11 => HandPose::Typing,
            12 => HandPose::PeaceRight,
            _ => return None,
        })
    }

    pub(crate) fn to_u32(self) -> u32 {
        match self {
            HandPose::Spread => 0,
            HandPose::Relaxed => 1,
            HandPose::Point => 2,
            HandPose::Fist => 3,
            HandPose::RelaxedLeft => 4,
            HandPose::PointLeft => 5,
            HandPose::FistLeft => 6,
            HandPose::RelaxedRight => 7,
            HandPose::PointRight => 8,
            HandPose::FistRight => 9,
            HandPose::SaluteRight => 10,
            HandPose::Typing => 11,
            HandPose::PeaceRight => 12,
        }
    }
}

/// Value type a curve channel can animate.
pub trait CurveValue: Copy {
    /// Value an empty channel evaluates to.
    const EMPTY: Self;

    fn lerp(self, other: Self, u: f32) -> Self;

    /// Shortest-path interpolation; identical to `lerp` for vectors.
    fn slerp(self, other: Self, u: f32) -> Self {
        self.lerp(other, u)
    }
}

impl CurveValue for Vec3 {
    const EMPTY: Self = Vec3::ZERO;

    fn lerp(self, other: Self, u: f32) -> Self {
        Vec3::lerp(self, other, u)
    }
}

impl CurveValue for Quat {
    const EMPTY: Self = Quat::IDENTITY;

    fn lerp(self, other: Self, u: f32) -> Self {
        Quat::lerp(self, other, u)
    }

    fn slerp(self, other: Self, u: f32) -> Self {
        Quat::slerp(self, other, u)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct CurveKey<T> {
    pub time: f32,
    pub value: T,
}

/// Ordered keyframe samples of one animated quantity for one joint.
///
/// Keys are kept in ascending-time order; lookup assumes sortedness. The loop
/// keys are the wrap targets used when looped playback runs past the last
/// real key (see [`CurveChannel::evaluate`]).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct CurveChannel<T: CurveValue> {
    pub interpolation: Interpolation,
    pub keys: Vec<CurveKey<T>>,
    pub loop_in_key: Option<CurveKey<T>>,
    pub loop_out_key: Option<CurveKey<T>>,
}

impl<T: CurveValue> CurveChannel<T> {
    pub fn new(interpolation: Interpolation) -> Self {
        Self {
            interpolation,
            keys: Vec::new(),
            loop_in_key: None,
            loop_out_key: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    fn interp(&self, u: f32, before: T, after: T) -> T {
        match self.interpolation {
            Interpolation::Step => before,
            Interpolation::Linear => T::lerp(before, after, u),
            Interpolation::Spherical => T::slerp(before, after, u),
        }
    }

    /// Value at `time`. `duration` is the motion's clamped duration, used as
    /// the wrap span when evaluation runs past the last key of a looping
    /// channel.
    ///
    /// Defined for any `time` in `[0, duration]` regardless of key count: an
    /// empty channel returns the type's identity value, a one-key channel
    /// holds that value for all time. Past the last key the value holds (no
    /// extrapolation) unless a loop-in key is present, in which case the
    /// last key blends toward it over `[last.time, duration]`.
    pub fn evaluate(&self, time: f32, duration: f32) -> T {
        let Some(last) = self.keys.last() else {
            return T::EMPTY;
        };

        let index = self.keys.partition_point(|k| k.time < time);
        if index == self.keys.len() {
            let Some(loop_in) = self.loop_in_key else {
                return last.value;
            };
            let span = duration - last.time;
            if span <= 0.0 {
                return loop_in.value;
            }
            let u = (time - last.time) / span;
            return self.interp(u, last.value, loop_in.value);
        }

        let found = &self.keys[index];
        if index == 0 || found.time == time {
            return found.value;
        }

        let before = &self.keys[index - 1];
        let u = (time - before.time) / (found.time - before.time);
        self.interp(u, before.value, found.value)
    }

    /// Recomputes the loop wrap keys from the channel's own samples. Called
    /// after parsing when the owning motion loops; cleared otherwise.
    pub fn rebuild_loop_keys(&mut self, loop_in: f32, loop_out: f32, duration: f32) {
        if self.keys.is_empty() {
            self.loop_in_key = None;
            self.loop_out_key = None;
            return;
        }
        self.loop_in_key = Some(CurveKey {
            time: loop_in,
            value: self.evaluate(loop_in, duration),
        });
        self.loop_out_key = Some(CurveKey {
            time: loop_out,
            value: self.evaluate(loop_out, duration),
        });
    }

    pub fn clear_loop_keys(&mut self) {
        self.loop_in_key = None;
        self.loop_out_key = None;
    }
}

/// The three channels plus blending metadata for one skeleton joint.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct JointMotion {
    pub joint_name: String,
    pub priority: JointPriority,
    /// Which of the three channels actually drive the joint. An unanimated
    /// channel must not override the skeleton's rest pose.
    pub usage: u32,
    pub position: CurveChannel<Vec3>,
    pub rotation: CurveChannel<Quat>,
    pub scale: CurveChannel<Vec3>,
}

impl JointMotion {
    pub fn new(joint_name: impl Into<String>, priority: JointPriority) -> Self {
        Self {
            joint_name: joint_name.into(),
            priority,
            usage: 0,
            position: CurveChannel::new(Interpolation::Linear),
            rotation: CurveChannel::new(Interpolation::Spherical),
            scale: CurveChannel::new(Interpolation::Linear),
        }
    }

    /// Derives the usage bits from key presence.
    pub fn update_usage(&mut self) {
        let mut usage = 0;
        if !self.position.is_empty() {
            usage |= USAGE_POSITION;
        }
        if !self.rotation.is_empty() {
            usage |= USAGE_ROTATION;
        }
        if !self.scale.is_empty() {
            usage |= USAGE_SCALE;
        }
        self.usage = usage;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum ConstraintKind {
    /// Pull the chain tip to the target position.
    #[default]
    Point,
    /// Keep the chain tip on the positive side of the target plane.
    Plane,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum ConstraintTarget {
    /// Another collision volume on the same character.
    #[default]
    Body,
    /// The terrain beneath the chain.
    Ground,
}

/// Authored constraint record, immutable once parsed. Per-instance state
/// lives in `ConstraintRuntime`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct ConstraintDef {
    pub kind: ConstraintKind,
    pub target: ConstraintTarget,
    /// Links in the fixed-up chain, `1..=MAX_CHAIN_LENGTH`.
    pub chain_length: usize,
    /// Collision volume the chain tip hangs off.
    pub source_volume: String,
    /// Contact point offset from the tip joint, in the tip's frame.
    pub source_offset: Vec3,
    /// Target collision volume for body targets.
    pub target_volume: String,
    pub target_offset: Vec3,
    /// Plane normal override; `None` uses the probed ground normal.
    pub target_dir: Option<Vec3>,
    /// Ease window, seconds on the owning motion's clock.
    pub ease_in_start: f32,
    pub ease_in_stop: f32,
    pub ease_out_start: f32,
    pub ease_out_stop: f32,
}

/// Local-space axis-aligned bounds. Empty until the first `extend`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub const EMPTY: BoundingBox = BoundingBox {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Diagnostic totals for one parsed motion.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MotionStats {
    pub joint_motions: usize,
    pub position_keys: usize,
    pub rotation_keys: usize,
    pub scale_keys: usize,
    pub constraints: usize,
}

/// A fully parsed motion asset.
///
/// Immutable after construction: the cache owns the canonical `Arc` and every
/// playing instance clones it at load time, so eviction can never invalidate
/// an in-flight playback.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct MotionData {
    pub joint_motions: Vec<JointMotion>,
    pub duration: f32,
    pub looped: bool,
    pub loop_in_point: f32,
    pub loop_out_point: f32,
    pub ease_in_duration: f32,
    pub ease_out_duration: f32,
    pub base_priority: JointPriority,
    /// Highest per-joint priority across the motion.
    pub max_priority: JointPriority,
    pub hand_pose: HandPose,
    /// Facial emote asset played alongside this motion, if any.
    pub emote_name: Option<String>,
    /// Bounds of the pelvis position channel, for external ground clamping.
    pub pelvis_bounds: BoundingBox,
    pub constraints: Vec<ConstraintDef>,
}

impl MotionData {
    pub fn num_joint_motions(&self) -> usize {
        self.joint_motions.len()
    }

    pub fn joint_motion(&self, index: usize) -> Option<&JointMotion> {
        self.joint_motions.get(index)
    }

    /// Recomputes every channel's loop wrap keys from the loop points.
    pub fn rebuild_loop_keys(&mut self) {
        let (loop_in, loop_out, duration) = (self.loop_in_point, self.loop_out_point, self.duration);
        for jm in &mut self.joint_motions {
            if self.looped {
                jm.position.rebuild_loop_keys(loop_in, loop_out, duration);
                jm.rotation.rebuild_loop_keys(loop_in, loop_out, duration);
                jm.scale.rebuild_loop_keys(loop_in, loop_out, duration);
            } else {
                jm.position.clear_loop_keys();
                jm.rotation.clear_loop_keys();
                jm.scale.clear_loop_keys();
            }
        }
    }

    pub fn stats(&self) -> MotionStats {
        let mut stats = MotionStats {
            joint_motions: self.joint_motions.len(),
            constraints: self.constraints.len(),
            ..MotionStats::default()
        };
        for jm in &self.joint_motions {
            stats.position_keys += jm.position.len();
            stats.rotation_keys += jm.rotation.len();
            stats.scale_keys += jm.scale.len();
        }
        stats
    }
}
