//! Wire codec for serialized keyframe motions.
//!
//! IO-free: the codec operates on in-memory byte buffers. All multi-byte
//! values are big-endian. Key times and component values are quantized to
//! u16 on the wire; `serialize` followed by `deserialize` is identity on the
//! quantized representation.

use crate::{
    BoundingBox, ConstraintDef, ConstraintKind, ConstraintTarget, CurveChannel, CurveKey, Error,
    GROUND_TARGET_NAME, HandPose, JointMotion, JointPriority, KEYFRAME_MOTION_SUBVERSION,
    KEYFRAME_MOTION_VERSION, MAX_ANIMATED_JOINTS, MAX_CHAIN_LENGTH, MAX_JOINT_SCALE,
    MAX_MOTION_DURATION, MAX_PELVIS_OFFSET, MotionData, PELVIS_JOINT_NAME,
};
use byteorder::{BigEndian, ByteOrder};
use glam::{Quat, Vec3};

const VOLUME_NAME_LEN: usize = 16;
const MAX_KEYS_PER_CHANNEL: i32 = u16::MAX as i32;
const MAX_CONSTRAINTS: i32 = 255;

fn quantize(value: f32, lower: f32, upper: f32) -> u16 {
    let v = value.clamp(lower, upper);
    (((v - lower) / (upper - lower)) * f32::from(u16::MAX)).round() as u16
}

fn dequantize(q: u16, lower: f32, upper: f32) -> f32 {
    lower + (f32::from(q) / f32::from(u16::MAX)) * (upper - lower)
}

struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn eof(&self, what: &str) -> Error {
        Error::BinaryParse {
            message: format!("unexpected EOF reading {what} at offset {}", self.cursor),
        }
    }

    fn read_u8(&mut self, what: &str) -> Result<u8, Error> {
        if self.cursor >= self.bytes.len() {
            return Err(self.eof(what));
        }
        let b = self.bytes[self.cursor];
        self.cursor += 1;
        Ok(b)
    }

    fn read_u16(&mut self, what: &str) -> Result<u16, Error> {
        if self.remaining() < 2 {
            return Err(self.eof(what));
        }
        let v = BigEndian::read_u16(&self.bytes[self.cursor..self.cursor + 2]);
        self.cursor += 2;
        Ok(v)
    }

    fn read_i32(&mut self, what: &str) -> Result<i32, Error> {
        if self.remaining() < 4 {
            return Err(self.eof(what));
        }
        let v = BigEndian::read_i32(&self.bytes[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(v)
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, Error> {
        if self.remaining() < 4 {
            return Err(self.eof(what));
        }
        let v = BigEndian::read_u32(&self.bytes[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(v)
    }

    fn read_f32(&mut self, what: &str) -> Result<f32, Error> {
        if self.remaining() < 4 {
            return Err(self.eof(what));
        }
        let v = BigEndian::read_f32(&self.bytes[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(v)
    }

    fn read_f32_finite(&mut self, what: &str) -> Result<f32, Error> {
        let v = self.read_f32(what)?;
        if !v.is_finite() {
            return Err(Error::BinaryParse {
                message: format!("non-finite {what}: {v}"),
            });
        }
        Ok(v)
    }

    fn read_vec3(&mut self, what: &str) -> Result<Vec3, Error> {
        let x = self.read_f32_finite(what)?;
        let y = self.read_f32_finite(what)?;
        let z = self.read_f32_finite(what)?;
        Ok(Vec3::new(x, y, z))
    }

    /// NUL-terminated UTF-8 string.
    fn read_cstr(&mut self, what: &str) -> Result<String, Error> {
        let start = self.cursor;
        let rel = self.bytes[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| self.eof(what))?;
        let raw = &self.bytes[start..start + rel];
        self.cursor = start + rel + 1;
        let s = std::str::from_utf8(raw).map_err(|e| Error::BinaryParse {
            message: format!("invalid utf-8 in {what} at offset {start}: {e}"),
        })?;
        Ok(s.to_string())
    }

    /// Fixed-width, NUL-padded name field.
    fn read_fixed_name(&mut self, len: usize, what: &str) -> Result<String, Error> {
        if self.remaining() < len {
            return Err(self.eof(what));
        }
        let raw = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(len);
        let s = std::str::from_utf8(&raw[..end]).map_err(|e| Error::BinaryParse {
            message: format!("invalid utf-8 in {what}: {e}"),
        })?;
        Ok(s.to_string())
    }
}

#[derive(Default)]
struct BinaryOutput {
    bytes: Vec<u8>,
}

impl BinaryOutput {
    fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    fn write_u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn write_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn write_f32(&mut self, v: f32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    fn write_cstr(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
    }

    fn write_fixed_name(&mut self, s: &str, len: usize) {
        let raw = s.as_bytes();
        let n = raw.len().min(len);
        self.bytes.extend_from_slice(&raw[..n]);
        for _ in n..len {
            self.bytes.push(0);
        }
    }
}

fn read_key_count(input: &mut BinaryInput<'_>, joint: &str, what: &str) -> Result<usize, Error> {
    let count = input.read_i32(what)?;
    if !(0..=MAX_KEYS_PER_CHANNEL).contains(&count) {
        return Err(Error::InvalidKeyCount {
            joint: joint.to_string(),
            count,
        });
    }
    Ok(count as usize)
}

fn read_key_time(
    input: &mut BinaryInput<'_>,
    duration: f32,
    previous: f32,
    joint: &str,
) -> Result<f32, Error> {
    let time = dequantize(input.read_u16("key time")?, 0.0, duration);
    if time < previous {
        return Err(Error::KeysOutOfOrder {
            joint: joint.to_string(),
        });
    }
    Ok(time)
}

/// Parses one serialized motion. Fails hard on a version mismatch or a
/// malformed stream; a failed parse never produces partial data.
pub fn deserialize(bytes: &[u8]) -> Result<MotionData, Error> {
    let mut input = BinaryInput::new(bytes);

    let version = input.read_u16("version")?;
    let sub_version = input.read_u16("sub_version")?;
    if version != KEYFRAME_MOTION_VERSION || sub_version != KEYFRAME_MOTION_SUBVERSION {
        return Err(Error::UnsupportedVersion {
            version,
            sub_version,
        });
    }

    let base_priority = JointPriority::from_i32(input.read_i32("base_priority")?);

    let duration = input.read_f32("duration")?;
    if !duration.is_finite() || !(0.0..=MAX_MOTION_DURATION).contains(&duration) {
        return Err(Error::InvalidDuration { value: duration });
    }

    let emote = input.read_cstr("emote_name")?;
    let emote_name = (!emote.is_empty()).then_some(emote);

    let loop_in_point = input.read_f32_finite("loop_in_point")?.clamp(0.0, duration);
    let loop_out_point = input.read_f32_finite("loop_out_point")?.clamp(0.0, duration);
    let looped = input.read_i32("loop")? != 0;
    // An unset loop-out means "wrap at the end".
    let loop_out_point = if loop_out_point <= 0.0 {
        duration
    } else {
        loop_out_point.max(loop_in_point)
    };

    let ease_in_duration = input.read_f32("ease_in_duration")?;
    let ease_out_duration = input.read_f32("ease_out_duration")?;
    for ease in [ease_in_duration, ease_out_duration] {
        if !ease.is_finite() || ease < 0.0 {
            return Err(Error::InvalidEaseDuration { value: ease });
        }
    }

    let hand_pose_raw = input.read_u32("hand_pose")?;
    let hand_pose = HandPose::from_u32(hand_pose_raw)
        .ok_or(Error::UnknownHandPose { value: hand_pose_raw })?;

    let num_joints = input.read_u32("num_joints")?;
    if num_joints as usize > MAX_ANIMATED_JOINTS {
        return Err(Error::TooManyJoints {
            count: num_joints,
            max: MAX_ANIMATED_JOINTS as u32,
        });
    }

    let mut max_priority = JointPriority::Unused;
    let mut pelvis_bounds = BoundingBox::EMPTY;
    let mut joint_motions = Vec::with_capacity(num_joints as usize);

    for _ in 0..num_joints {
        let joint_name = input.read_cstr("joint_name")?;
        if joint_name.is_empty() {
            return Err(Error::BinaryParse {
                message: format!("empty joint name at offset {}", input.cursor),
            });
        }

        let priority = JointPriority::from_i32(input.read_i32("joint_priority")?);
        max_priority = max_priority.max(priority);

        let mut jm = JointMotion::new(joint_name.clone(), priority);

        let num_rot_keys = read_key_count(&mut input, &joint_name, "num_rot_keys")?;
        let mut previous = 0.0;
        for _ in 0..num_rot_keys {
            let time = read_key_time(&mut input, duration, previous, &joint_name)?;
            previous = time;
            let x = dequantize(input.read_u16("rot x")?, -1.0, 1.0);
            let y = dequantize(input.read_u16("rot y")?, -1.0, 1.0);
            let z = dequantize(input.read_u16("rot z")?, -1.0, 1.0);
            let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
            jm.rotation.keys.push(CurveKey {
                time,
                value: Quat::from_xyzw(x, y, z, w).normalize(),
            });
        }

        let num_pos_keys = read_key_count(&mut input, &joint_name, "num_pos_keys")?;
        let mut previous = 0.0;
        for _ in 0..num_pos_keys {
            let time = read_key_time(&mut input, duration, previous, &joint_name)?;
            previous = time;
            let x = dequantize(input.read_u16("pos x")?, -MAX_PELVIS_OFFSET, MAX_PELVIS_OFFSET);
            let y = dequantize(input.read_u16("pos y")?, -MAX_PELVIS_OFFSET, MAX_PELVIS_OFFSET);
            let z = dequantize(input.read_u16("pos z")?, -MAX_PELVIS_OFFSET, MAX_PELVIS_OFFSET);
            let value = Vec3::new(x, y, z);
            if jm.joint_name == PELVIS_JOINT_NAME {
                pelvis_bounds.extend(value);
            }
            jm.position.keys.push(CurveKey { time, value });
        }

        let num_scale_keys = read_key_count(&mut input, &joint_name, "num_scale_keys")?;
        let mut previous = 0.0;
        for _ in 0..num_scale_keys {
            let time = read_key_time(&mut input, duration, previous, &joint_name)?;
            previous = time;
            let x = dequantize(input.read_u16("scale x")?, 0.0, MAX_JOINT_SCALE);
            let y = dequantize(input.read_u16("scale y")?, 0.0, MAX_JOINT_SCALE);
            let z = dequantize(input.read_u16("scale z")?, 0.0, MAX_JOINT_SCALE);
            jm.scale.keys.push(CurveKey {
                time,
                value: Vec3::new(x, y, z),
            });
        }

        jm.update_usage();
        joint_motions.push(jm);
    }

    let num_constraints = input.read_i32("num_constraints")?;
    if !(0..=MAX_CONSTRAINTS).contains(&num_constraints) {
        return Err(Error::BinaryParse {
            message: format!("invalid constraint count {num_constraints}"),
        });
    }

    let mut constraints = Vec::with_capacity(num_constraints as usize);
    for _ in 0..num_constraints {
        let chain_length = input.read_u8("chain_length")?;
        if !(1..=MAX_CHAIN_LENGTH as u8).contains(&chain_length)
            || chain_length as usize > joint_motions.len()
        {
            return Err(Error::InvalidChainLength { value: chain_length });
        }

        let kind_raw = input.read_u8("constraint_type")?;
        let kind = match kind_raw {
            0 => ConstraintKind::Point,
            1 => ConstraintKind::Plane,
            _ => return Err(Error::UnknownConstraintType { value: kind_raw }),
        };

        let source_volume = input.read_fixed_name(VOLUME_NAME_LEN, "source_volume")?;
        let source_offset = input.read_vec3("source_offset")?;
        let target_volume = input.read_fixed_name(VOLUME_NAME_LEN, "target_volume")?;
        let target = if target_volume == GROUND_TARGET_NAME {
            ConstraintTarget::Ground
        } else {
            ConstraintTarget::Body
        };
        let target_offset = input.read_vec3("target_offset")?;
        let target_dir = input.read_vec3("target_dir")?;
        let target_dir = (target_dir.length_squared() > 0.0).then(|| target_dir.normalize());

        let ease_in_start = input.read_f32_finite("constraint ease_in_start")?;
        let ease_in_stop = input.read_f32_finite("constraint ease_in_stop")?;
        let ease_out_start = input.read_f32_finite("constraint ease_out_start")?;
        let ease_out_stop = input.read_f32_finite("constraint ease_out_stop")?;
        // An unset ease-out window means "hold through the whole motion".
        let (ease_out_start, ease_out_stop) = if ease_out_stop <= 0.0 {
            (duration, duration)
        } else {
            (ease_out_start, ease_out_stop)
        };

        constraints.push(ConstraintDef {
            kind,
            target,
            chain_length: chain_length as usize,
            source_volume,
            source_offset,
            target_volume,
            target_offset,
            target_dir,
            ease_in_start,
            ease_in_stop,
            ease_out_start,
            ease_out_stop,
        });
    }

    let mut data = MotionData {
        joint_motions,
        duration,
        looped,
        loop_in_point,
        loop_out_point,
        ease_in_duration,
        ease_out_duration,
        base_priority,
        max_priority,
        hand_pose,
        emote_name,
        pelvis_bounds,
        constraints,
    };
    data.rebuild_loop_keys();
    Ok(data)
}

fn write_vec3_keys(output: &mut BinaryOutput, channel: &CurveChannel<Vec3>, duration: f32, lower: f32, upper: f32) {
    output.write_i32(channel.keys.len() as i32);
    for key in &channel.keys {
        output.write_u16(quantize(key.time, 0.0, duration));
        output.write_u16(quantize(key.value.x, lower, upper));
        output.write_u16(quantize(key.value.y, lower, upper));
        output.write_u16(quantize(key.value.z, lower, upper));
    }
}

/// Serializes a motion back to the wire layout `deserialize` reads.
pub fn serialize(data: &MotionData) -> Vec<u8> {
    let mut output = BinaryOutput::default();

    output.write_u16(KEYFRAME_MOTION_VERSION);
    output.write_u16(KEYFRAME_MOTION_SUBVERSION);
    output.write_i32(data.base_priority.to_i32());
    output.write_f32(data.duration);
    output.write_cstr(data.emote_name.as_deref().unwrap_or(""));
    output.write_f32(data.loop_in_point);
    output.write_f32(data.loop_out_point);
    output.write_i32(i32::from(data.looped));
    output.write_f32(data.ease_in_duration);
    output.write_f32(data.ease_out_duration);
    output.write_u32(data.hand_pose.to_u32());
    output.write_u32(data.joint_motions.len() as u32);

    for jm in &data.joint_motions {
        output.write_cstr(&jm.joint_name);
        output.write_i32(jm.priority.to_i32());

        output.write_i32(jm.rotation.keys.len() as i32);
        for key in &jm.rotation.keys {
            output.write_u16(quantize(key.time, 0.0, data.duration));
            // The wire drops w; keep it recoverable as a positive root.
            let q = if key.value.w < 0.0 { -key.value } else { key.value };
            output.write_u16(quantize(q.x, -1.0, 1.0));
            output.write_u16(quantize(q.y, -1.0, 1.0));
            output.write_u16(quantize(q.z, -1.0, 1.0));
        }

        write_vec3_keys(
            &mut output,
            &jm.position,
            data.duration,
            -MAX_PELVIS_OFFSET,
            MAX_PELVIS_OFFSET,
        );
        write_vec3_keys(&mut output, &jm.scale, data.duration, 0.0, MAX_JOINT_SCALE);
    }

    output.write_i32(data.constraints.len() as i32);
    for c in &data.constraints {
        output.write_u8(c.chain_length as u8);
        output.write_u8(match c.kind {
            ConstraintKind::Point => 0,
            ConstraintKind::Plane => 1,
        });
        output.write_fixed_name(&c.source_volume, VOLUME_NAME_LEN);
        output.write_vec3(c.source_offset);
        match c.target {
            ConstraintTarget::Ground => output.write_fixed_name(GROUND_TARGET_NAME, VOLUME_NAME_LEN),
            ConstraintTarget::Body => output.write_fixed_name(&c.target_volume, VOLUME_NAME_LEN),
        }
        output.write_vec3(c.target_offset);
        output.write_vec3(c.target_dir.unwrap_or(Vec3::ZERO));
        output.write_f32(c.ease_in_start);
        output.write_f32(c.ease_in_stop);
        output.write_f32(c.ease_out_start);
        output.write_f32(c.ease_out_stop);
    }

    output.bytes
}
