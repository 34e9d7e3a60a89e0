//! The per-instance playback state machine.
//!
//! A `KeyframeMotion` binds one parsed motion asset to one character:
//! unloaded → loading → loaded → active → easing out → idle. The arbiter
//! drives it through the [`Motion`] trait, advances it every tick with
//! [`KeyframeMotion::update`], and composites the resulting joint states by
//! priority and [`KeyframeMotion::blend_weight`].

use super::character::{Character, JointIndex, JointMask, JointState};
use super::constraint::ConstraintRuntime;
use crate::model::{
    BoundingBox, HandPose, JointPriority, MIN_REQUIRED_PIXEL_AREA, MotionData, PELVIS_JOINT_NAME,
    USAGE_POSITION, USAGE_ROTATION, USAGE_SCALE,
};
use crate::{AssetId, Error, MotionDataCache, binary};
use log::warn;
use std::sync::Arc;

/// Lifecycle of the backing asset for one motion instance.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum AssetStatus {
    #[default]
    Undefined,
    /// A fetch has been requested and is in flight.
    NeedsFetch,
    /// Bytes arrived, parse pending.
    Fetched,
    Loaded,
    FetchFailed,
}

/// Outcome of [`Motion::initialize`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InitStatus {
    Failure,
    Success,
    /// Asset fetch in flight; try again after the load completes.
    Hold,
}

/// How the arbiter composites this motion with others.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BlendType {
    #[default]
    Normal,
    Additive,
}

/// Capability interface the motion arbiter drives playback through. One
/// motion kind = one implementation; the arbiter holds `Box<dyn Motion>`.
///
/// Every query is safe before the asset is loaded and falls back to inert
/// defaults (zero duration, no loop, low priority).
pub trait Motion {
    fn loops(&self) -> bool;
    fn duration(&self) -> f32;
    fn ease_in_duration(&self) -> f32;
    fn ease_out_duration(&self) -> f32;
    fn priority(&self) -> JointPriority;

    fn blend_type(&self) -> BlendType {
        BlendType::Normal
    }

    /// Screen coverage below which the arbiter should not activate this
    /// motion.
    fn min_pixel_area(&self) -> f32;

    /// Resolves the motion's data from the cache or requests an async fetch.
    /// Returns `Hold` until the fetch completes.
    fn initialize(
        &mut self,
        character: &dyn Character,
        cache: &mut MotionDataCache,
        loader: &mut dyn AssetLoader,
    ) -> InitStatus;

    /// Starts driving the character. Returns false if the pose cannot be set
    /// up, in which case the arbiter must not call `update`.
    fn activate(&mut self, character: &dyn Character) -> bool;

    /// Advances to instance-local `time` and evaluates every channel.
    /// Returns false exactly when playback is complete and the instance may
    /// be deactivated.
    fn update(&mut self, time: f32, mask: &JointMask, character: &dyn Character) -> bool;

    fn deactivate(&mut self);

    /// Forces the effective end of playback, still honoring ease-out.
    fn set_stop_time(&mut self, time: f32);
}

/// Asset transport the engine requests motion bytes through.
///
/// Fetches complete asynchronously on the loader's own schedule; the host is
/// responsible for marshalling the payload back onto the owning thread and
/// delivering it via [`KeyframeMotion::handle_fetch_complete`]. A completion
/// for an instance that no longer exists is simply dropped.
pub trait AssetLoader {
    fn request_fetch(&mut self, id: AssetId);
}

/// Overrides staged by setters. Snapshotted into effect at the next
/// activation, never applied retroactively to an in-flight playback.
#[derive(Clone, Debug, Default)]
struct PendingOverrides {
    looped: Option<bool>,
    loop_in_point: Option<f32>,
    loop_out_point: Option<f32>,
    priority: Option<JointPriority>,
    ease_in_duration: Option<f32>,
    ease_out_duration: Option<f32>,
    hand_pose: Option<HandPose>,
    emote_name: Option<Option<String>>,
}

/// Playback parameters in effect for the current activation.
#[derive(Clone, Debug, Default)]
struct ActiveParams {
    looped: bool,
    loop_in_point: f32,
    loop_out_point: f32,
    priority: JointPriority,
    ease_in_duration: f32,
    ease_out_duration: f32,
    hand_pose: HandPose,
    emote_name: Option<String>,
}

/// One playing (or loading) keyframe motion bound to one character.
#[derive(Debug)]
pub struct KeyframeMotion {
    id: AssetId,
    data: Option<Arc<MotionData>>,
    asset_status: AssetStatus,
    /// Per-joint outputs, parallel to the data's joint motions.
    joint_states: Vec<JointState>,
    /// Skeleton generation the joint indices were resolved under.
    bound_generation: Option<u64>,
    pelvis_joint: Option<JointIndex>,
    /// Runtime state, parallel to the data's constraint defs.
    constraints: Vec<ConstraintRuntime>,
    overrides: PendingOverrides,
    params: ActiveParams,
    active: bool,
    last_update_time: f32,
    last_looped_time: f32,
    stop_time: Option<f32>,
}

impl KeyframeMotion {
    pub fn new(id: AssetId) -> Self {
        Self {
            id,
            data: None,
            asset_status: AssetStatus::Undefined,
            joint_states: Vec::new(),
            bound_generation: None,
            pelvis_joint: None,
            constraints: Vec::new(),
            overrides: PendingOverrides::default(),
            params: ActiveParams::default(),
            active: false,
            last_update_time: 0.0,
            last_looped_time: 0.0,
            stop_time: None,
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn asset_status(&self) -> AssetStatus {
        self.asset_status
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn data(&self) -> Option<&Arc<MotionData>> {
        self.data.as_ref()
    }

    /// Joint outputs of the last `update`, for the arbiter to composite.
    pub fn joint_states(&self) -> &[JointState] {
        &self.joint_states
    }

    /// Constraint runtime state, exposed for diagnostics.
    pub fn constraints(&self) -> &[ConstraintRuntime] {
        &self.constraints
    }

    /// Wrapped clock of the previous update, for wrap-transition detection.
    pub fn last_looped_time(&self) -> f32 {
        self.last_looped_time
    }

    /// Unwrapped clock of the previous update.
    pub fn last_update_time(&self) -> f32 {
        self.last_update_time
    }

    pub fn stop_time(&self) -> Option<f32> {
        self.stop_time
    }

    pub fn pelvis_bounds(&self) -> BoundingBox {
        self.data
            .as_ref()
            .map_or(BoundingBox::EMPTY, |d| d.pelvis_bounds)
    }

    /// Resolved pelvis joint, if the bound skeleton has one.
    pub fn pelvis_joint(&self) -> Option<JointIndex> {
        self.pelvis_joint
    }

    // ---- effective playback parameters -------------------------------------
    //
    // While active these report the snapshot taken at activation; otherwise
    // they report what the next activation would use, falling back to inert
    // defaults when the asset is not loaded.

    pub fn loops(&self) -> bool {
        if self.active {
            return self.params.looped;
        }
        self.overrides
            .looped
            .unwrap_or_else(|| self.data.as_ref().is_some_and(|d| d.looped))
    }

    pub fn duration(&self) -> f32 {
        self.data.as_ref().map_or(0.0, |d| d.duration)
    }

    pub fn loop_in_point(&self) -> f32 {
        if self.active {
            return self.params.loop_in_point;
        }
        self.overrides
            .loop_in_point
            .unwrap_or_else(|| self.data.as_ref().map_or(0.0, |d| d.loop_in_point))
    }

    pub fn loop_out_point(&self) -> f32 {
        if self.active {
            return self.params.loop_out_point;
        }
        self.overrides
            .loop_out_point
            .unwrap_or_else(|| self.data.as_ref().map_or(0.0, |d| d.loop_out_point))
    }

    pub fn ease_in_duration(&self) -> f32 {
        if self.active {
            return self.params.ease_in_duration;
        }
        self.overrides
            .ease_in_duration
            .unwrap_or_else(|| self.data.as_ref().map_or(0.0, |d| d.ease_in_duration))
    }

    pub fn ease_out_duration(&self) -> f32 {
        if self.active {
            return self.params.ease_out_duration;
        }
        self.overrides
            .ease_out_duration
            .unwrap_or_else(|| self.data.as_ref().map_or(0.0, |d| d.ease_out_duration))
    }

    pub fn priority(&self) -> JointPriority {
        if self.active {
            return self.params.priority;
        }
        self.overrides
            .priority
            .unwrap_or_else(|| self.data.as_ref().map_or(JointPriority::Low, |d| d.base_priority))
    }

    pub fn hand_pose(&self) -> HandPose {
        if self.active {
            return self.params.hand_pose;
        }
        self.overrides
            .hand_pose
            .unwrap_or_else(|| self.data.as_ref().map_or(HandPose::Relaxed, |d| d.hand_pose))
    }

    pub fn emote_name(&self) -> Option<&str> {
        if self.active {
            return self.params.emote_name.as_deref();
        }
        match &self.overrides.emote_name {
            Some(emote) => emote.as_deref(),
            None => self.data.as_ref().and_then(|d| d.emote_name.as_deref()),
        }
    }

    // ---- setters (take effect on the next activation) ----------------------

    pub fn set_loop(&mut self, looped: bool) {
        self.overrides.looped = Some(looped);
    }

    pub fn set_loop_in(&mut self, in_point: f32) {
        self.overrides.loop_in_point = Some(in_point);
    }

    pub fn set_loop_out(&mut self, out_point: f32) {
        self.overrides.loop_out_point = Some(out_point);
    }

    pub fn set_priority(&mut self, priority: JointPriority) {
        self.overrides.priority = Some(priority);
    }

    pub fn set_ease_in(&mut self, ease_in: f32) {
        self.overrides.ease_in_duration = Some(ease_in.max(0.0));
    }

    pub fn set_ease_out(&mut self, ease_out: f32) {
        self.overrides.ease_out_duration = Some(ease_out.max(0.0));
    }

    pub fn set_hand_pose(&mut self, pose: HandPose) {
        self.overrides.hand_pose = Some(pose);
    }

    pub fn set_emote(&mut self, emote_name: Option<String>) {
        self.overrides.emote_name = Some(emote_name);
    }

    // ---- loading -----------------------------------------------------------

    /// Delivers the payload of a completed fetch. `None` reports transport
    /// failure. On a successful parse the data is published to the cache and
    /// the instance becomes loadable; a parse failure never touches the
    /// cache.
    pub fn handle_fetch_complete(
        &mut self,
        payload: Option<&[u8]>,
        cache: &mut MotionDataCache,
    ) -> AssetStatus {
        match payload {
            None => {
                warn!("motion {} fetch failed", self.id);
                self.asset_status = AssetStatus::FetchFailed;
            }
            Some(bytes) => {
                self.asset_status = AssetStatus::Fetched;
                match binary::deserialize(bytes) {
                    Ok(data) => {
                        let data = Arc::new(data);
                        cache.add(self.id, data.clone());
                        self.set_data(data);
                        self.asset_status = AssetStatus::Loaded;
                    }
                    Err(err) => {
                        warn!("motion {} failed to parse: {err}", self.id);
                        self.asset_status = AssetStatus::FetchFailed;
                    }
                }
            }
        }
        self.asset_status
    }

    /// Serializes the loaded data back to wire bytes.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let data = self.data.as_ref().ok_or(Error::NotLoaded { id: self.id })?;
        Ok(binary::serialize(data))
    }

    /// Diagnostic JSON dump of the loaded data, for offline inspection.
    #[cfg(feature = "json")]
    pub fn dump_json(&self) -> Result<String, Error> {
        let data = self.data.as_ref().ok_or(Error::NotLoaded { id: self.id })?;
        crate::dump::to_json(data)
    }

    fn set_data(&mut self, data: Arc<MotionData>) {
        self.joint_states = data
            .joint_motions
            .iter()
            .map(|jm| {
                let priority = if jm.priority == JointPriority::Unused {
                    data.base_priority
                } else {
                    jm.priority
                };
                JointState::new(jm.usage, priority)
            })
            .collect();
        self.constraints = data.constraints.iter().map(|_| ConstraintRuntime::new()).collect();
        self.bound_generation = None;
        self.data = Some(data);
    }

    // ---- playback ----------------------------------------------------------

    /// Weight the arbiter multiplies this motion's contribution by: ramps
    /// 0→1 over the ease-in duration from activation and 1→0 over the
    /// ease-out duration before the effective stop time.
    pub fn blend_weight(&self, time: f32) -> f32 {
        if !self.active {
            return 0.0;
        }
        let time = time.max(0.0);

        let ease_in = self.params.ease_in_duration;
        let rise = if ease_in > 0.0 {
            (time / ease_in).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let stop = if self.params.looped {
            self.stop_time
        } else {
            let duration = self.duration();
            Some(self.stop_time.map_or(duration, |s| s.min(duration)))
        };
        let fall = match stop {
            Some(stop) => {
                let ease_out = self.params.ease_out_duration;
                if ease_out > 0.0 {
                    ((stop - time) / ease_out).clamp(0.0, 1.0)
                } else if time >= stop {
                    0.0
                } else {
                    1.0
                }
            }
            None => 1.0,
        };

        rise.min(fall)
    }

    fn snapshot_params(&self, data: &MotionData) -> ActiveParams {
        let duration = data.duration;
        let loop_in = self
            .overrides
            .loop_in_point
            .unwrap_or(data.loop_in_point)
            .clamp(0.0, duration);
        let loop_out = self
            .overrides
            .loop_out_point
            .unwrap_or(data.loop_out_point)
            .clamp(loop_in, duration);
        ActiveParams {
            looped: self.overrides.looped.unwrap_or(data.looped),
            loop_in_point: loop_in,
            loop_out_point: loop_out,
            priority: self.overrides.priority.unwrap_or(data.base_priority),
            ease_in_duration: self
                .overrides
                .ease_in_duration
                .unwrap_or(data.ease_in_duration)
                .max(0.0),
            ease_out_duration: self
                .overrides
                .ease_out_duration
                .unwrap_or(data.ease_out_duration)
                .max(0.0),
            hand_pose: self.overrides.hand_pose.unwrap_or(data.hand_pose),
            emote_name: match &self.overrides.emote_name {
                Some(emote) => emote.clone(),
                None => data.emote_name.clone(),
            },
        }
    }

    /// Resolves joint handles for the current skeleton generation. Returns
    /// how many joints resolved; a missing joint is recoverable and simply
    /// skipped during evaluation.
    fn bind_joints(&mut self, data: &MotionData, character: &dyn Character) -> usize {
        self.bound_generation = Some(character.skeleton_generation());
        self.pelvis_joint = character.joint_index(PELVIS_JOINT_NAME);
        let mut resolved = 0;
        for (jm, js) in data.joint_motions.iter().zip(&mut self.joint_states) {
            js.joint = character.joint_index(&jm.joint_name);
            if js.joint.is_some() {
                resolved += 1;
            } else {
                warn!("joint '{}' not found in skeleton", jm.joint_name);
            }
        }
        resolved
    }

    fn rebind_constraints(&mut self, data: &MotionData, character: &dyn Character) {
        for (runtime, def) in self.constraints.iter_mut().zip(&data.constraints) {
            runtime.bind(def, character, &self.joint_states);
        }
    }

    fn wrap_time(&self, time: f32, duration: f32) -> f32 {
        let p = &self.params;
        if !p.looped {
            return time.min(duration);
        }
        if duration <= 0.0 {
            return 0.0;
        }
        if time <= p.loop_out_point {
            return time;
        }
        let span = p.loop_out_point - p.loop_in_point;
        if span <= 0.0 {
            p.loop_out_point
        } else {
            p.loop_in_point + (time - p.loop_out_point) % span
        }
    }

    fn apply_keyframes(&mut self, data: &MotionData, time: f32, mask: &JointMask) {
        for (jm, js) in data.joint_motions.iter().zip(&mut self.joint_states) {
            let Some(joint) = js.joint else {
                continue;
            };
            if mask.is_claimed(joint) {
                continue;
            }
            if jm.usage & USAGE_POSITION != 0 {
                js.position = jm.position.evaluate(time, data.duration);
            }
            if jm.usage & USAGE_ROTATION != 0 {
                js.rotation = jm.rotation.evaluate(time, data.duration);
            }
            if jm.usage & USAGE_SCALE != 0 {
                js.scale = jm.scale.evaluate(time, data.duration);
            }
        }
    }

    fn apply_constraints(
        &mut self,
        data: &MotionData,
        time: f32,
        mask: &JointMask,
        character: &dyn Character,
    ) {
        for (runtime, def) in self.constraints.iter_mut().zip(&data.constraints) {
            runtime.update(def, time, mask, character, &mut self.joint_states);
        }
    }
}

impl Motion for KeyframeMotion {
    fn loops(&self) -> bool {
        self.loops()
    }

    fn duration(&self) -> f32 {
        self.duration()
    }

    fn ease_in_duration(&self) -> f32 {
        self.ease_in_duration()
    }

    fn ease_out_duration(&self) -> f32 {
        self.ease_out_duration()
    }

    fn priority(&self) -> JointPriority {
        self.priority()
    }

    fn min_pixel_area(&self) -> f32 {
        MIN_REQUIRED_PIXEL_AREA
    }

    fn initialize(
        &mut self,
        character: &dyn Character,
        cache: &mut MotionDataCache,
        loader: &mut dyn AssetLoader,
    ) -> InitStatus {
        if self.asset_status == AssetStatus::FetchFailed {
            return InitStatus::Failure;
        }

        if self.data.is_none() {
            match cache.get(&self.id) {
                Some(data) => {
                    self.set_data(data);
                    self.asset_status = AssetStatus::Loaded;
                }
                None => {
                    if self.asset_status == AssetStatus::Undefined {
                        loader.request_fetch(self.id);
                        self.asset_status = AssetStatus::NeedsFetch;
                    }
                    return InitStatus::Hold;
                }
            }
        }

        let Some(data) = self.data.clone() else {
            return InitStatus::Hold;
        };
        self.bind_joints(&data, character);
        InitStatus::Success
    }

    fn activate(&mut self, character: &dyn Character) -> bool {
        let Some(data) = self.data.clone() else {
            return false;
        };

        self.params = self.snapshot_params(&data);

        // Reset per-activation output state before rebinding.
        for (jm, js) in data.joint_motions.iter().zip(&mut self.joint_states) {
            js.usage = jm.usage;
        }

        let resolved = self.bind_joints(&data, character);
        if !data.joint_motions.is_empty() && resolved == 0 {
            warn!("motion {} resolved no joints, cannot set up pose", self.id);
            return false;
        }

        for runtime in &mut self.constraints {
            runtime.deactivate();
        }
        self.rebind_constraints(&data, character);

        self.last_update_time = 0.0;
        self.last_looped_time = 0.0;
        self.stop_time = None;
        self.active = true;
        true
    }

    fn update(&mut self, time: f32, mask: &JointMask, character: &dyn Character) -> bool {
        if !self.active {
            return false;
        }
        let Some(data) = self.data.clone() else {
            return false;
        };
        let time = time.max(0.0);

        if self.bound_generation != Some(character.skeleton_generation()) {
            self.bind_joints(&data, character);
            self.rebind_constraints(&data, character);
        }

        let looped_time = self.wrap_time(time, data.duration);
        self.apply_keyframes(&data, looped_time, mask);
        self.apply_constraints(&data, looped_time, mask, character);

        self.last_update_time = time;
        self.last_looped_time = looped_time;

        let end = if self.params.looped {
            self.stop_time
        } else {
            Some(self.stop_time.map_or(data.duration, |s| s.min(data.duration)))
        };
        match end {
            Some(end) => time < end,
            None => true,
        }
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.stop_time = None;
        self.bound_generation = None;
        self.pelvis_joint = None;
        for runtime in &mut self.constraints {
            runtime.deactivate();
        }
        for js in &mut self.joint_states {
            js.joint = None;
        }
    }

    /// For looping motions the stop is pushed out to the end of the current
    /// loop iteration so the wrap completes cleanly before ease-out.
    fn set_stop_time(&mut self, time: f32) {
        let mut stop = time.max(0.0);
        if self.active && self.params.looped {
            let span = self.params.loop_out_point - self.params.loop_in_point;
            if span > 0.0 && stop > self.params.loop_in_point {
                let fraction = (stop - self.params.loop_in_point) % span;
                if fraction > 0.0 {
                    stop += span - fraction;
                }
            }
        }
        self.stop_time = Some(stop);
    }
}
