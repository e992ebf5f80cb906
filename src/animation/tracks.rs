use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use glam::{Quat, Vec3};

use super::keyframe::{
    KeyFrame, NumericKeyFrame, TransformKeyFrame, VertexKeyFrame, VertexMorphKeyFrame,
    VertexPoseKeyFrame,
};
use super::spline::{RotationalSpline, SimpleSpline};
use super::values::{AnimableValue, Interpolatable, NumericValue, nlerp, quat_equals, rotation_angle, slerp};
use crate::errors::{AnimationError, Result};
use crate::scene::transform::{AnimableNode, NodeRef, Transform};
use crate::settings::{InterpolationMode, RotationInterpolationMode};
use crate::vertex::{
    HardwareSource, Pose, VertexData, VertexDataRef, WeakVertexDataRef, software_vertex_morph,
    software_vertex_pose_blend,
};

/// Tolerance used by identity checks and keyframe de-duplication.
const TRACK_TOLERANCE: f32 = 1e-3;

/// Wraps `time` into the animation length. Times up to and including the
/// length are left alone.
pub(crate) fn wrap_time(time: f32, length: f32) -> f32 {
    if length > 0.0 && time > length { time % length } else { time }
}

// ============================================================================
// Time index
// ============================================================================

/// A resolved time position, optionally carrying the lower-bound index into
/// the owning animation's global keyframe-time list.
///
/// The key index is tagged with the generation of the time list it was
/// computed from. Tracks only trust it when their own index map was built
/// from the same generation and otherwise fall back to a binary search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeIndex {
    time_pos: f32,
    key_index: Option<u32>,
    generation: u64,
}

impl TimeIndex {
    /// A time position with no cached key index.
    #[must_use]
    pub fn new(time_pos: f32) -> Self {
        Self {
            time_pos,
            key_index: None,
            generation: 0,
        }
    }

    pub(crate) fn with_key_index(time_pos: f32, key_index: usize, generation: u64) -> Self {
        Self {
            time_pos,
            key_index: Some(key_index as u32),
            generation,
        }
    }

    #[must_use]
    pub fn time_pos(&self) -> f32 {
        self.time_pos
    }

    #[must_use]
    pub fn key_index(&self) -> Option<usize> {
        self.key_index.map(|i| i as usize)
    }

    #[must_use]
    pub fn has_key_index(&self) -> bool {
        self.key_index.is_some()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Animation-level parameters a track needs while sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackContext {
    pub length: f32,
    pub interpolation_mode: InterpolationMode,
    pub rotation_interpolation_mode: RotationInterpolationMode,
}

/// The keyframes bracketing a time position.
#[derive(Debug, Clone, Copy)]
pub struct KeyFramePair<'a, K> {
    pub first: &'a K,
    pub second: &'a K,
    /// Blend factor in `[0, 1)` from `first` toward `second`.
    pub t: f32,
    /// Local index of `first`.
    pub first_index: usize,
}

/// Procedural override for track interpolation.
pub trait TrackListener<K> {
    /// Fills `out` for the given time. Returning `true` skips regular
    /// keyframe interpolation.
    fn interpolated_key_frame(&self, track_handle: u16, time_index: &TimeIndex, out: &mut K) -> bool;
}

// ============================================================================
// Keyframe storage shared by every track kind
// ============================================================================

/// Sorted keyframe list with its global-to-local index map.
#[derive(Clone)]
pub struct KeyFrameTrack<K: KeyFrame> {
    handle: u16,
    key_frames: Vec<K>,
    key_frame_index_map: Vec<u32>,
    index_map_generation: Option<u64>,
    listener: Option<Rc<dyn TrackListener<K>>>,
}

impl<K: KeyFrame> fmt::Debug for KeyFrameTrack<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFrameTrack")
            .field("handle", &self.handle)
            .field("key_frames", &self.key_frames.len())
            .field("index_map_generation", &self.index_map_generation)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl<K: KeyFrame> KeyFrameTrack<K> {
    #[must_use]
    pub fn new(handle: u16) -> Self {
        Self {
            handle,
            key_frames: Vec::new(),
            key_frame_index_map: Vec::new(),
            index_map_generation: None,
            listener: None,
        }
    }

    #[must_use]
    pub fn handle(&self) -> u16 {
        self.handle
    }

    #[must_use]
    pub fn key_frames(&self) -> &[K] {
        &self.key_frames
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.key_frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key_frames.is_empty()
    }

    #[must_use]
    pub fn listener(&self) -> Option<&Rc<dyn TrackListener<K>>> {
        self.listener.as_ref()
    }

    pub fn set_listener(&mut self, listener: Option<Rc<dyn TrackListener<K>>>) {
        self.listener = listener;
    }

    /// Inserts after any keyframe with the same time. Returns the new index.
    fn insert(&mut self, key_frame: K) -> usize {
        let time = key_frame.time();
        let index = self.key_frames.partition_point(|k| k.time() <= time);
        self.key_frames.insert(index, key_frame);
        self.index_map_generation = None;
        index
    }

    fn remove(&mut self, index: usize) -> Result<()> {
        if index >= self.key_frames.len() {
            return Err(AnimationError::ItemNotFound(format!(
                "keyframe index {index} out of bounds (track {}, {} keyframes)",
                self.handle,
                self.key_frames.len()
            )));
        }
        self.key_frames.remove(index);
        self.index_map_generation = None;
        Ok(())
    }

    fn clear(&mut self) {
        self.key_frames.clear();
        self.index_map_generation = None;
    }

    /// Finds the keyframes bracketing `time_index`.
    ///
    /// Returns `None` for an empty track. Past the last keyframe the pair
    /// wraps to the first keyframe at `length + first.time`.
    #[must_use]
    pub fn key_frames_at_time(&self, length: f32, time_index: &TimeIndex) -> Option<KeyFramePair<'_, K>> {
        let kfs = &self.key_frames;
        let n = kfs.len();
        if n == 0 {
            return None;
        }

        // 1. Local lower bound, through the index map when it matches
        let mut time_pos = time_index.time_pos();
        let mapped = match time_index.key_index() {
            Some(global) if self.index_map_generation == Some(time_index.generation()) => {
                self.key_frame_index_map.get(global).map(|&i| i as usize)
            }
            _ => None,
        };
        let mut index = match mapped {
            Some(local) => local,
            None => {
                time_pos = wrap_time(time_pos, length);
                kfs.partition_point(|k| k.time() < time_pos)
            }
        };

        // 2. Pick the pair
        let (second_index, second_time) = if index >= n {
            index = n - 1;
            (0, length + kfs[0].time())
        } else {
            let mut second = index;
            if index > 0 && time_pos < kfs[index].time() {
                index -= 1;
            } else if time_pos == kfs[index].time() && index + 1 < n {
                second = index + 1;
            }
            (second, kfs[second].time())
        };

        // 3. Parametric position
        let first = &kfs[index];
        let first_time = first.time();
        let t = if first_time == second_time {
            0.0
        } else {
            (time_pos - first_time) / (second_time - first_time)
        };

        Some(KeyFramePair {
            first,
            second: &kfs[second_index],
            t,
            first_index: index,
        })
    }

    /// Merges this track's keyframe times into a sorted, de-duplicated list.
    pub fn collect_key_frame_times(&self, times: &mut Vec<f32>) {
        for kf in &self.key_frames {
            let time = kf.time();
            let pos = times.partition_point(|&t| t < time);
            if pos == times.len() || times[pos] != time {
                times.insert(pos, time);
            }
        }
    }

    /// Builds the global-to-local lower-bound index map for `times`.
    pub fn build_key_frame_index_map(&mut self, times: &[f32], generation: u64) {
        let n = self.key_frames.len();
        self.key_frame_index_map.clear();
        self.key_frame_index_map.reserve(times.len() + 1);

        let mut i = 0usize;
        for j in 0..=times.len() {
            self.key_frame_index_map.push(i as u32);
            if let Some(&global_time) = times.get(j) {
                while i < n && self.key_frames[i].time() <= global_time {
                    i += 1;
                }
            }
        }
        self.index_map_generation = Some(generation);
    }
}

// ============================================================================
// Track trait
// ============================================================================

/// Operations shared by node, numeric and vertex tracks.
pub trait AnimationTrack {
    type Key: KeyFrame;

    fn key_frame_track(&self) -> &KeyFrameTrack<Self::Key>;
    fn key_frame_track_mut(&mut self) -> &mut KeyFrameTrack<Self::Key>;

    /// Creates a blank keyframe of the kind this track stores.
    fn new_key_frame(&self, time: f32) -> Self::Key;

    /// Called after any keyframe is added, removed or handed out mutably.
    fn key_frame_data_changed(&mut self) {}

    /// Whether any keyframe would have a visible effect.
    fn has_non_zero_key_frames(&self) -> bool {
        !self.key_frame_track().is_empty()
    }

    /// Removes redundant keyframes.
    fn optimise(&mut self) {}

    fn handle(&self) -> u16 {
        self.key_frame_track().handle()
    }

    fn num_key_frames(&self) -> usize {
        self.key_frame_track().len()
    }

    fn key_frames(&self) -> &[Self::Key] {
        self.key_frame_track().key_frames()
    }

    fn key_frame(&self, index: usize) -> Result<&Self::Key> {
        let track = self.key_frame_track();
        track.key_frames().get(index).ok_or_else(|| {
            AnimationError::ItemNotFound(format!(
                "keyframe index {index} out of bounds (track {})",
                track.handle()
            ))
        })
    }

    fn key_frame_mut(&mut self, index: usize) -> Result<&mut Self::Key> {
        if index >= self.num_key_frames() {
            return Err(AnimationError::ItemNotFound(format!(
                "keyframe index {index} out of bounds (track {})",
                self.handle()
            )));
        }
        self.key_frame_data_changed();
        Ok(&mut self.key_frame_track_mut().key_frames[index])
    }

    /// Inserts a keyframe at `time`, keeping the list sorted.
    fn create_key_frame(&mut self, time: f32) -> &mut Self::Key {
        let key_frame = self.new_key_frame(time);
        let index = self.key_frame_track_mut().insert(key_frame);
        self.key_frame_data_changed();
        &mut self.key_frame_track_mut().key_frames[index]
    }

    fn remove_key_frame(&mut self, index: usize) -> Result<()> {
        self.key_frame_track_mut().remove(index)?;
        self.key_frame_data_changed();
        Ok(())
    }

    fn remove_all_key_frames(&mut self) {
        self.key_frame_track_mut().clear();
        self.key_frame_data_changed();
    }

    fn key_frames_at_time(&self, length: f32, time_index: &TimeIndex) -> Option<KeyFramePair<'_, Self::Key>> {
        self.key_frame_track().key_frames_at_time(length, time_index)
    }

    fn collect_key_frame_times(&self, times: &mut Vec<f32>) {
        self.key_frame_track().collect_key_frame_times(times);
    }

    fn build_key_frame_index_map(&mut self, times: &[f32], generation: u64) {
        self.key_frame_track_mut().build_key_frame_index_map(times, generation);
    }
}

// ============================================================================
// Node track
// ============================================================================

#[derive(Debug, Clone, Default)]
struct TransformSplines {
    position: SimpleSpline,
    rotation: RotationalSpline,
    scale: SimpleSpline,
}

/// Drives the transform of a node or bone.
#[derive(Debug, Clone)]
pub struct NodeAnimationTrack {
    key_frames: KeyFrameTrack<TransformKeyFrame>,
    associated_node: Option<Weak<RefCell<Transform>>>,
    initial_state: Option<(Vec3, Quat, Vec3)>,
    use_shortest_rotation_path: bool,
    splines: RefCell<TransformSplines>,
    spline_build_needed: Cell<bool>,
}

impl NodeAnimationTrack {
    #[must_use]
    pub fn new(handle: u16) -> Self {
        Self {
            key_frames: KeyFrameTrack::new(handle),
            associated_node: None,
            initial_state: None,
            use_shortest_rotation_path: true,
            splines: RefCell::new(TransformSplines::default()),
            spline_build_needed: Cell::new(false),
        }
    }

    #[must_use]
    pub fn use_shortest_rotation_path(&self) -> bool {
        self.use_shortest_rotation_path
    }

    pub fn set_use_shortest_rotation_path(&mut self, use_shortest_path: bool) {
        self.use_shortest_rotation_path = use_shortest_path;
    }

    /// Associates a node and snapshots its current transform for
    /// [`NodeAnimationTrack::reset_associated_node`].
    pub fn set_associated_node(&mut self, node: &NodeRef) {
        let n = node.borrow();
        self.initial_state = Some((n.position, n.rotation, n.scale));
        self.associated_node = Some(Rc::downgrade(node));
    }

    pub fn clear_associated_node(&mut self) {
        self.associated_node = None;
        self.initial_state = None;
    }

    #[must_use]
    pub fn associated_node(&self) -> Option<NodeRef> {
        self.associated_node.as_ref().and_then(Weak::upgrade)
    }

    /// Restores the associated node to the transform it had when it was
    /// associated.
    pub fn reset_associated_node(&self) {
        if let (Some(node), Some((position, rotation, scale))) = (self.associated_node(), self.initial_state) {
            let mut n = node.borrow_mut();
            n.position = position;
            n.rotation = rotation;
            n.scale = scale;
        }
    }

    pub fn set_listener(&mut self, listener: Option<Rc<dyn TrackListener<TransformKeyFrame>>>) {
        self.key_frames.set_listener(listener);
    }

    /// Samples the track.
    ///
    /// An empty track yields an identity keyframe.
    #[must_use]
    pub fn interpolated_key_frame(&self, ctx: &TrackContext, time_index: &TimeIndex) -> TransformKeyFrame {
        let mut out = TransformKeyFrame::new(time_index.time_pos());

        if let Some(listener) = self.key_frames.listener()
            && listener.interpolated_key_frame(self.handle(), time_index, &mut out)
        {
            return out;
        }

        let Some(pair) = self.key_frames.key_frames_at_time(ctx.length, time_index) else {
            return out;
        };
        let (k1, k2, t) = (pair.first, pair.second, pair.t);

        if t == 0.0 {
            out.copy_pose_from(k1);
            return out;
        }

        match ctx.interpolation_mode {
            InterpolationMode::Linear => {
                out.rotation = match ctx.rotation_interpolation_mode {
                    RotationInterpolationMode::Linear => {
                        nlerp(t, k1.rotation, k2.rotation, self.use_shortest_rotation_path)
                    }
                    RotationInterpolationMode::Spherical => {
                        slerp(t, k1.rotation, k2.rotation, self.use_shortest_rotation_path)
                    }
                };
                out.translate = Vec3::interpolate_linear(k1.translate, k2.translate, t);
                out.scale = Vec3::interpolate_linear(k1.scale, k2.scale, t);
            }
            InterpolationMode::Spline => {
                self.build_interpolation_splines();
                let splines = self.splines.borrow();
                let index = pair.first_index;
                out.translate = splines.position.interpolate(index, t);
                out.rotation = splines.rotation.interpolate(index, t, self.use_shortest_rotation_path);
                out.scale = splines.scale.interpolate(index, t);
            }
        }
        out
    }

    fn build_interpolation_splines(&self) {
        if !self.spline_build_needed.get() {
            return;
        }
        let mut splines = self.splines.borrow_mut();
        splines.position.set_auto_calculate(false);
        splines.rotation.set_auto_calculate(false);
        splines.scale.set_auto_calculate(false);
        splines.position.clear();
        splines.rotation.clear();
        splines.scale.clear();

        for kf in self.key_frames.key_frames() {
            splines.position.add_point(kf.translate);
            splines.rotation.add_point(kf.rotation);
            splines.scale.add_point(kf.scale);
        }

        splines.position.recalc_tangents();
        splines.rotation.recalc_tangents();
        splines.scale.recalc_tangents();
        self.spline_build_needed.set(false);
    }

    /// Blends the sampled pose into `node`.
    ///
    /// Translation is additive (`translate * weight * scale`); rotation and
    /// scale are blended from identity toward the sampled value and composed
    /// onto the node.
    pub fn apply_to_node(
        &self,
        node: &mut dyn AnimableNode,
        ctx: &TrackContext,
        time_index: &TimeIndex,
        weight: f32,
        scale: f32,
    ) {
        if self.key_frames.is_empty() || weight == 0.0 {
            return;
        }

        let kf = self.interpolated_key_frame(ctx, time_index);

        node.translate(kf.translate * weight * scale);

        let rotate = match ctx.rotation_interpolation_mode {
            RotationInterpolationMode::Linear => {
                nlerp(weight, Quat::IDENTITY, kf.rotation, self.use_shortest_rotation_path)
            }
            RotationInterpolationMode::Spherical => {
                slerp(weight, Quat::IDENTITY, kf.rotation, self.use_shortest_rotation_path)
            }
        };
        node.rotate(rotate);

        let mut kf_scale = kf.scale;
        if kf_scale != Vec3::ONE {
            if scale != 1.0 {
                kf_scale = Vec3::ONE + (kf_scale - Vec3::ONE) * scale;
            } else if weight != 1.0 {
                kf_scale = Vec3::ONE + (kf_scale - Vec3::ONE) * weight;
            }
        }
        node.scale_by(kf_scale);
    }

    /// Applies to the associated node, if it is still alive.
    pub fn apply(&self, ctx: &TrackContext, time_index: &TimeIndex, weight: f32, scale: f32) {
        if let Some(node) = self.associated_node() {
            self.apply_to_node(&mut *node.borrow_mut(), ctx, time_index, weight, scale);
        }
    }

    /// Rewrites every keyframe relative to `base`.
    pub fn apply_base_key_frame(&mut self, base: &TransformKeyFrame) {
        let inv_rotation = base.rotation.inverse();
        let inv_scale = Vec3::ONE / base.scale;
        for kf in &mut self.key_frames.key_frames {
            kf.translate -= base.translate;
            kf.rotation = inv_rotation * kf.rotation;
            kf.scale *= inv_scale;
        }
        self.key_frame_data_changed();
    }
}

impl AnimationTrack for NodeAnimationTrack {
    type Key = TransformKeyFrame;

    fn key_frame_track(&self) -> &KeyFrameTrack<TransformKeyFrame> {
        &self.key_frames
    }

    fn key_frame_track_mut(&mut self) -> &mut KeyFrameTrack<TransformKeyFrame> {
        &mut self.key_frames
    }

    fn new_key_frame(&self, time: f32) -> TransformKeyFrame {
        TransformKeyFrame::new(time)
    }

    fn key_frame_data_changed(&mut self) {
        self.spline_build_needed.set(true);
    }

    fn has_non_zero_key_frames(&self) -> bool {
        self.key_frames.key_frames().iter().any(|kf| {
            !kf.translate.abs_diff_eq(Vec3::ZERO, TRACK_TOLERANCE)
                || !kf.scale.abs_diff_eq(Vec3::ONE, TRACK_TOLERANCE)
                || rotation_angle(kf.rotation).abs() > TRACK_TOLERANCE
        })
    }

    /// Drops interior keyframes of runs of five or more identical keyframes,
    /// keeping the first two and the last two of each run.
    fn optimise(&mut self) {
        let mut last: Option<&TransformKeyFrame> = None;
        let mut duplicates = 0u32;
        let mut remove_list = Vec::new();

        for (k, kf) in self.key_frames.key_frames().iter().enumerate() {
            let is_duplicate = last.is_some_and(|prev| {
                kf.translate.abs_diff_eq(prev.translate, TRACK_TOLERANCE)
                    && kf.scale.abs_diff_eq(prev.scale, TRACK_TOLERANCE)
                    && quat_equals(kf.rotation, prev.rotation, TRACK_TOLERANCE)
            });
            if is_duplicate {
                duplicates += 1;
                if duplicates == 4 {
                    remove_list.push(k - 2);
                    duplicates -= 1;
                }
            } else {
                duplicates = 0;
                last = Some(kf);
            }
        }

        if remove_list.is_empty() {
            return;
        }
        for &index in remove_list.iter().rev() {
            self.key_frames.key_frames.remove(index);
        }
        self.key_frames.index_map_generation = None;
        self.key_frame_data_changed();
    }
}

// ============================================================================
// Numeric track
// ============================================================================

pub type AnimableValueRef = Rc<RefCell<dyn AnimableValue>>;

/// Drives an arbitrary numeric property.
#[derive(Debug, Clone)]
pub struct NumericAnimationTrack {
    key_frames: KeyFrameTrack<NumericKeyFrame>,
    associated_animable: Option<Weak<RefCell<dyn AnimableValue>>>,
}

impl NumericAnimationTrack {
    #[must_use]
    pub fn new(handle: u16) -> Self {
        Self {
            key_frames: KeyFrameTrack::new(handle),
            associated_animable: None,
        }
    }

    pub fn set_associated_animable(&mut self, value: &AnimableValueRef) {
        self.associated_animable = Some(Rc::downgrade(value));
    }

    #[must_use]
    pub fn associated_animable(&self) -> Option<AnimableValueRef> {
        self.associated_animable.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_listener(&mut self, listener: Option<Rc<dyn TrackListener<NumericKeyFrame>>>) {
        self.key_frames.set_listener(listener);
    }

    /// Samples the track; an empty track yields a default keyframe.
    #[must_use]
    pub fn interpolated_key_frame(&self, ctx: &TrackContext, time_index: &TimeIndex) -> NumericKeyFrame {
        let mut out = NumericKeyFrame::new(time_index.time_pos());

        if let Some(listener) = self.key_frames.listener()
            && listener.interpolated_key_frame(self.handle(), time_index, &mut out)
        {
            return out;
        }

        if let Some(pair) = self.key_frames.key_frames_at_time(ctx.length, time_index) {
            out.value = if pair.t == 0.0 {
                pair.first.value
            } else {
                NumericValue::interpolate_linear(pair.first.value, pair.second.value, pair.t)
            };
        }
        out
    }

    /// Adds `value * weight * scale` to `animable`.
    pub fn apply_to_animable(
        &self,
        animable: &mut dyn AnimableValue,
        ctx: &TrackContext,
        time_index: &TimeIndex,
        weight: f32,
        scale: f32,
    ) {
        if self.key_frames.is_empty() || weight == 0.0 || scale == 0.0 {
            return;
        }
        let kf = self.interpolated_key_frame(ctx, time_index);
        animable.apply_delta_value(&(kf.value * (weight * scale)));
    }

    pub fn apply(&self, ctx: &TrackContext, time_index: &TimeIndex, weight: f32, scale: f32) {
        if let Some(value) = self.associated_animable() {
            self.apply_to_animable(&mut *value.borrow_mut(), ctx, time_index, weight, scale);
        }
    }
}

impl AnimationTrack for NumericAnimationTrack {
    type Key = NumericKeyFrame;

    fn key_frame_track(&self) -> &KeyFrameTrack<NumericKeyFrame> {
        &self.key_frames
    }

    fn key_frame_track_mut(&mut self) -> &mut KeyFrameTrack<NumericKeyFrame> {
        &mut self.key_frames
    }

    fn new_key_frame(&self, time: f32) -> NumericKeyFrame {
        NumericKeyFrame::new(time)
    }
}

// ============================================================================
// Vertex track
// ============================================================================

/// Kind of vertex animation a track holds. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAnimationType {
    /// Whole-buffer snapshots blended pairwise.
    Morph,
    /// Weighted references to sparse offset poses.
    Pose,
}

/// Where vertex blending happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexTargetMode {
    #[default]
    Software,
    Hardware,
}

/// Drives vertex positions through morph snapshots or poses.
#[derive(Debug, Clone)]
pub struct VertexAnimationTrack {
    key_frames: KeyFrameTrack<VertexKeyFrame>,
    animation_type: VertexAnimationType,
    target_mode: VertexTargetMode,
    associated_vertex_data: Option<WeakVertexDataRef>,
    associated_poses: Option<Rc<[Pose]>>,
}

impl VertexAnimationTrack {
    #[must_use]
    pub fn new(handle: u16, animation_type: VertexAnimationType) -> Self {
        Self {
            key_frames: KeyFrameTrack::new(handle),
            animation_type,
            target_mode: VertexTargetMode::Software,
            associated_vertex_data: None,
            associated_poses: None,
        }
    }

    #[must_use]
    pub fn animation_type(&self) -> VertexAnimationType {
        self.animation_type
    }

    #[must_use]
    pub fn target_mode(&self) -> VertexTargetMode {
        self.target_mode
    }

    pub fn set_target_mode(&mut self, mode: VertexTargetMode) {
        self.target_mode = mode;
    }

    /// Associates vertex data and, for pose tracks, the pose list the pose
    /// indices refer to.
    pub fn set_associated_vertex_data(&mut self, data: &VertexDataRef, poses: Option<Rc<[Pose]>>) {
        self.associated_vertex_data = Some(Rc::downgrade(data));
        self.associated_poses = poses;
    }

    #[must_use]
    pub fn associated_vertex_data(&self) -> Option<VertexDataRef> {
        self.associated_vertex_data.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_listener(&mut self, listener: Option<Rc<dyn TrackListener<VertexKeyFrame>>>) {
        self.key_frames.set_listener(listener);
    }

    pub fn create_vertex_morph_key_frame(&mut self, time: f32) -> Result<&mut VertexMorphKeyFrame> {
        if self.animation_type != VertexAnimationType::Morph {
            return Err(AnimationError::InvalidParameters(format!(
                "morph keyframes cannot be created on pose track {}",
                self.handle()
            )));
        }
        self.create_key_frame(time)
            .as_morph_mut()
            .ok_or_else(|| AnimationError::InternalError("morph track holds a pose keyframe".into()))
    }

    pub fn create_vertex_pose_key_frame(&mut self, time: f32) -> Result<&mut VertexPoseKeyFrame> {
        if self.animation_type != VertexAnimationType::Pose {
            return Err(AnimationError::InvalidParameters(format!(
                "pose keyframes cannot be created on morph track {}",
                self.handle()
            )));
        }
        self.create_key_frame(time)
            .as_pose_mut()
            .ok_or_else(|| AnimationError::InternalError("pose track holds a morph keyframe".into()))
    }

    pub fn vertex_morph_key_frame(&self, index: usize) -> Result<&VertexMorphKeyFrame> {
        if self.animation_type != VertexAnimationType::Morph {
            return Err(AnimationError::InvalidParameters(format!(
                "track {} is not a morph track",
                self.handle()
            )));
        }
        self.key_frame(index)?
            .as_morph()
            .ok_or_else(|| AnimationError::InternalError("morph track holds a pose keyframe".into()))
    }

    pub fn vertex_pose_key_frame(&self, index: usize) -> Result<&VertexPoseKeyFrame> {
        if self.animation_type != VertexAnimationType::Pose {
            return Err(AnimationError::InvalidParameters(format!(
                "track {} is not a pose track",
                self.handle()
            )));
        }
        self.key_frame(index)?
            .as_pose()
            .ok_or_else(|| AnimationError::InternalError("pose track holds a morph keyframe".into()))
    }

    pub fn vertex_pose_key_frame_mut(&mut self, index: usize) -> Result<&mut VertexPoseKeyFrame> {
        if self.animation_type != VertexAnimationType::Pose {
            return Err(AnimationError::InvalidParameters(format!(
                "track {} is not a pose track",
                self.handle()
            )));
        }
        self.key_frame_mut(index)?
            .as_pose_mut()
            .ok_or_else(|| AnimationError::InternalError("pose track holds a morph keyframe".into()))
    }

    /// Interpolated pose references at `time_index`: the union of both
    /// bracketing keyframes' references, poses missing on one side counting
    /// as zero influence.
    #[must_use]
    pub fn interpolated_pose_key_frame(&self, ctx: &TrackContext, time_index: &TimeIndex) -> VertexPoseKeyFrame {
        let mut out = VertexPoseKeyFrame::new(time_index.time_pos());
        let Some(pair) = self.key_frames.key_frames_at_time(ctx.length, time_index) else {
            return out;
        };
        let (Some(k1), Some(k2)) = (pair.first.as_pose(), pair.second.as_pose()) else {
            return out;
        };
        for (pose_index, influence) in blended_pose_influences(k1, k2, pair.t) {
            out.add_pose_reference(pose_index, influence);
        }
        out
    }

    /// Blends this track into `data`.
    ///
    /// `poses` is the list pose references index into; it is ignored by
    /// morph tracks.
    pub fn apply_to_vertex_data(
        &self,
        data: &mut VertexData,
        ctx: &TrackContext,
        time_index: &TimeIndex,
        weight: f32,
        poses: &[Pose],
    ) {
        if self.key_frames.is_empty() {
            return;
        }
        let Some(pair) = self.key_frames.key_frames_at_time(ctx.length, time_index) else {
            return;
        };

        match self.animation_type {
            VertexAnimationType::Morph => {
                let buffers = (
                    pair.first.as_morph().and_then(VertexMorphKeyFrame::vertex_buffer),
                    pair.second.as_morph().and_then(VertexMorphKeyFrame::vertex_buffer),
                );
                let (Some(b1), Some(b2)) = buffers else {
                    log::warn!("Morph track {} has keyframes without vertex buffers", self.handle());
                    return;
                };
                match self.target_mode {
                    VertexTargetMode::Hardware => {
                        data.position_binding = Some(Rc::clone(b1));
                        match data.hw_animation_data.first_mut() {
                            Some(slot) => {
                                slot.source = Some(HardwareSource::KeyFrame(Rc::clone(b2)));
                                slot.parametric = pair.t;
                            }
                            None => log::warn!(
                                "Hardware morph on track {} without hardware animation slots",
                                self.handle()
                            ),
                        }
                    }
                    VertexTargetMode::Software => software_vertex_morph(pair.t, b1, b2, data),
                }
            }
            VertexAnimationType::Pose => {
                let (Some(k1), Some(k2)) = (pair.first.as_pose(), pair.second.as_pose()) else {
                    return;
                };
                for (pose_index, influence) in blended_pose_influences(k1, k2, pair.t) {
                    match poses.get(usize::from(pose_index)) {
                        Some(pose) => self.apply_pose_to_vertex_data(pose_index, pose, data, influence * weight),
                        None => log::warn!(
                            "Pose index {pose_index} out of range ({} poses) on track {}",
                            poses.len(),
                            self.handle()
                        ),
                    }
                }
            }
        }
    }

    fn apply_pose_to_vertex_data(&self, pose_index: u16, pose: &Pose, data: &mut VertexData, influence: f32) {
        match self.target_mode {
            VertexTargetMode::Hardware => {
                // Poses beyond the available slots are dropped
                if let Some(slot) = data.claim_hardware_slot() {
                    slot.source = Some(HardwareSource::Pose(pose_index));
                    slot.parametric = influence;
                }
            }
            VertexTargetMode::Software => software_vertex_pose_blend(influence, pose, data),
        }
    }

    pub fn apply(&self, ctx: &TrackContext, time_index: &TimeIndex, weight: f32) {
        if let Some(data) = self.associated_vertex_data() {
            let poses = self.associated_poses.as_deref().unwrap_or(&[]);
            self.apply_to_vertex_data(&mut data.borrow_mut(), ctx, time_index, weight, poses);
        }
    }

    /// Subtracts `base` influences from every pose keyframe. Morph tracks
    /// are left untouched.
    pub fn apply_base_key_frame(&mut self, base: &VertexPoseKeyFrame) {
        if self.animation_type != VertexAnimationType::Pose {
            return;
        }
        for kf in &mut self.key_frames.key_frames {
            if let Some(pose_kf) = kf.as_pose_mut() {
                for base_ref in base.pose_references() {
                    if let Some(current) = pose_kf.influence_of(base_ref.pose_index) {
                        pose_kf.update_pose_reference(base_ref.pose_index, current - base_ref.influence);
                    }
                }
            }
        }
    }
}

/// `(pose index, influence)` for the union of `k1` and `k2` at blend `t`.
fn blended_pose_influences(k1: &VertexPoseKeyFrame, k2: &VertexPoseKeyFrame, t: f32) -> Vec<(u16, f32)> {
    let mut out = Vec::with_capacity(k1.pose_references().len() + k2.pose_references().len());
    for r1 in k1.pose_references() {
        let target = k2.influence_of(r1.pose_index).unwrap_or(0.0);
        out.push((r1.pose_index, r1.influence + t * (target - r1.influence)));
    }
    for r2 in k2.pose_references() {
        if k1.influence_of(r2.pose_index).is_none() {
            out.push((r2.pose_index, t * r2.influence));
        }
    }
    out
}

impl AnimationTrack for VertexAnimationTrack {
    type Key = VertexKeyFrame;

    fn key_frame_track(&self) -> &KeyFrameTrack<VertexKeyFrame> {
        &self.key_frames
    }

    fn key_frame_track_mut(&mut self) -> &mut KeyFrameTrack<VertexKeyFrame> {
        &mut self.key_frames
    }

    fn new_key_frame(&self, time: f32) -> VertexKeyFrame {
        match self.animation_type {
            VertexAnimationType::Morph => VertexKeyFrame::Morph(VertexMorphKeyFrame::new(time)),
            VertexAnimationType::Pose => VertexKeyFrame::Pose(VertexPoseKeyFrame::new(time)),
        }
    }

    fn has_non_zero_key_frames(&self) -> bool {
        match self.animation_type {
            VertexAnimationType::Morph => !self.key_frames.is_empty(),
            VertexAnimationType::Pose => self.key_frames.key_frames().iter().any(|kf| {
                kf.as_pose()
                    .is_some_and(|p| p.pose_references().iter().any(|r| r.influence > 0.0))
            }),
        }
    }
}
