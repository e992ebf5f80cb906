use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::container::AnimationLibrary;
use super::keyframe::{TransformKeyFrame, VertexPoseKeyFrame};
use super::tracks::{
    AnimationTrack, NodeAnimationTrack, NumericAnimationTrack, TimeIndex, TrackContext,
    VertexAnimationTrack, VertexAnimationType, VertexTargetMode, wrap_time,
};
use super::values::AnimableValue;
use crate::errors::{AnimationError, Result};
use crate::scene::skeleton::Skeleton;
use crate::scene::transform::{AnimableNode, NodeRef};
use crate::settings::{AnimationSettings, InterpolationMode, RotationInterpolationMode};
use crate::vertex::{AnimatedMesh, Pose, VertexData};

pub type AnimationRef = Rc<RefCell<Animation>>;

// Time-list generations are unique process-wide so a time index can never
// match an index map built by a different animation.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

fn track_not_found(kind: &str, handle: u16, animation: &str) -> AnimationError {
    AnimationError::ItemNotFound(format!("{kind} track with handle {handle} not found in animation '{animation}'"))
}

fn duplicate_track(kind: &str, handle: u16, animation: &str) -> AnimationError {
    AnimationError::DuplicateItem(format!(
        "{kind} track with handle {handle} already exists in animation '{animation}'"
    ))
}

/// A named, fixed-length set of node, numeric and vertex tracks.
///
/// Tracks are keyed by handle (unique per kind). Every apply call resolves a
/// single [`TimeIndex`] against the union of all keyframe times and feeds it
/// to every track, so each track's local lookup is a constant-time map access.
#[derive(Debug)]
pub struct Animation {
    name: String,
    length: f32,
    interpolation_mode: InterpolationMode,
    rotation_interpolation_mode: RotationInterpolationMode,

    node_tracks: BTreeMap<u16, NodeAnimationTrack>,
    numeric_tracks: BTreeMap<u16, NumericAnimationTrack>,
    vertex_tracks: BTreeMap<u16, VertexAnimationTrack>,

    // Global keyframe-time list, rebuilt lazily
    key_frame_times: Vec<f32>,
    key_frame_times_dirty: bool,
    generation: u64,

    use_base_key_frame: bool,
    base_key_frame_time: f32,
    base_key_frame_animation_name: String,

    container: Weak<RefCell<AnimationLibrary>>,
}

impl Animation {
    /// Creates an animation using the process-wide [`AnimationSettings`].
    #[must_use]
    pub fn new(name: impl Into<String>, length: f32) -> Self {
        Self::with_settings(name, length, &AnimationSettings::global())
    }

    #[must_use]
    pub fn with_settings(name: impl Into<String>, length: f32, settings: &AnimationSettings) -> Self {
        Self {
            name: name.into(),
            length,
            interpolation_mode: settings.default_interpolation_mode,
            rotation_interpolation_mode: settings.default_rotation_interpolation_mode,
            node_tracks: BTreeMap::new(),
            numeric_tracks: BTreeMap::new(),
            vertex_tracks: BTreeMap::new(),
            key_frame_times: Vec::new(),
            key_frame_times_dirty: true,
            generation: 0,
            use_base_key_frame: false,
            base_key_frame_time: 0.0,
            base_key_frame_animation_name: String::new(),
            container: Weak::new(),
        }
    }

    #[must_use]
    pub fn into_ref(self) -> AnimationRef {
        Rc::new(RefCell::new(self))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
    }

    #[must_use]
    pub fn interpolation_mode(&self) -> InterpolationMode {
        self.interpolation_mode
    }

    pub fn set_interpolation_mode(&mut self, mode: InterpolationMode) {
        self.interpolation_mode = mode;
    }

    #[must_use]
    pub fn rotation_interpolation_mode(&self) -> RotationInterpolationMode {
        self.rotation_interpolation_mode
    }

    pub fn set_rotation_interpolation_mode(&mut self, mode: RotationInterpolationMode) {
        self.rotation_interpolation_mode = mode;
    }

    /// Parameters tracks need while sampling this animation.
    #[must_use]
    pub fn track_context(&self) -> TrackContext {
        TrackContext {
            length: self.length,
            interpolation_mode: self.interpolation_mode,
            rotation_interpolation_mode: self.rotation_interpolation_mode,
        }
    }

    pub(crate) fn set_container(&mut self, container: Weak<RefCell<AnimationLibrary>>) {
        self.container = container;
    }

    // ========================================================================
    // Node tracks
    // ========================================================================

    pub fn create_node_track(&mut self, handle: u16) -> Result<&mut NodeAnimationTrack> {
        if self.node_tracks.contains_key(&handle) {
            return Err(duplicate_track("Node", handle, &self.name));
        }
        self.key_frame_list_changed();
        Ok(self.node_tracks.entry(handle).or_insert_with(|| NodeAnimationTrack::new(handle)))
    }

    /// Creates a node track already associated with `node`.
    pub fn create_node_track_for(&mut self, handle: u16, node: &NodeRef) -> Result<&mut NodeAnimationTrack> {
        let track = self.create_node_track(handle)?;
        track.set_associated_node(node);
        Ok(track)
    }

    #[must_use]
    pub fn num_node_tracks(&self) -> usize {
        self.node_tracks.len()
    }

    #[must_use]
    pub fn has_node_track(&self, handle: u16) -> bool {
        self.node_tracks.contains_key(&handle)
    }

    pub fn node_track(&self, handle: u16) -> Result<&NodeAnimationTrack> {
        self.node_tracks
            .get(&handle)
            .ok_or_else(|| track_not_found("Node", handle, &self.name))
    }

    /// Mutable access marks the keyframe-time list dirty.
    pub fn node_track_mut(&mut self, handle: u16) -> Result<&mut NodeAnimationTrack> {
        let track = self
            .node_tracks
            .get_mut(&handle)
            .ok_or_else(|| track_not_found("Node", handle, &self.name))?;
        self.key_frame_times_dirty = true;
        Ok(track)
    }

    pub fn destroy_node_track(&mut self, handle: u16) -> Result<()> {
        self.node_tracks
            .remove(&handle)
            .ok_or_else(|| track_not_found("Node", handle, &self.name))?;
        self.key_frame_list_changed();
        Ok(())
    }

    pub fn destroy_all_node_tracks(&mut self) {
        self.node_tracks.clear();
        self.key_frame_list_changed();
    }

    /// Node tracks in handle order.
    pub fn node_tracks(&self) -> impl Iterator<Item = (u16, &NodeAnimationTrack)> {
        self.node_tracks.iter().map(|(&h, t)| (h, t))
    }

    // ========================================================================
    // Numeric tracks
    // ========================================================================

    pub fn create_numeric_track(&mut self, handle: u16) -> Result<&mut NumericAnimationTrack> {
        if self.numeric_tracks.contains_key(&handle) {
            return Err(duplicate_track("Numeric", handle, &self.name));
        }
        self.key_frame_list_changed();
        Ok(self
            .numeric_tracks
            .entry(handle)
            .or_insert_with(|| NumericAnimationTrack::new(handle)))
    }

    #[must_use]
    pub fn num_numeric_tracks(&self) -> usize {
        self.numeric_tracks.len()
    }

    #[must_use]
    pub fn has_numeric_track(&self, handle: u16) -> bool {
        self.numeric_tracks.contains_key(&handle)
    }

    pub fn numeric_track(&self, handle: u16) -> Result<&NumericAnimationTrack> {
        self.numeric_tracks
            .get(&handle)
            .ok_or_else(|| track_not_found("Numeric", handle, &self.name))
    }

    pub fn numeric_track_mut(&mut self, handle: u16) -> Result<&mut NumericAnimationTrack> {
        let track = self
            .numeric_tracks
            .get_mut(&handle)
            .ok_or_else(|| track_not_found("Numeric", handle, &self.name))?;
        self.key_frame_times_dirty = true;
        Ok(track)
    }

    pub fn destroy_numeric_track(&mut self, handle: u16) -> Result<()> {
        self.numeric_tracks
            .remove(&handle)
            .ok_or_else(|| track_not_found("Numeric", handle, &self.name))?;
        self.key_frame_list_changed();
        Ok(())
    }

    pub fn destroy_all_numeric_tracks(&mut self) {
        self.numeric_tracks.clear();
        self.key_frame_list_changed();
    }

    pub fn numeric_tracks(&self) -> impl Iterator<Item = (u16, &NumericAnimationTrack)> {
        self.numeric_tracks.iter().map(|(&h, t)| (h, t))
    }

    // ========================================================================
    // Vertex tracks
    // ========================================================================

    pub fn create_vertex_track(
        &mut self,
        handle: u16,
        animation_type: VertexAnimationType,
    ) -> Result<&mut VertexAnimationTrack> {
        if self.vertex_tracks.contains_key(&handle) {
            return Err(duplicate_track("Vertex", handle, &self.name));
        }
        self.key_frame_list_changed();
        Ok(self
            .vertex_tracks
            .entry(handle)
            .or_insert_with(|| VertexAnimationTrack::new(handle, animation_type)))
    }

    #[must_use]
    pub fn num_vertex_tracks(&self) -> usize {
        self.vertex_tracks.len()
    }

    #[must_use]
    pub fn has_vertex_track(&self, handle: u16) -> bool {
        self.vertex_tracks.contains_key(&handle)
    }

    pub fn vertex_track(&self, handle: u16) -> Result<&VertexAnimationTrack> {
        self.vertex_tracks
            .get(&handle)
            .ok_or_else(|| track_not_found("Vertex", handle, &self.name))
    }

    pub fn vertex_track_mut(&mut self, handle: u16) -> Result<&mut VertexAnimationTrack> {
        let track = self
            .vertex_tracks
            .get_mut(&handle)
            .ok_or_else(|| track_not_found("Vertex", handle, &self.name))?;
        self.key_frame_times_dirty = true;
        Ok(track)
    }

    pub fn destroy_vertex_track(&mut self, handle: u16) -> Result<()> {
        self.vertex_tracks
            .remove(&handle)
            .ok_or_else(|| track_not_found("Vertex", handle, &self.name))?;
        self.key_frame_list_changed();
        Ok(())
    }

    pub fn destroy_all_vertex_tracks(&mut self) {
        self.vertex_tracks.clear();
        self.key_frame_list_changed();
    }

    pub fn vertex_tracks(&self) -> impl Iterator<Item = (u16, &VertexAnimationTrack)> {
        self.vertex_tracks.iter().map(|(&h, t)| (h, t))
    }

    pub fn destroy_all_tracks(&mut self) {
        self.node_tracks.clear();
        self.numeric_tracks.clear();
        self.vertex_tracks.clear();
        self.key_frame_list_changed();
    }

    // ========================================================================
    // Time indexing
    // ========================================================================

    /// Marks the global keyframe-time list for rebuild.
    pub fn key_frame_list_changed(&mut self) {
        self.key_frame_times_dirty = true;
    }

    fn build_key_frame_time_list(&mut self) {
        let mut times = std::mem::take(&mut self.key_frame_times);
        times.clear();
        for track in self.node_tracks.values() {
            track.collect_key_frame_times(&mut times);
        }
        for track in self.numeric_tracks.values() {
            track.collect_key_frame_times(&mut times);
        }
        for track in self.vertex_tracks.values() {
            track.collect_key_frame_times(&mut times);
        }

        let generation = next_generation();
        self.generation = generation;
        for track in self.node_tracks.values_mut() {
            track.build_key_frame_index_map(&times, generation);
        }
        for track in self.numeric_tracks.values_mut() {
            track.build_key_frame_index_map(&times, generation);
        }
        for track in self.vertex_tracks.values_mut() {
            track.build_key_frame_index_map(&times, generation);
        }

        self.key_frame_times = times;
        self.key_frame_times_dirty = false;
    }

    /// Sorted, de-duplicated keyframe times across every track.
    pub fn key_frame_times(&mut self) -> &[f32] {
        if self.key_frame_times_dirty {
            self.build_key_frame_time_list();
        }
        &self.key_frame_times
    }

    /// Resolves `time` (wrapped into the animation length) to a time index
    /// carrying the lower-bound position in the global keyframe-time list.
    pub fn time_index(&mut self, time: f32) -> TimeIndex {
        if self.key_frame_times_dirty {
            self.build_key_frame_time_list();
        }
        let time_pos = wrap_time(time, self.length);
        let index = self.key_frame_times.partition_point(|&t| t < time_pos);
        TimeIndex::with_key_index(time_pos, index, self.generation)
    }

    // ========================================================================
    // Applying
    // ========================================================================

    /// Applies every track to its associated target.
    pub fn apply(&mut self, time: f32, weight: f32, scale: f32) {
        self.apply_base_key_frame();

        let time_index = self.time_index(time);
        let ctx = self.track_context();
        for track in self.node_tracks.values() {
            track.apply(&ctx, &time_index, weight, scale);
        }
        for track in self.numeric_tracks.values() {
            track.apply(&ctx, &time_index, weight, scale);
        }
        for track in self.vertex_tracks.values() {
            track.apply(&ctx, &time_index, weight);
        }
    }

    /// Applies every node track to `node`.
    pub fn apply_to_node(&mut self, node: &mut dyn AnimableNode, time: f32, weight: f32, scale: f32) {
        self.apply_base_key_frame();

        let time_index = self.time_index(time);
        let ctx = self.track_context();
        for track in self.node_tracks.values() {
            track.apply_to_node(node, &ctx, &time_index, weight, scale);
        }
    }

    /// Applies node tracks to the bones with matching handles.
    ///
    /// `blend_mask` holds a per-bone weight multiplier indexed by handle;
    /// bones beyond its end use the plain weight. Manually controlled bones
    /// are left alone.
    pub fn apply_to_skeleton(
        &mut self,
        skeleton: &mut Skeleton,
        time: f32,
        weight: f32,
        blend_mask: Option<&[f32]>,
        scale: f32,
    ) {
        self.apply_base_key_frame();

        let time_index = self.time_index(time);
        let ctx = self.track_context();
        for (&handle, track) in &self.node_tracks {
            let Some(bone) = skeleton.animated_bone_mut(handle) else {
                continue;
            };
            let bone_weight = match blend_mask {
                Some(mask) => weight * mask.get(usize::from(handle)).copied().unwrap_or(1.0),
                None => weight,
            };
            track.apply_to_node(bone, &ctx, &time_index, bone_weight, scale);
        }
    }

    /// Applies every numeric track to `animable`.
    pub fn apply_to_animable(&mut self, animable: &mut dyn AnimableValue, time: f32, weight: f32, scale: f32) {
        self.apply_base_key_frame();

        let time_index = self.time_index(time);
        let ctx = self.track_context();
        for track in self.numeric_tracks.values() {
            track.apply_to_animable(animable, &ctx, &time_index, weight, scale);
        }
    }

    /// Applies every vertex track to `data`, resolving pose references
    /// against `poses`.
    pub fn apply_to_vertex_data(&mut self, data: &mut VertexData, time: f32, weight: f32, poses: &[Pose]) {
        self.apply_base_key_frame();

        let time_index = self.time_index(time);
        let ctx = self.track_context();
        for track in self.vertex_tracks.values() {
            track.apply_to_vertex_data(data, &ctx, &time_index, weight, poses);
        }
    }

    /// Applies vertex tracks to a mesh instance: handle 0 drives the shared
    /// geometry and handle `n` submesh `n - 1`.
    ///
    /// `software` and `hardware` select which buffers are written; pending
    /// software animation requests on the mesh force the software path.
    pub fn apply_to_mesh(&mut self, mesh: &mut AnimatedMesh, time: f32, weight: f32, software: bool, hardware: bool) {
        self.apply_base_key_frame();

        let time_index = self.time_index(time);
        let ctx = self.track_context();
        let software = software || mesh.is_software_animation_requested();
        let AnimatedMesh {
            poses,
            shared,
            submeshes,
            ..
        } = mesh;

        for (&handle, track) in &mut self.vertex_tracks {
            let target = if handle == 0 {
                shared.as_mut()
            } else {
                submeshes.get_mut(usize::from(handle) - 1)
            };
            let Some(set) = target else {
                log::debug!("Animation '{}': no vertex data for track {handle}", self.name);
                continue;
            };
            if !set.visible {
                continue;
            }

            if software {
                if track.animation_type() == VertexAnimationType::Pose {
                    set.begin_software_pose();
                }
                track.set_target_mode(VertexTargetMode::Software);
                track.apply_to_vertex_data(&mut set.software, &ctx, &time_index, weight, &poses[..]);
            }
            if hardware {
                track.set_target_mode(VertexTargetMode::Hardware);
                track.apply_to_vertex_data(&mut set.hardware, &ctx, &time_index, weight, &poses[..]);
            }
        }
    }

    // ========================================================================
    // Base keyframe rebasing
    // ========================================================================

    /// Requests a one-shot rebase of every keyframe relative to the pose of
    /// `base_animation_name` (empty for this animation) at `base_time`.
    ///
    /// The rewrite happens on the next apply call.
    pub fn set_use_base_key_frame(&mut self, use_base: bool, base_time: f32, base_animation_name: impl Into<String>) {
        self.use_base_key_frame = use_base;
        self.base_key_frame_time = base_time;
        self.base_key_frame_animation_name = base_animation_name.into();
    }

    #[must_use]
    pub fn use_base_key_frame(&self) -> bool {
        self.use_base_key_frame
    }

    #[must_use]
    pub fn base_key_frame_time(&self) -> f32 {
        self.base_key_frame_time
    }

    #[must_use]
    pub fn base_key_frame_animation_name(&self) -> &str {
        &self.base_key_frame_animation_name
    }

    fn apply_base_key_frame(&mut self) {
        if !self.use_base_key_frame {
            return;
        }
        self.use_base_key_frame = false;

        let base_name = std::mem::take(&mut self.base_key_frame_animation_name);
        let base_time = self.base_key_frame_time;
        let node_handles: Vec<u16> = self.node_tracks.keys().copied().collect();
        let pose_handles: Vec<u16> = self
            .vertex_tracks
            .iter()
            .filter(|(_, t)| t.animation_type() == VertexAnimationType::Pose)
            .map(|(&h, _)| h)
            .collect();

        let (node_bases, pose_bases) = if base_name.is_empty() || base_name == self.name {
            self.sample_base_key_frames(&node_handles, &pose_handles, base_time)
        } else {
            let base = self
                .container
                .upgrade()
                .and_then(|library| library.borrow().animation_impl(&base_name).map(|(anim, _)| anim));
            let Some(base) = base else {
                log::warn!(
                    "Animation '{}': base animation '{}' not found, keyframes left unchanged",
                    self.name,
                    base_name
                );
                self.base_key_frame_animation_name = base_name;
                return;
            };
            let Ok(mut base) = base.try_borrow_mut() else {
                log::warn!(
                    "Animation '{}': base animation '{}' is in use, keyframes left unchanged",
                    self.name,
                    base_name
                );
                self.base_key_frame_animation_name = base_name;
                return;
            };
            base.sample_base_key_frames(&node_handles, &pose_handles, base_time)
        };
        self.base_key_frame_animation_name = base_name;

        for (handle, base_kf) in &node_bases {
            if let Some(track) = self.node_tracks.get_mut(handle) {
                track.apply_base_key_frame(base_kf);
            }
        }
        for (handle, base_kf) in &pose_bases {
            if let Some(track) = self.vertex_tracks.get_mut(handle) {
                track.apply_base_key_frame(base_kf);
            }
        }
        self.key_frame_list_changed();
    }

    #[allow(clippy::type_complexity)]
    fn sample_base_key_frames(
        &mut self,
        node_handles: &[u16],
        pose_handles: &[u16],
        time: f32,
    ) -> (Vec<(u16, TransformKeyFrame)>, Vec<(u16, VertexPoseKeyFrame)>) {
        let time_index = self.time_index(time);
        let ctx = self.track_context();

        let mut node_bases = Vec::with_capacity(node_handles.len());
        for &handle in node_handles {
            match self.node_tracks.get(&handle) {
                Some(track) => node_bases.push((handle, track.interpolated_key_frame(&ctx, &time_index))),
                None => log::debug!("Base animation '{}' has no node track {handle}", self.name),
            }
        }

        let mut pose_bases = Vec::with_capacity(pose_handles.len());
        for &handle in pose_handles {
            match self.vertex_tracks.get(&handle) {
                Some(track) if track.animation_type() == VertexAnimationType::Pose => {
                    pose_bases.push((handle, track.interpolated_pose_key_frame(&ctx, &time_index)));
                }
                _ => log::debug!("Base animation '{}' has no pose track {handle}", self.name),
            }
        }
        (node_bases, pose_bases)
    }

    // ========================================================================
    // Optimisation
    // ========================================================================

    /// Removes redundant data.
    ///
    /// Node tracks without any non-identity keyframe are destroyed when
    /// `discard_identity_node_tracks` is set, the rest are optimised. Vertex
    /// tracks with no effective keyframes are always destroyed.
    pub fn optimise(&mut self, discard_identity_node_tracks: bool) {
        self.optimise_node_tracks(discard_identity_node_tracks);
        self.optimise_vertex_tracks();
    }

    fn optimise_node_tracks(&mut self, discard_identity: bool) {
        let before = self.node_tracks.len();
        if discard_identity {
            self.node_tracks.retain(|_, track| track.has_non_zero_key_frames());
        }
        for track in self.node_tracks.values_mut() {
            track.optimise();
        }
        let removed = before - self.node_tracks.len();
        if removed > 0 {
            log::debug!("Animation '{}': discarded {removed} identity node tracks", self.name);
        }
        self.key_frame_list_changed();
    }

    fn optimise_vertex_tracks(&mut self) {
        self.vertex_tracks.retain(|_, track| track.has_non_zero_key_frames());
        for track in self.vertex_tracks.values_mut() {
            track.optimise();
        }
        self.key_frame_list_changed();
    }

    /// Removes from `handles` every node track handle that has non-identity
    /// keyframes in this animation.
    pub fn collect_identity_node_tracks(&self, handles: &mut BTreeSet<u16>) {
        for (handle, track) in &self.node_tracks {
            if track.has_non_zero_key_frames() {
                handles.remove(handle);
            }
        }
    }

    /// Destroys the node tracks listed in `handles`, ignoring absent ones.
    pub fn destroy_node_tracks(&mut self, handles: &BTreeSet<u16>) {
        self.node_tracks.retain(|handle, _| !handles.contains(handle));
        self.key_frame_list_changed();
    }

    // ========================================================================
    // Cloning
    // ========================================================================

    /// Deep copy under a new name. The copy belongs to no container.
    #[must_use]
    pub fn clone_animation(&self, new_name: impl Into<String>) -> Animation {
        Animation {
            name: new_name.into(),
            length: self.length,
            interpolation_mode: self.interpolation_mode,
            rotation_interpolation_mode: self.rotation_interpolation_mode,
            node_tracks: self.node_tracks.clone(),
            numeric_tracks: self.numeric_tracks.clone(),
            vertex_tracks: self.vertex_tracks.clone(),
            key_frame_times: Vec::new(),
            key_frame_times_dirty: true,
            generation: 0,
            use_base_key_frame: self.use_base_key_frame,
            base_key_frame_time: self.base_key_frame_time,
            base_key_frame_animation_name: self.base_key_frame_animation_name.clone(),
            container: Weak::new(),
        }
    }
}
