//! Vertex Animation Targets
//!
//! Plain-data stand-ins for the vertex side of a mesh: shared keyframe
//! buffers, poses, the per-instance working buffers vertex tracks write to,
//! and [`AnimatedMesh`], which groups them the way an entity does (shared
//! geometry plus one set per submesh).
//!
//! Two application paths exist:
//! - **Software**: positions are blended on the CPU into
//!   [`VertexData::positions`].
//! - **Hardware**: nothing is blended; keyframe buffers and pose indices are
//!   bound into [`HardwareAnimationData`] slots together with their blend
//!   factor, ready for a vertex shader.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use glam::Vec3;

use crate::errors::{AnimationError, Result};

/// Immutable snapshot of vertex positions (and optionally normals).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexBuffer {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
}

impl VertexBuffer {
    #[must_use]
    pub fn from_positions(positions: Vec<Vec3>) -> Self {
        Self {
            positions,
            normals: None,
        }
    }

    #[must_use]
    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = Some(normals);
        self
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

pub type SharedVertexBuffer = Rc<VertexBuffer>;

// ============================================================================
// Poses
// ============================================================================

/// Sparse per-vertex offsets relative to the original geometry.
#[derive(Debug, Clone, Default)]
pub struct Pose {
    name: String,
    target: u16,
    offsets: BTreeMap<usize, Vec3>,
    normals: BTreeMap<usize, Vec3>,
}

impl Pose {
    /// Creates an empty pose for `target` (0 = shared geometry, `n` =
    /// submesh `n - 1`).
    #[must_use]
    pub fn new(name: impl Into<String>, target: u16) -> Self {
        Self {
            name: name.into(),
            target,
            offsets: BTreeMap::new(),
            normals: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn target(&self) -> u16 {
        self.target
    }

    pub fn add_vertex(&mut self, index: usize, offset: Vec3) {
        self.offsets.insert(index, offset);
    }

    pub fn add_vertex_with_normal(&mut self, index: usize, offset: Vec3, normal: Vec3) {
        self.offsets.insert(index, offset);
        self.normals.insert(index, normal);
    }

    pub fn remove_vertex(&mut self, index: usize) {
        self.offsets.remove(&index);
        self.normals.remove(&index);
    }

    pub fn offsets(&self) -> impl Iterator<Item = (usize, Vec3)> + '_ {
        self.offsets.iter().map(|(&i, &o)| (i, o))
    }

    pub fn normal_offsets(&self) -> impl Iterator<Item = (usize, Vec3)> + '_ {
        self.normals.iter().map(|(&i, &o)| (i, o))
    }
}

// ============================================================================
// Working vertex data
// ============================================================================

/// What a hardware animation slot is bound to.
#[derive(Debug, Clone)]
pub enum HardwareSource {
    /// Morph target buffer (keyframe 2 of the active segment).
    KeyFrame(SharedVertexBuffer),
    /// Index into the mesh's pose list.
    Pose(u16),
}

/// One hardware blend slot.
#[derive(Debug, Clone, Default)]
pub struct HardwareAnimationData {
    pub source: Option<HardwareSource>,
    pub parametric: f32,
}

/// Vertex buffers an animation writes into.
#[derive(Debug, Clone, Default)]
pub struct VertexData {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    /// Position stream bound for hardware morphing (keyframe 1).
    pub position_binding: Option<SharedVertexBuffer>,
    pub hw_animation_data: Vec<HardwareAnimationData>,
    hw_animation_data_items_used: usize,
}

pub type VertexDataRef = Rc<RefCell<VertexData>>;
pub type WeakVertexDataRef = Weak<RefCell<VertexData>>;

impl VertexData {
    #[must_use]
    pub fn from_buffer(buffer: &VertexBuffer) -> Self {
        Self {
            positions: buffer.positions.clone(),
            normals: buffer.normals.clone(),
            ..Self::default()
        }
    }

    /// Reserves `count` hardware blend slots.
    #[must_use]
    pub fn with_hardware_slots(mut self, count: usize) -> Self {
        self.hw_animation_data = vec![HardwareAnimationData::default(); count];
        self
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn hw_animation_data_items_used(&self) -> usize {
        self.hw_animation_data_items_used
    }

    /// Claims the next free hardware slot.
    pub(crate) fn claim_hardware_slot(&mut self) -> Option<&mut HardwareAnimationData> {
        let index = self.hw_animation_data_items_used;
        self.hw_animation_data_items_used += 1;
        self.hw_animation_data.get_mut(index)
    }

    /// Releases every hardware slot and unbinds them.
    pub fn reset_hardware_animation(&mut self) {
        self.hw_animation_data_items_used = 0;
        self.position_binding = None;
        for slot in &mut self.hw_animation_data {
            slot.source = None;
            slot.parametric = 0.0;
        }
    }

    /// Overwrites positions and normals with `buffer`.
    pub fn copy_from(&mut self, buffer: &VertexBuffer) {
        self.positions.clone_from(&buffer.positions);
        self.normals.clone_from(&buffer.normals);
    }
}

/// Linear blend of two keyframe buffers into `target`.
pub fn software_vertex_morph(t: f32, b1: &VertexBuffer, b2: &VertexBuffer, target: &mut VertexData) {
    let count = b1.positions.len().min(b2.positions.len());
    target.positions.resize(count, Vec3::ZERO);
    for (out, (a, b)) in target
        .positions
        .iter_mut()
        .zip(b1.positions.iter().zip(&b2.positions))
    {
        *out = *a + (*b - *a) * t;
    }

    if let (Some(n1), Some(n2)) = (&b1.normals, &b2.normals) {
        let normals = target.normals.get_or_insert_with(Vec::new);
        normals.clear();
        normals.extend(n1.iter().zip(n2).map(|(a, b)| (*a + (*b - *a) * t).normalize_or_zero()));
    }
}

/// Adds `influence`-scaled pose offsets to `target`.
pub fn software_vertex_pose_blend(influence: f32, pose: &Pose, target: &mut VertexData) {
    for (index, offset) in pose.offsets() {
        if let Some(position) = target.positions.get_mut(index) {
            *position += offset * influence;
        }
    }
    if let Some(normals) = target.normals.as_mut() {
        for (index, offset) in pose.normal_offsets() {
            if let Some(normal) = normals.get_mut(index) {
                *normal += offset * influence;
            }
        }
    }
}

// ============================================================================
// Entity target
// ============================================================================

/// Vertex state of one geometry slot (shared geometry or a submesh).
#[derive(Debug, Clone)]
pub struct AnimatedVertexSet {
    original: SharedVertexBuffer,
    pub software: VertexData,
    pub hardware: VertexData,
    pub visible: bool,
    software_pose_started: bool,
}

impl AnimatedVertexSet {
    #[must_use]
    pub fn new(original: SharedVertexBuffer, hardware_slots: usize) -> Self {
        Self {
            software: VertexData::from_buffer(&original),
            hardware: VertexData::from_buffer(&original).with_hardware_slots(hardware_slots),
            original,
            visible: true,
            software_pose_started: false,
        }
    }

    #[must_use]
    pub fn original(&self) -> &SharedVertexBuffer {
        &self.original
    }

    /// Prepares the software buffer for pose accumulation.
    ///
    /// Poses are additive, so the first pose applied in a frame starts from
    /// the original positions.
    pub(crate) fn begin_software_pose(&mut self) {
        if !self.software_pose_started {
            self.software.copy_from(&self.original);
            self.software_pose_started = true;
        }
    }

    fn begin_frame(&mut self) {
        self.software_pose_started = false;
        self.software.copy_from(&self.original);
        self.hardware.reset_hardware_animation();
    }
}

/// Mesh instance state driven by vertex tracks.
///
/// Vertex track handle 0 addresses [`AnimatedMesh::shared`], handle `n`
/// addresses `submeshes[n - 1]`.
#[derive(Debug, Clone, Default)]
pub struct AnimatedMesh {
    pub poses: Vec<Pose>,
    pub shared: Option<AnimatedVertexSet>,
    pub submeshes: Vec<AnimatedVertexSet>,
    software_animation_requests: u32,
    software_animation_normals_requests: u32,
}

impl AnimatedMesh {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for software-blended results even when hardware animation is
    /// in use, e.g. for CPU-side picking. Requests are counted.
    pub fn add_software_animation_request(&mut self, normals_also: bool) {
        self.software_animation_requests += 1;
        if normals_also {
            self.software_animation_normals_requests += 1;
        }
    }

    /// Withdraws a request made with [`AnimatedMesh::add_software_animation_request`].
    pub fn remove_software_animation_request(&mut self, normals_also: bool) -> Result<()> {
        if self.software_animation_requests == 0
            || (normals_also && self.software_animation_normals_requests == 0)
        {
            return Err(AnimationError::InvalidParameters(
                "attempt to remove a software animation request that was never added".into(),
            ));
        }
        self.software_animation_requests -= 1;
        if normals_also {
            self.software_animation_normals_requests -= 1;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_software_animation_requested(&self) -> bool {
        self.software_animation_requests > 0
    }

    #[must_use]
    pub fn is_software_animation_normals_requested(&self) -> bool {
        self.software_animation_normals_requests > 0
    }

    /// Starts a new animation frame: restores original positions and
    /// releases hardware slots.
    pub fn begin_animation_update(&mut self) {
        if let Some(shared) = self.shared.as_mut() {
            shared.begin_frame();
        }
        for sub in &mut self.submeshes {
            sub.begin_frame();
        }
    }

    /// Vertex set addressed by a vertex track handle.
    pub fn vertex_set_mut(&mut self, handle: u16) -> Option<&mut AnimatedVertexSet> {
        if handle == 0 {
            self.shared.as_mut()
        } else {
            self.submeshes.get_mut(usize::from(handle) - 1)
        }
    }
}
