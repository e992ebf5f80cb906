use glam::{Quat, Vec3};
use smallvec::SmallVec;

use super::values::NumericValue;
use crate::vertex::SharedVertexBuffer;

/// Common interface of every keyframe variant.
///
/// A keyframe's time is fixed at creation; tracks keep their keyframes
/// sorted by it.
pub trait KeyFrame: Clone {
    fn time(&self) -> f32;
}

// ============================================================================
// Transform
// ============================================================================

/// A node pose sample: translation, rotation and scale at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformKeyFrame {
    time: f32,
    pub translate: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl TransformKeyFrame {
    #[must_use]
    pub fn new(time: f32) -> Self {
        Self {
            time,
            translate: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Copies the pose of `other` while keeping this keyframe's time.
    pub fn copy_pose_from(&mut self, other: &TransformKeyFrame) {
        self.translate = other.translate;
        self.rotation = other.rotation;
        self.scale = other.scale;
    }
}

impl KeyFrame for TransformKeyFrame {
    fn time(&self) -> f32 {
        self.time
    }
}

// ============================================================================
// Numeric
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericKeyFrame {
    time: f32,
    pub value: NumericValue,
}

impl NumericKeyFrame {
    #[must_use]
    pub fn new(time: f32) -> Self {
        Self {
            time,
            value: NumericValue::default(),
        }
    }
}

impl KeyFrame for NumericKeyFrame {
    fn time(&self) -> f32 {
        self.time
    }
}

// ============================================================================
// Vertex morph
// ============================================================================

/// A full snapshot of vertex positions.
#[derive(Debug, Clone)]
pub struct VertexMorphKeyFrame {
    time: f32,
    buffer: Option<SharedVertexBuffer>,
}

impl VertexMorphKeyFrame {
    #[must_use]
    pub fn new(time: f32) -> Self {
        Self { time, buffer: None }
    }

    pub fn set_vertex_buffer(&mut self, buffer: SharedVertexBuffer) {
        self.buffer = Some(buffer);
    }

    #[must_use]
    pub fn vertex_buffer(&self) -> Option<&SharedVertexBuffer> {
        self.buffer.as_ref()
    }
}

impl KeyFrame for VertexMorphKeyFrame {
    fn time(&self) -> f32 {
        self.time
    }
}

// ============================================================================
// Vertex pose
// ============================================================================

/// Weighted reference to a pose in the owning mesh's pose list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseRef {
    pub pose_index: u16,
    pub influence: f32,
}

/// A set of weighted pose references. Pose indices are unique.
#[derive(Debug, Clone)]
pub struct VertexPoseKeyFrame {
    time: f32,
    pose_refs: SmallVec<[PoseRef; 4]>,
}

impl VertexPoseKeyFrame {
    #[must_use]
    pub fn new(time: f32) -> Self {
        Self {
            time,
            pose_refs: SmallVec::new(),
        }
    }

    /// Adds a reference, or overwrites the influence of an existing one.
    pub fn add_pose_reference(&mut self, pose_index: u16, influence: f32) {
        self.update_pose_reference(pose_index, influence);
    }

    pub fn update_pose_reference(&mut self, pose_index: u16, influence: f32) {
        match self.pose_refs.iter_mut().find(|r| r.pose_index == pose_index) {
            Some(existing) => existing.influence = influence,
            None => self.pose_refs.push(PoseRef { pose_index, influence }),
        }
    }

    pub fn remove_pose_reference(&mut self, pose_index: u16) {
        self.pose_refs.retain(|r| r.pose_index != pose_index);
    }

    pub fn remove_all_pose_references(&mut self) {
        self.pose_refs.clear();
    }

    #[must_use]
    pub fn pose_references(&self) -> &[PoseRef] {
        &self.pose_refs
    }

    #[must_use]
    pub fn influence_of(&self, pose_index: u16) -> Option<f32> {
        self.pose_refs
            .iter()
            .find(|r| r.pose_index == pose_index)
            .map(|r| r.influence)
    }
}

impl KeyFrame for VertexPoseKeyFrame {
    fn time(&self) -> f32 {
        self.time
    }
}

/// Keyframe stored by vertex tracks; the variant matches the track's
/// animation type.
#[derive(Debug, Clone)]
pub enum VertexKeyFrame {
    Morph(VertexMorphKeyFrame),
    Pose(VertexPoseKeyFrame),
}

impl VertexKeyFrame {
    #[must_use]
    pub fn as_morph(&self) -> Option<&VertexMorphKeyFrame> {
        match self {
            VertexKeyFrame::Morph(kf) => Some(kf),
            VertexKeyFrame::Pose(_) => None,
        }
    }

    pub fn as_morph_mut(&mut self) -> Option<&mut VertexMorphKeyFrame> {
        match self {
            VertexKeyFrame::Morph(kf) => Some(kf),
            VertexKeyFrame::Pose(_) => None,
        }
    }

    #[must_use]
    pub fn as_pose(&self) -> Option<&VertexPoseKeyFrame> {
        match self {
            VertexKeyFrame::Pose(kf) => Some(kf),
            VertexKeyFrame::Morph(_) => None,
        }
    }

    pub fn as_pose_mut(&mut self) -> Option<&mut VertexPoseKeyFrame> {
        match self {
            VertexKeyFrame::Pose(kf) => Some(kf),
            VertexKeyFrame::Morph(_) => None,
        }
    }
}

impl KeyFrame for VertexKeyFrame {
    fn time(&self) -> f32 {
        match self {
            VertexKeyFrame::Morph(kf) => kf.time(),
            VertexKeyFrame::Pose(kf) => kf.time(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_references_update_in_place() {
        let mut kf = VertexPoseKeyFrame::new(0.5);
        kf.add_pose_reference(3, 0.25);
        kf.add_pose_reference(1, 1.0);
        kf.add_pose_reference(3, 0.75);

        assert_eq!(kf.pose_references().len(), 2);
        assert_eq!(kf.influence_of(3), Some(0.75));

        kf.remove_pose_reference(1);
        assert_eq!(kf.influence_of(1), None);
        assert_eq!(kf.pose_references().len(), 1);
    }
}
