use glam::{Affine3A, Quat, Vec3};

use super::transform::{AnimableNode, Transform};

/// A node of a skeleton's transform tree.
///
/// Parent and children are stored as handles into the owning skeleton.
#[derive(Debug, Clone)]
pub struct Bone {
    handle: u16,
    name: String,
    pub(crate) parent: Option<u16>,
    pub(crate) children: Vec<u16>,
    pub(crate) transform: Transform,
    manually_controlled: bool,

    // Inverse of the derived transform captured by `Skeleton::set_binding_pose`
    bind_derived_inverse_position: Vec3,
    bind_derived_inverse_rotation: Quat,
    bind_derived_inverse_scale: Vec3,
}

impl Bone {
    pub(crate) fn new(handle: u16, name: String) -> Self {
        Self {
            handle,
            name,
            parent: None,
            children: Vec::new(),
            transform: Transform::new(),
            manually_controlled: false,
            bind_derived_inverse_position: Vec3::ZERO,
            bind_derived_inverse_rotation: Quat::IDENTITY,
            bind_derived_inverse_scale: Vec3::ONE,
        }
    }

    #[must_use]
    pub fn handle(&self) -> u16 {
        self.handle
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<u16> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[u16] {
        &self.children
    }

    #[must_use]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    // === Local transform ===

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
    }

    #[must_use]
    pub fn orientation(&self) -> Quat {
        self.transform.rotation
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.transform.rotation = orientation;
    }

    #[must_use]
    pub fn scale(&self) -> Vec3 {
        self.transform.scale
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.scale = scale;
    }

    // === Initial (binding) state ===

    #[must_use]
    pub fn initial_position(&self) -> Vec3 {
        self.transform.initial_position()
    }

    #[must_use]
    pub fn initial_orientation(&self) -> Quat {
        self.transform.initial_rotation()
    }

    #[must_use]
    pub fn initial_scale(&self) -> Vec3 {
        self.transform.initial_scale()
    }

    pub fn set_initial_state(&mut self) {
        self.transform.set_initial_state();
    }

    /// Restores the initial state.
    pub fn reset(&mut self) {
        self.transform.reset_to_initial_state();
    }

    // === Derived transform ===

    #[must_use]
    pub fn derived_position(&self) -> Vec3 {
        self.transform.derived_position()
    }

    #[must_use]
    pub fn derived_orientation(&self) -> Quat {
        self.transform.derived_rotation()
    }

    #[must_use]
    pub fn derived_scale(&self) -> Vec3 {
        self.transform.derived_scale()
    }

    #[must_use]
    pub fn is_manually_controlled(&self) -> bool {
        self.manually_controlled
    }

    pub(crate) fn set_manually_controlled_flag(&mut self, manually_controlled: bool) {
        self.manually_controlled = manually_controlled;
    }

    /// Stores the inverse of the current derived transform as the binding
    /// pose.
    pub(crate) fn set_binding_pose(&mut self) {
        self.transform.set_initial_state();

        let (position, rotation, scale) = self.transform.derived();
        self.bind_derived_inverse_position = -position;
        self.bind_derived_inverse_scale = Vec3::ONE / scale;
        self.bind_derived_inverse_rotation = rotation.inverse();
    }

    /// Transform taking bind-pose vertices to the current pose.
    #[must_use]
    pub fn offset_transform(&self) -> Affine3A {
        let (position, rotation, scale) = self.transform.derived();

        let local_scale = scale * self.bind_derived_inverse_scale;
        let local_rotation = rotation * self.bind_derived_inverse_rotation;
        let local_translation = position + local_rotation * (local_scale * self.bind_derived_inverse_position);

        Affine3A::from_scale_rotation_translation(local_scale, local_rotation, local_translation)
    }
}

impl AnimableNode for Bone {
    fn translate(&mut self, delta: Vec3) {
        self.transform.translate(delta);
    }

    fn rotate(&mut self, rotation: Quat) {
        self.transform.rotate(rotation);
    }

    fn scale_by(&mut self, factor: Vec3) {
        self.transform.scale_by(factor);
    }
}
