use std::cell::RefCell;
use std::rc::Rc;

use glam::{Quat, Vec3};

/// Target of node animation tracks.
///
/// Every operation composes onto the current transform rather than
/// replacing it, so several animations can be layered in one pass.
pub trait AnimableNode {
    /// Moves by `delta` in parent space.
    fn translate(&mut self, delta: Vec3);
    /// Rotates by `rotation` in local space.
    fn rotate(&mut self, rotation: Quat);
    /// Multiplies the current scale by `factor`.
    fn scale_by(&mut self, factor: Vec3);
}

pub type NodeRef = Rc<RefCell<Transform>>;

/// Local TRS with an initial (binding) state and a transform derived
/// relative to the hierarchy root.
///
/// Bones are built on it, and a standalone transform can be driven directly
/// by a node track.
#[derive(Debug, Clone)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    // Restored by reset
    initial_position: Vec3,
    initial_rotation: Quat,
    initial_scale: Vec3,

    // Relative to the hierarchy root
    pub(crate) derived_position: Vec3,
    pub(crate) derived_rotation: Quat,
    pub(crate) derived_scale: Vec3,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,

            initial_position: Vec3::ZERO,
            initial_rotation: Quat::IDENTITY,
            initial_scale: Vec3::ONE,

            derived_position: Vec3::ZERO,
            derived_rotation: Quat::IDENTITY,
            derived_scale: Vec3::ONE,
        }
    }

    #[must_use]
    pub fn from_trs(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn into_ref(self) -> NodeRef {
        Rc::new(RefCell::new(self))
    }

    // ========================================================================
    // Initial state
    // ========================================================================

    /// Snapshots the current local transform as the initial state.
    pub fn set_initial_state(&mut self) {
        self.initial_position = self.position;
        self.initial_rotation = self.rotation;
        self.initial_scale = self.scale;
    }

    /// Restores the initial state.
    pub fn reset_to_initial_state(&mut self) {
        self.position = self.initial_position;
        self.rotation = self.initial_rotation;
        self.scale = self.initial_scale;
    }

    #[must_use]
    pub fn initial_position(&self) -> Vec3 {
        self.initial_position
    }

    #[must_use]
    pub fn initial_rotation(&self) -> Quat {
        self.initial_rotation
    }

    #[must_use]
    pub fn initial_scale(&self) -> Vec3 {
        self.initial_scale
    }

    // ========================================================================
    // Derived transform
    // ========================================================================

    /// Derives the transform relative to the hierarchy root from the parent's
    /// derived transform (`None` for a root).
    pub fn update_derived(&mut self, parent: Option<(Vec3, Quat, Vec3)>) {
        match parent {
            Some((parent_position, parent_rotation, parent_scale)) => {
                self.derived_rotation = parent_rotation * self.rotation;
                self.derived_scale = parent_scale * self.scale;
                self.derived_position = parent_rotation * (parent_scale * self.position) + parent_position;
            }
            None => {
                self.derived_rotation = self.rotation;
                self.derived_scale = self.scale;
                self.derived_position = self.position;
            }
        }
    }

    #[must_use]
    pub fn derived_position(&self) -> Vec3 {
        self.derived_position
    }

    #[must_use]
    pub fn derived_rotation(&self) -> Quat {
        self.derived_rotation
    }

    #[must_use]
    pub fn derived_scale(&self) -> Vec3 {
        self.derived_scale
    }

    #[must_use]
    pub(crate) fn derived(&self) -> (Vec3, Quat, Vec3) {
        (self.derived_position, self.derived_rotation, self.derived_scale)
    }
}

impl AnimableNode for Transform {
    fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    fn rotate(&mut self, rotation: Quat) {
        self.rotation = (self.rotation * rotation).normalize();
    }

    fn scale_by(&mut self, factor: Vec3) {
        self.scale *= factor;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
