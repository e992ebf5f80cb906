use std::cell::Ref;
use std::collections::BTreeSet;
use std::rc::Rc;

use glam::{Affine3A, Quat, Vec3};
use rustc_hash::FxHashMap;

use super::bone::Bone;
use crate::animation::container::{
    AnimationContainer, AnimationLibrary, LinkedSkeletonAnimationSource, SharedAnimationLibrary,
};
use crate::animation::{AnimationRef, AnimationStateSet};
use crate::errors::{AnimationError, Result};

/// Bone handles must stay below this value.
pub const MAX_NUM_BONES: u16 = 256;

/// How the weights of simultaneously enabled animation states combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkeletonAnimationBlendMode {
    /// Weights are scaled down when their total exceeds 1.
    #[default]
    Average,
    /// Weights are applied as given.
    Cumulative,
}

fn bone_not_found(handle: u16) -> AnimationError {
    AnimationError::ItemNotFound(format!("bone with handle {handle} not found"))
}

/// A hierarchy of bones plus the animations that drive it.
///
/// Bones are addressed by handle. Each frame typically runs
/// [`Skeleton::set_animation_state`] followed by [`Skeleton::bone_matrices`],
/// which derives the hierarchy and returns one skinning transform per bone.
#[derive(Debug)]
pub struct Skeleton {
    name: String,

    // === Core Data ===
    // bones[h] holds the bone with handle h; gaps are allowed
    pub(crate) bones: Vec<Option<Bone>>,
    bone_names: FxHashMap<String, u16>,
    next_auto_handle: u16,

    // Derived lazily from the parent links
    root_bones: Vec<u16>,
    root_bones_dirty: bool,

    // === Manual control ===
    manual_bones: BTreeSet<u16>,
    manual_bones_dirty: bool,

    // === Animation ===
    animations: SharedAnimationLibrary,
    blend_mode: SkeletonAnimationBlendMode,
}

impl Skeleton {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bones: Vec::new(),
            bone_names: FxHashMap::default(),
            next_auto_handle: 0,
            root_bones: Vec::new(),
            root_bones_dirty: false,
            manual_bones: BTreeSet::new(),
            manual_bones_dirty: false,
            animations: AnimationLibrary::new_shared(),
            blend_mode: SkeletonAnimationBlendMode::default(),
        }
    }

    /// Copies the hierarchy and binding pose of `master` and shares its
    /// animation library.
    pub(crate) fn from_master(master: &Skeleton) -> Self {
        let mut bones = master.bones.clone();
        for bone in bones.iter_mut().flatten() {
            bone.set_manually_controlled_flag(false);
        }

        let mut skeleton = Self {
            name: master.name.clone(),
            bones,
            bone_names: master.bone_names.clone(),
            next_auto_handle: master.next_auto_handle,
            root_bones: Vec::new(),
            root_bones_dirty: true,
            manual_bones: BTreeSet::new(),
            manual_bones_dirty: false,
            animations: Rc::clone(&master.animations),
            blend_mode: master.blend_mode,
        };
        skeleton.reset(true);
        skeleton.set_binding_pose();
        skeleton
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn blend_mode(&self) -> SkeletonAnimationBlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: SkeletonAnimationBlendMode) {
        self.blend_mode = mode;
    }

    // ========================================================================
    // Bones
    // ========================================================================

    /// Creates an unnamed bone with the next free handle.
    pub fn create_bone(&mut self) -> Result<&mut Bone> {
        self.insert_bone(self.next_auto_handle, None)
    }

    pub fn create_named_bone(&mut self, name: &str) -> Result<&mut Bone> {
        self.insert_bone(self.next_auto_handle, Some(name))
    }

    pub fn create_bone_with_handle(&mut self, handle: u16) -> Result<&mut Bone> {
        self.insert_bone(handle, None)
    }

    pub fn create_named_bone_with_handle(&mut self, name: &str, handle: u16) -> Result<&mut Bone> {
        self.insert_bone(handle, Some(name))
    }

    fn insert_bone(&mut self, handle: u16, name: Option<&str>) -> Result<&mut Bone> {
        if handle >= MAX_NUM_BONES {
            return Err(AnimationError::InvalidParameters(format!(
                "exceeded the maximum number of bones per skeleton ({MAX_NUM_BONES})"
            )));
        }
        let slot = usize::from(handle);
        if self.bone_slot(handle).is_some() {
            return Err(AnimationError::DuplicateItem(format!(
                "a bone with the handle {handle} already exists"
            )));
        }
        let name = name.map_or_else(|| format!("Unnamed_{handle}"), str::to_owned);
        if self.bone_names.contains_key(&name) {
            return Err(AnimationError::DuplicateItem(format!(
                "a bone with the name '{name}' already exists"
            )));
        }

        if self.bones.len() <= slot {
            self.bones.resize_with(slot + 1, || None);
        }
        self.bone_names.insert(name.clone(), handle);
        self.next_auto_handle = self.next_auto_handle.max(handle + 1);
        self.root_bones_dirty = true;
        Ok(self.bones[slot].insert(Bone::new(handle, name)))
    }

    fn bone_slot(&self, handle: u16) -> Option<&Bone> {
        self.bones.get(usize::from(handle)).and_then(Option::as_ref)
    }

    fn bone_slot_mut(&mut self, handle: u16) -> Option<&mut Bone> {
        self.bones.get_mut(usize::from(handle)).and_then(Option::as_mut)
    }

    /// Makes `child` a child of `parent`.
    ///
    /// Fails with [`AnimationError::InvalidParameters`] if `child` already
    /// has a parent or is an ancestor of `parent`.
    pub fn add_child(&mut self, parent: u16, child: u16) -> Result<()> {
        self.bone(parent)?;
        let child_bone = self.bone(child)?;
        if let Some(existing) = child_bone.parent {
            return Err(AnimationError::InvalidParameters(format!(
                "bone '{}' already has parent {existing}",
                child_bone.name()
            )));
        }

        let mut cursor = Some(parent);
        while let Some(handle) = cursor {
            if handle == child {
                return Err(AnimationError::InvalidParameters(format!(
                    "linking bone {child} under bone {parent} would create a cycle"
                )));
            }
            cursor = self.bone_slot(handle).and_then(Bone::parent);
        }

        if let Some(bone) = self.bone_slot_mut(child) {
            bone.parent = Some(parent);
        }
        if let Some(bone) = self.bone_slot_mut(parent) {
            bone.children.push(child);
        }
        self.root_bones_dirty = true;
        Ok(())
    }

    pub fn bone(&self, handle: u16) -> Result<&Bone> {
        self.bone_slot(handle).ok_or_else(|| bone_not_found(handle))
    }

    /// Mutable access to a manually controlled bone marks the manual bones
    /// dirty.
    pub fn bone_mut(&mut self, handle: u16) -> Result<&mut Bone> {
        if self.manual_bones.contains(&handle) {
            self.manual_bones_dirty = true;
        }
        self.bone_slot_mut(handle).ok_or_else(|| bone_not_found(handle))
    }

    pub fn bone_by_name(&self, name: &str) -> Result<&Bone> {
        let handle = self.bone_handle(name)?;
        self.bone(handle)
    }

    pub fn bone_by_name_mut(&mut self, name: &str) -> Result<&mut Bone> {
        let handle = self.bone_handle(name)?;
        self.bone_mut(handle)
    }

    pub fn bone_handle(&self, name: &str) -> Result<u16> {
        self.bone_names
            .get(name)
            .copied()
            .ok_or_else(|| AnimationError::ItemNotFound(format!("bone named '{name}' not found")))
    }

    #[must_use]
    pub fn has_bone(&self, handle: u16) -> bool {
        self.bone_slot(handle).is_some()
    }

    #[must_use]
    pub fn has_bone_named(&self, name: &str) -> bool {
        self.bone_names.contains_key(name)
    }

    /// Number of bone slots, i.e. the highest handle plus one.
    #[must_use]
    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    /// Bones in handle order.
    pub fn bones(&self) -> impl Iterator<Item = &Bone> {
        self.bones.iter().flatten()
    }

    /// Handles of the bones without a parent, in handle order.
    pub fn root_bones(&mut self) -> &[u16] {
        self.derive_root_bones();
        &self.root_bones
    }

    /// The first root bone.
    pub fn root_bone(&mut self) -> Option<&Bone> {
        self.derive_root_bones();
        let handle = *self.root_bones.first()?;
        self.bone_slot(handle)
    }

    fn derive_root_bones(&mut self) {
        if !self.root_bones_dirty {
            return;
        }
        self.root_bones.clear();
        self.root_bones
            .extend(self.bones.iter().flatten().filter(|b| b.parent.is_none()).map(Bone::handle));
        self.root_bones_dirty = false;
    }

    // ========================================================================
    // Pose
    // ========================================================================

    /// Captures the current pose of every bone as its binding pose.
    pub fn set_binding_pose(&mut self) {
        self.update_transforms();
        for bone in self.bones.iter_mut().flatten() {
            bone.set_binding_pose();
        }
    }

    /// Restores bones to their initial state. Manually controlled bones are
    /// only reset when `reset_manual_bones` is set.
    pub fn reset(&mut self, reset_manual_bones: bool) {
        for bone in self.bones.iter_mut().flatten() {
            if !bone.is_manually_controlled() || reset_manual_bones {
                bone.reset();
            }
        }
        if reset_manual_bones && !self.manual_bones.is_empty() {
            self.manual_bones_dirty = true;
        }
    }

    /// Derives every bone's transform relative to the skeleton root.
    pub fn update_transforms(&mut self) {
        self.derive_root_bones();

        let mut stack: Vec<(u16, Option<(Vec3, Quat, Vec3)>)> =
            self.root_bones.iter().rev().map(|&h| (h, None)).collect();
        while let Some((handle, parent)) = stack.pop() {
            let Some(bone) = self.bone_slot_mut(handle) else {
                continue;
            };
            bone.transform.update_derived(parent);
            let derived = bone.transform.derived();
            stack.extend(bone.children.iter().rev().map(|&c| (c, Some(derived))));
        }

        self.manual_bones_dirty = false;
    }

    /// Skinning transforms indexed by bone handle.
    pub fn bone_matrices(&mut self) -> Vec<Affine3A> {
        let mut matrices = vec![Affine3A::IDENTITY; self.num_bones()];
        self.fill_bone_matrices(&mut matrices);
        matrices
    }

    /// Writes skinning transforms into `out`, which must hold at least
    /// [`Skeleton::num_bones`] entries. Empty handle slots get the identity.
    pub fn bone_matrices_into(&mut self, out: &mut [Affine3A]) -> Result<()> {
        if out.len() < self.num_bones() {
            return Err(AnimationError::InvalidParameters(format!(
                "bone matrix buffer holds {} entries, skeleton '{}' needs {}",
                out.len(),
                self.name,
                self.num_bones()
            )));
        }
        self.fill_bone_matrices(out);
        Ok(())
    }

    fn fill_bone_matrices(&mut self, out: &mut [Affine3A]) {
        self.update_transforms();
        for (slot, matrix) in self.bones.iter().zip(out.iter_mut()) {
            *matrix = slot.as_ref().map_or(Affine3A::IDENTITY, Bone::offset_transform);
        }
    }

    // ========================================================================
    // Manual control
    // ========================================================================

    /// Manually controlled bones keep their transform across
    /// [`Skeleton::set_animation_state`] and are never moved by animations.
    pub fn set_bone_manually_controlled(&mut self, handle: u16, manually_controlled: bool) -> Result<()> {
        let bone = self.bone_slot_mut(handle).ok_or_else(|| bone_not_found(handle))?;
        bone.set_manually_controlled_flag(manually_controlled);
        if manually_controlled {
            self.manual_bones.insert(handle);
            self.manual_bones_dirty = true;
        } else {
            self.manual_bones.remove(&handle);
        }
        Ok(())
    }

    /// Whether a manually controlled bone may have moved since the last
    /// [`Skeleton::update_transforms`].
    #[must_use]
    pub fn manual_bones_dirty(&self) -> bool {
        self.manual_bones_dirty
    }

    #[must_use]
    pub fn has_manual_bones(&self) -> bool {
        !self.manual_bones.is_empty()
    }

    pub fn manual_bones(&self) -> impl Iterator<Item = u16> + '_ {
        self.manual_bones.iter().copied()
    }

    /// Bone an animation may write to.
    pub(crate) fn animated_bone_mut(&mut self, handle: u16) -> Option<&mut Bone> {
        self.bone_slot_mut(handle).filter(|b| !b.is_manually_controlled())
    }

    // ========================================================================
    // Animation state
    // ========================================================================

    /// Poses the skeleton from a set of animation states.
    ///
    /// Bones are reset to their initial state (manual bones excepted), then
    /// every enabled state is layered on in blend order. States naming an
    /// unknown animation are skipped.
    pub fn set_animation_state(&mut self, states: &AnimationStateSet) {
        self.reset(false);

        let library = Rc::clone(&self.animations);
        let weight_factor = match self.blend_mode {
            SkeletonAnimationBlendMode::Average => {
                let total: f32 = states
                    .enabled_animation_states()
                    .filter(|s| library.borrow().animation_impl(s.name()).is_some())
                    .map(|s| s.weight())
                    .sum();
                if total > 1.0 { 1.0 / total } else { 1.0 }
            }
            SkeletonAnimationBlendMode::Cumulative => 1.0,
        };

        for state in states.enabled_animation_states() {
            let resolved = library.borrow().animation_impl(state.name());
            let Some((animation, link_scale)) = resolved else {
                log::debug!("Skeleton '{}': no animation named '{}'", self.name, state.name());
                continue;
            };
            animation.borrow_mut().apply_to_skeleton(
                self,
                state.time_position(),
                state.weight() * weight_factor,
                state.blend_mask(),
                link_scale.unwrap_or(1.0),
            );
        }
    }

    /// Replaces the content of `states` with one disabled state per visible
    /// animation, linked ones included.
    pub fn init_animation_state(&self, states: &mut AnimationStateSet) {
        states.remove_all_animation_states();
        self.refresh_animation_state(states);
    }

    /// Adds states for animations `states` does not know yet and updates
    /// the length of the ones it does.
    pub fn refresh_animation_state(&self, states: &mut AnimationStateSet) {
        for (name, length) in self.animations.borrow().visible_animations() {
            let state = states.animation_state_or_insert(&name, length);
            state.set_length(length);
            let time_position = state.time_position().min(length);
            state.set_time_position(time_position);
        }
    }

    /// Optimises every own animation.
    ///
    /// Unless `preserving_identity_node_tracks` is set, node tracks whose
    /// bone is left at identity by every animation are destroyed first.
    pub fn optimise_all_animations(&mut self, preserving_identity_node_tracks: bool) {
        let library = self.animations.borrow();
        if !preserving_identity_node_tracks {
            let mut identity: BTreeSet<u16> = self.bones().map(Bone::handle).collect();
            for animation in library.animations() {
                animation.borrow().collect_identity_node_tracks(&mut identity);
            }
            log::debug!(
                "Skeleton '{}': discarding {} identity node tracks",
                self.name,
                identity.len()
            );
            for animation in library.animations() {
                animation.borrow_mut().destroy_node_tracks(&identity);
            }
        }
        for animation in library.animations() {
            animation.borrow_mut().optimise(false);
        }
    }

    // ========================================================================
    // Animations and linked sources
    // ========================================================================

    /// The animation library, shared with every instance of this skeleton.
    #[must_use]
    pub fn animation_library(&self) -> SharedAnimationLibrary {
        Rc::clone(&self.animations)
    }

    /// Resolves `name` locally and through linked sources. The second
    /// element is the link scale when the animation came through a link.
    #[must_use]
    pub fn animation_with_link(&self, name: &str) -> Option<(AnimationRef, Option<f32>)> {
        self.animations.borrow().animation_impl(name)
    }

    /// Makes the animations of `other` available on this skeleton.
    ///
    /// A second link to a skeleton of the same name is ignored; a link that
    /// would make the lookup graph cyclic fails with
    /// [`AnimationError::InvalidParameters`].
    pub fn add_linked_skeleton_animation_source(&mut self, other: &Skeleton, scale: f32) -> Result<()> {
        if self.animations.borrow().has_linked_source(&other.name) {
            log::debug!("Skeleton '{}' is already linked to '{}'", self.name, other.name);
            return Ok(());
        }
        self.check_link(&other.name, &other.animations)?;
        self.animations
            .borrow_mut()
            .add_linked_source(LinkedSkeletonAnimationSource::resolved(
                other.name.clone(),
                scale,
                Rc::clone(&other.animations),
            ));
        Ok(())
    }

    /// Registers a link by name only; see
    /// [`Skeleton::resolve_linked_skeleton_animation_sources`].
    pub fn add_unresolved_linked_skeleton_animation_source(&mut self, skeleton_name: &str, scale: f32) {
        let added = self
            .animations
            .borrow_mut()
            .add_linked_source(LinkedSkeletonAnimationSource::new(skeleton_name, scale));
        if !added {
            log::debug!("Skeleton '{}' is already linked to '{skeleton_name}'", self.name);
        }
    }

    /// Resolves every unresolved link through `resolver`. Links the resolver
    /// cannot satisfy stay unresolved.
    pub fn resolve_linked_skeleton_animation_sources<F>(&mut self, mut resolver: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<SharedAnimationLibrary>,
    {
        let pending: Vec<(usize, String)> = self
            .animations
            .borrow()
            .linked_sources()
            .iter()
            .enumerate()
            .filter(|(_, link)| !link.is_resolved())
            .map(|(i, link)| (i, link.skeleton_name().to_owned()))
            .collect();

        for (index, skeleton_name) in pending {
            let Some(library) = resolver(&skeleton_name) else {
                log::warn!(
                    "Skeleton '{}': linked skeleton '{skeleton_name}' could not be resolved",
                    self.name
                );
                continue;
            };
            self.check_link(&skeleton_name, &library)?;
            if let Some(link) = self.animations.borrow_mut().linked_sources_mut().get_mut(index) {
                link.set_library(library);
            }
        }
        Ok(())
    }

    fn check_link(&self, other_name: &str, other: &SharedAnimationLibrary) -> Result<()> {
        if Rc::ptr_eq(other, &self.animations) || other.borrow().reaches(&self.animations) {
            return Err(AnimationError::InvalidParameters(format!(
                "linking skeleton '{}' to '{other_name}' would create a cycle",
                self.name
            )));
        }
        Ok(())
    }

    pub fn remove_all_linked_skeleton_animation_sources(&mut self) {
        self.animations.borrow_mut().remove_all_linked_sources();
    }

    #[must_use]
    pub fn linked_skeleton_animation_sources(&self) -> Ref<'_, [LinkedSkeletonAnimationSource]> {
        Ref::map(self.animations.borrow(), AnimationLibrary::linked_sources)
    }
}

impl AnimationContainer for Skeleton {
    fn num_animations(&self) -> usize {
        self.animations.borrow().num_animations()
    }

    fn animation_at(&self, index: usize) -> Result<AnimationRef> {
        self.animations.borrow().animation_at(index)
    }

    fn animation(&self, name: &str) -> Result<AnimationRef> {
        self.animations.borrow().animation(name)
    }

    fn has_animation(&self, name: &str) -> bool {
        self.animations.borrow().has_animation(name)
    }

    fn create_animation(&mut self, name: &str, length: f32) -> Result<AnimationRef> {
        self.animations.borrow_mut().create_animation(name, length)
    }

    fn remove_animation(&mut self, name: &str) -> Result<()> {
        self.animations.borrow_mut().remove_animation(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_handles_follow_explicit_ones() {
        let mut skeleton = Skeleton::new("s");
        skeleton.create_bone_with_handle(4).unwrap();
        let bone = skeleton.create_bone().unwrap();
        assert_eq!(bone.handle(), 5);
        assert_eq!(bone.name(), "Unnamed_5");
        assert_eq!(skeleton.num_bones(), 6);
        assert_eq!(skeleton.bones().count(), 2);
    }

    #[test]
    fn handle_limit_and_duplicates_are_rejected() {
        let mut skeleton = Skeleton::new("s");
        assert!(matches!(
            skeleton.create_bone_with_handle(MAX_NUM_BONES),
            Err(AnimationError::InvalidParameters(_))
        ));
        skeleton.create_named_bone_with_handle("root", 0).unwrap();
        assert!(matches!(
            skeleton.create_bone_with_handle(0),
            Err(AnimationError::DuplicateItem(_))
        ));
        assert!(matches!(
            skeleton.create_named_bone("root"),
            Err(AnimationError::DuplicateItem(_))
        ));
    }

    #[test]
    fn add_child_rejects_cycles() {
        let mut skeleton = Skeleton::new("s");
        skeleton.create_bone().unwrap();
        skeleton.create_bone().unwrap();
        skeleton.add_child(0, 1).unwrap();
        assert_eq!(skeleton.root_bones(), [0]);
        assert!(skeleton.add_child(1, 0).is_err());
    }
}
