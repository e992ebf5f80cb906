use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use super::clip::{Animation, AnimationRef};
use crate::errors::{AnimationError, Result};

pub type SharedAnimationLibrary = Rc<RefCell<AnimationLibrary>>;

/// Anything that owns a set of named animations.
///
/// Names are unique within one container. Lookups by name also see
/// animations reachable through linked sources, index access and removal
/// only cover the container's own animations.
pub trait AnimationContainer {
    fn num_animations(&self) -> usize;

    /// Own animation at `index`, in name order.
    fn animation_at(&self, index: usize) -> Result<AnimationRef>;

    fn animation(&self, name: &str) -> Result<AnimationRef>;

    fn has_animation(&self, name: &str) -> bool;

    fn create_animation(&mut self, name: &str, length: f32) -> Result<AnimationRef>;

    fn remove_animation(&mut self, name: &str) -> Result<()>;
}

// ============================================================================
// Linked sources
// ============================================================================

/// A read-only link to another skeleton's animations.
///
/// The link is identified by the other skeleton's name; `scale` multiplies
/// translation and scale contributions of every animation found through it.
#[derive(Debug, Clone)]
pub struct LinkedSkeletonAnimationSource {
    skeleton_name: String,
    scale: f32,
    library: Option<SharedAnimationLibrary>,
}

impl LinkedSkeletonAnimationSource {
    #[must_use]
    pub fn new(skeleton_name: impl Into<String>, scale: f32) -> Self {
        Self {
            skeleton_name: skeleton_name.into(),
            scale,
            library: None,
        }
    }

    #[must_use]
    pub fn resolved(skeleton_name: impl Into<String>, scale: f32, library: SharedAnimationLibrary) -> Self {
        Self {
            library: Some(library),
            ..Self::new(skeleton_name, scale)
        }
    }

    #[must_use]
    pub fn skeleton_name(&self) -> &str {
        &self.skeleton_name
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[must_use]
    pub fn library(&self) -> Option<&SharedAnimationLibrary> {
        self.library.as_ref()
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.library.is_some()
    }

    pub(crate) fn set_library(&mut self, library: SharedAnimationLibrary) {
        self.library = Some(library);
    }
}

// ============================================================================
// Library
// ============================================================================

/// Named animations plus the linked sources searched after them.
///
/// A master skeleton and all of its instances share one library, so
/// animations created through any of them are visible to all.
#[derive(Debug)]
pub struct AnimationLibrary {
    animations: BTreeMap<String, AnimationRef>,
    linked: Vec<LinkedSkeletonAnimationSource>,
    self_ref: Weak<RefCell<AnimationLibrary>>,
}

impl AnimationLibrary {
    #[must_use]
    pub fn new_shared() -> SharedAnimationLibrary {
        Rc::new_cyclic(|self_ref| {
            RefCell::new(Self {
                animations: BTreeMap::new(),
                linked: Vec::new(),
                self_ref: self_ref.clone(),
            })
        })
    }

    /// Looks `name` up locally, then through each linked source in
    /// registration order.
    ///
    /// The second element is the scale of the top-level link that supplied
    /// the animation, `None` when it is local.
    #[must_use]
    pub fn animation_impl(&self, name: &str) -> Option<(AnimationRef, Option<f32>)> {
        if let Some(animation) = self.animations.get(name) {
            return Some((Rc::clone(animation), None));
        }
        self.linked.iter().find_map(|link| {
            let library = link.library.as_ref()?;
            let (animation, _) = library.borrow().animation_impl(name)?;
            Some((animation, Some(link.scale)))
        })
    }

    /// Own animation named `name`, ignoring linked sources.
    #[must_use]
    pub fn local_animation(&self, name: &str) -> Option<AnimationRef> {
        self.animations.get(name).cloned()
    }

    #[must_use]
    pub fn has_local_animation(&self, name: &str) -> bool {
        self.animations.contains_key(name)
    }

    /// Takes ownership of a fully built animation.
    pub fn add_animation(&mut self, mut animation: Animation) -> Result<AnimationRef> {
        if self.animations.contains_key(animation.name()) {
            return Err(AnimationError::DuplicateItem(format!(
                "an animation with the name '{}' already exists",
                animation.name()
            )));
        }
        animation.set_container(self.self_ref.clone());
        let name = animation.name().to_owned();
        let animation = animation.into_ref();
        self.animations.insert(name, Rc::clone(&animation));
        Ok(animation)
    }

    /// Own animations in name order.
    pub fn animations(&self) -> impl Iterator<Item = &AnimationRef> {
        self.animations.values()
    }

    /// Name and length of every animation visible from this library, own
    /// animations first. Names shadowed by an earlier entry are skipped.
    #[must_use]
    pub fn visible_animations(&self) -> Vec<(String, f32)> {
        let mut out = Vec::new();
        self.collect_visible_animations(&mut out);
        out
    }

    fn collect_visible_animations(&self, out: &mut Vec<(String, f32)>) {
        for (name, animation) in &self.animations {
            if !out.iter().any(|(n, _)| n == name) {
                out.push((name.clone(), animation.borrow().length()));
            }
        }
        for library in self.linked.iter().filter_map(|l| l.library.as_ref()) {
            library.borrow().collect_visible_animations(out);
        }
    }

    // ========================================================================
    // Links
    // ========================================================================

    #[must_use]
    pub fn linked_sources(&self) -> &[LinkedSkeletonAnimationSource] {
        &self.linked
    }

    pub(crate) fn linked_sources_mut(&mut self) -> &mut [LinkedSkeletonAnimationSource] {
        &mut self.linked
    }

    #[must_use]
    pub fn has_linked_source(&self, skeleton_name: &str) -> bool {
        self.linked.iter().any(|l| l.skeleton_name == skeleton_name)
    }

    /// Appends `source` unless a link with the same skeleton name exists.
    /// Returns whether it was added.
    pub fn add_linked_source(&mut self, source: LinkedSkeletonAnimationSource) -> bool {
        if self.has_linked_source(&source.skeleton_name) {
            return false;
        }
        self.linked.push(source);
        true
    }

    pub fn remove_all_linked_sources(&mut self) {
        self.linked.clear();
    }

    /// Whether `target` is reachable by following resolved links.
    #[must_use]
    pub fn reaches(&self, target: &SharedAnimationLibrary) -> bool {
        self.linked.iter().filter_map(|l| l.library.as_ref()).any(|library| {
            Rc::ptr_eq(library, target) || library.borrow().reaches(target)
        })
    }
}

impl AnimationContainer for AnimationLibrary {
    fn num_animations(&self) -> usize {
        self.animations.len()
    }

    fn animation_at(&self, index: usize) -> Result<AnimationRef> {
        self.animations
            .values()
            .nth(index)
            .cloned()
            .ok_or_else(|| AnimationError::ItemNotFound(format!("animation index {index} out of bounds")))
    }

    fn animation(&self, name: &str) -> Result<AnimationRef> {
        self.animation_impl(name)
            .map(|(animation, _)| animation)
            .ok_or_else(|| AnimationError::ItemNotFound(format!("no animation entry found named '{name}'")))
    }

    fn has_animation(&self, name: &str) -> bool {
        self.animation_impl(name).is_some()
    }

    fn create_animation(&mut self, name: &str, length: f32) -> Result<AnimationRef> {
        let animation = self.add_animation(Animation::new(name, length))?;
        log::debug!("Created animation '{name}' ({length}s)");
        Ok(animation)
    }

    fn remove_animation(&mut self, name: &str) -> Result<()> {
        self.animations
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AnimationError::ItemNotFound(format!("no animation entry found named '{name}'")))
    }
}
