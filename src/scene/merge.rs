//! Copying animations between skeletons with compatible hierarchies.
//!
//! Keyframes of node tracks are authored relative to the binding pose of the
//! skeleton they were made for. When the destination bone has a different
//! binding pose, every copied keyframe is corrected by the delta between the
//! two so that the derived transform matches what the source produced.

use std::collections::BTreeSet;

use glam::{Quat, Vec3};

use super::bone::Bone;
use super::skeleton::{MAX_NUM_BONES, Skeleton};
use crate::animation::values::rotation_angle;
use crate::animation::{Animation, AnimationRef, AnimationTrack, KeyFrame};
use crate::errors::{AnimationError, Result};

const DELTA_TOLERANCE: f32 = 1e-3;

/// Binding pose difference between a source bone and its destination.
#[derive(Debug, Clone, Copy)]
struct DeltaTransform {
    translate: Vec3,
    rotate: Quat,
    scale: Vec3,
    is_identity: bool,
}

impl DeltaTransform {
    const IDENTITY: Self = Self {
        translate: Vec3::ZERO,
        rotate: Quat::IDENTITY,
        scale: Vec3::ONE,
        is_identity: true,
    };

    fn between(src: &Bone, dst: &Bone) -> Self {
        let translate = src.initial_position() - dst.initial_position();
        let rotate = dst.initial_orientation().inverse() * src.initial_orientation();
        let scale = src.initial_scale() / dst.initial_scale();
        let is_identity = translate.abs_diff_eq(Vec3::ZERO, DELTA_TOLERANCE)
            && scale.abs_diff_eq(Vec3::ONE, DELTA_TOLERANCE)
            && rotation_angle(rotate).abs() <= DELTA_TOLERANCE;
        Self {
            translate,
            rotate,
            scale,
            is_identity,
        }
    }
}

impl Skeleton {
    /// Copies animations from `src` into this skeleton.
    ///
    /// `bone_handle_map[h]` is the destination handle of source bone `h`.
    /// Source bones mapped to a handle this skeleton lacks are created from
    /// the source binding pose and the binding pose is recaptured. With an
    /// empty `animation_names` every own animation of `src` is copied.
    ///
    /// Everything is validated before this skeleton is touched: the map
    /// size, the parent of every bone the two skeletons share, the presence
    /// of the requested animations as own animations of `src`, and the
    /// absence of their names here.
    pub fn merge_skeleton_animations(
        &mut self,
        src: &Skeleton,
        bone_handle_map: &[u16],
        animation_names: &[&str],
    ) -> Result<()> {
        let num_src_bones = src.num_bones();
        if bone_handle_map.len() != num_src_bones {
            return Err(AnimationError::InvalidParameters(format!(
                "bone handle map has {} entries, source skeleton '{}' has {num_src_bones} bones",
                bone_handle_map.len(),
                src.name()
            )));
        }

        // === Validation ===

        let existed: Vec<bool> = bone_handle_map.iter().map(|&h| self.has_bone(h)).collect();
        let mut seen = BTreeSet::new();
        for (src_handle, &dst_handle) in bone_handle_map.iter().enumerate() {
            let Some(src_bone) = src.bones[src_handle].as_ref() else {
                continue;
            };
            if !seen.insert(dst_handle) {
                return Err(AnimationError::InvalidParameters(format!(
                    "bone handle map sends two source bones to handle {dst_handle}"
                )));
            }

            if existed[src_handle] {
                let dst_bone = self.bone(dst_handle)?;
                let mapped_parent = src_bone.parent().map(|p| bone_handle_map[usize::from(p)]);
                if mapped_parent != dst_bone.parent() {
                    return Err(AnimationError::InvalidParameters(format!(
                        "source skeleton '{}' is incompatible with '{}': different hierarchy between bone '{}' and '{}'",
                        src.name(),
                        self.name(),
                        src_bone.name(),
                        dst_bone.name()
                    )));
                }
            } else {
                if dst_handle >= MAX_NUM_BONES {
                    return Err(AnimationError::InvalidParameters(format!(
                        "bone handle map sends bone '{}' to invalid handle {dst_handle}",
                        src_bone.name()
                    )));
                }
                if self.has_bone_named(src_bone.name()) {
                    return Err(AnimationError::DuplicateItem(format!(
                        "a bone with the name '{}' already exists",
                        src_bone.name()
                    )));
                }
            }
        }

        let src_library = src.animation_library();
        let src_animations: Vec<AnimationRef> = if animation_names.is_empty() {
            src_library.borrow().animations().cloned().collect()
        } else {
            animation_names
                .iter()
                .map(|&name| match src.animation_with_link(name) {
                    Some((animation, None)) => Ok(animation),
                    _ => Err(AnimationError::ItemNotFound(format!(
                        "no animation entry found named '{name}'"
                    ))),
                })
                .collect::<Result<_>>()?
        };

        let dst_library = self.animation_library();
        for animation in &src_animations {
            let animation = animation.borrow();
            if dst_library.borrow().has_local_animation(animation.name()) {
                return Err(AnimationError::DuplicateItem(format!(
                    "an animation with the name '{}' already exists",
                    animation.name()
                )));
            }
        }

        // === Missing bones ===

        let missing: Vec<(usize, &Bone)> = src
            .bones
            .iter()
            .enumerate()
            .filter_map(|(h, bone)| bone.as_ref().map(|b| (h, b)))
            .filter(|&(h, _)| !existed[h])
            .collect();
        if !missing.is_empty() {
            for &(src_handle, src_bone) in &missing {
                let bone = self.create_named_bone_with_handle(src_bone.name(), bone_handle_map[src_handle])?;
                bone.set_position(src_bone.initial_position());
                bone.set_orientation(src_bone.initial_orientation());
                bone.set_scale(src_bone.initial_scale());
                bone.set_initial_state();
            }
            for &(src_handle, src_bone) in &missing {
                if let Some(parent) = src_bone.parent() {
                    self.add_child(bone_handle_map[usize::from(parent)], bone_handle_map[src_handle])?;
                }
            }
            self.reset(true);
            self.set_binding_pose();
            log::info!(
                "Skeleton '{}': created {} bones from '{}'",
                self.name(),
                missing.len(),
                src.name()
            );
        }

        // === Deltas ===

        let deltas: Vec<DeltaTransform> = (0..num_src_bones)
            .map(|h| match src.bones[h].as_ref() {
                Some(src_bone) if existed[h] => self
                    .bone(bone_handle_map[h])
                    .map_or(DeltaTransform::IDENTITY, |dst_bone| DeltaTransform::between(src_bone, dst_bone)),
                _ => DeltaTransform::IDENTITY,
            })
            .collect();

        // === Animations ===

        for src_animation in &src_animations {
            let src_animation = src_animation.borrow();
            let mut dst_animation = Animation::new(src_animation.name(), src_animation.length());
            dst_animation.set_interpolation_mode(src_animation.interpolation_mode());
            dst_animation.set_rotation_interpolation_mode(src_animation.rotation_interpolation_mode());
            let length = dst_animation.length();

            for ((src_handle, &dst_handle), delta) in (0u16..).zip(bone_handle_map).zip(&deltas) {
                if let Ok(src_track) = src_animation.node_track(src_handle) {
                    let dst_track = dst_animation.create_node_track(dst_handle)?;
                    dst_track.set_use_shortest_rotation_path(src_track.use_shortest_rotation_path());
                    for src_key in src_track.key_frames() {
                        let dst_key = dst_track.create_key_frame(src_key.time());
                        if delta.is_identity {
                            dst_key.copy_pose_from(src_key);
                        } else {
                            dst_key.translate = delta.translate + src_key.translate;
                            dst_key.rotation = delta.rotate * src_key.rotation;
                            dst_key.scale = delta.scale * src_key.scale;
                        }
                    }
                } else if !delta.is_identity {
                    // Static correction for a bone the source never animates
                    let dst_track = dst_animation.create_node_track(dst_handle)?;
                    for time in [0.0, length] {
                        let dst_key = dst_track.create_key_frame(time);
                        dst_key.translate = delta.translate;
                        dst_key.rotation = delta.rotate;
                        dst_key.scale = delta.scale;
                    }
                }
            }

            log::info!(
                "Skeleton '{}': merged animation '{}' from '{}'",
                self.name(),
                src_animation.name(),
                src.name()
            );
            dst_library.borrow_mut().add_animation(dst_animation)?;
        }
        Ok(())
    }

    /// Maps every bone of `src` to the same handle here.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn build_map_bone_by_handle(&self, src: &Skeleton) -> Vec<u16> {
        (0..src.num_bones())
            .map(|h| u16::try_from(h).unwrap_or(u16::MAX))
            .collect()
    }

    /// Maps every bone of `src` to the bone with the same name here. Bones
    /// without a match get fresh handles after the current ones.
    #[must_use]
    pub fn build_map_bone_by_name(&self, src: &Skeleton) -> Vec<u16> {
        let mut next_handle = u16::try_from(self.num_bones()).unwrap_or(u16::MAX);
        src.bones
            .iter()
            .map(|slot| {
                match slot.as_ref().and_then(|bone| self.bone_handle(bone.name()).ok()) {
                    Some(handle) => handle,
                    None => {
                        let handle = next_handle;
                        next_handle = next_handle.saturating_add(1);
                        handle
                    }
                }
            })
            .collect()
    }
}
