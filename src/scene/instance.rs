//! Per-entity skeleton copies.
//!
//! A [`SkeletonInstance`] owns its own bones (and therefore its own live
//! pose) but shares the master's animation library, so animations and
//! linked sources added through either side are visible to both.

use std::ops::{Deref, DerefMut};

use super::skeleton::Skeleton;

/// Working copy of a master [`Skeleton`].
#[derive(Debug)]
pub struct SkeletonInstance {
    skeleton: Skeleton,
}

impl SkeletonInstance {
    /// Copies the bone hierarchy and binding pose of `master`.
    ///
    /// Manual control flags are not copied.
    #[must_use]
    pub fn new(master: &Skeleton) -> Self {
        log::debug!("Instancing skeleton '{}'", master.name());
        Self {
            skeleton: Skeleton::from_master(master),
        }
    }

    /// Name of the master skeleton.
    #[must_use]
    pub fn master_name(&self) -> &str {
        self.skeleton.name()
    }

    #[must_use]
    pub fn into_inner(self) -> Skeleton {
        self.skeleton
    }
}

impl Deref for SkeletonInstance {
    type Target = Skeleton;

    fn deref(&self) -> &Skeleton {
        &self.skeleton
    }
}

impl DerefMut for SkeletonInstance {
    fn deref_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }
}
