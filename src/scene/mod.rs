//! Skeleton System
//!
//! Bone hierarchies and their live pose:
//! - Transform: local TRS, initial state and derived transform
//! - Bone: a node in the hierarchy
//! - Skeleton: bone hierarchy, animation blending, linked animation sources
//! - SkeletonInstance: per-entity copy sharing the master's animations
//! - merge: copying animations between skeletons

pub mod transform;
pub mod bone;
pub mod skeleton;
pub mod instance;
pub mod merge;

// Re-exports
pub use transform::{AnimableNode, NodeRef, Transform};
pub use bone::Bone;
pub use skeleton::{MAX_NUM_BONES, Skeleton, SkeletonAnimationBlendMode};
pub use instance::SkeletonInstance;
