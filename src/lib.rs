#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod settings;
pub mod vertex;
pub mod animation;
pub mod scene;

pub use errors::{AnimationError, Result};
pub use settings::{AnimationSettings, InterpolationMode, RotationInterpolationMode};
pub use vertex::{AnimatedMesh, AnimatedVertexSet, Pose, VertexBuffer, VertexData};
pub use animation::{
    Animation, AnimationContainer, AnimationRef, AnimationState, AnimationStateSet, AnimationTrack,
    NodeAnimationTrack, NumericAnimationTrack, VertexAnimationTrack,
};
pub use scene::{Bone, Skeleton, SkeletonAnimationBlendMode, SkeletonInstance, Transform};
