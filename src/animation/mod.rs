pub mod values;
pub mod spline;
pub mod keyframe;
pub mod tracks;
pub mod clip;
pub mod container;
pub mod state;

pub use clip::{Animation, AnimationRef};
pub use container::{AnimationContainer, AnimationLibrary, LinkedSkeletonAnimationSource, SharedAnimationLibrary};
pub use keyframe::{
    KeyFrame, NumericKeyFrame, PoseRef, TransformKeyFrame, VertexKeyFrame, VertexMorphKeyFrame, VertexPoseKeyFrame,
};
pub use spline::{RotationalSpline, SimpleSpline};
pub use state::{AnimationState, AnimationStateSet};
pub use tracks::{
    AnimableValueRef, AnimationTrack, KeyFramePair, KeyFrameTrack, NodeAnimationTrack, NumericAnimationTrack,
    TimeIndex, TrackContext, TrackListener, VertexAnimationTrack, VertexAnimationType, VertexTargetMode,
};
pub use values::{AnimableValue, Interpolatable, NumericValue};
