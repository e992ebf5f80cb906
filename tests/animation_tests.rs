//! Animation System Tests
//!
//! Tests for:
//! - Keyframe pair lookup, wrapping and the time-index generation fallback
//! - Node track interpolation (linear, spline) and listener overrides
//! - Base keyframe rebasing
//! - Animation cloning and optimisation
//! - Numeric and vertex (morph / pose, software / hardware) tracks

use std::cell::RefCell;
use std::f32::consts::FRAC_PI_2;
use std::rc::Rc;

use glam::{Quat, Vec3};

use sinew::animation::keyframe::{KeyFrame, TransformKeyFrame};
use sinew::animation::tracks::{
    AnimationTrack, NodeAnimationTrack, TimeIndex, TrackListener, VertexAnimationType, VertexTargetMode,
};
use sinew::animation::values::{AnimableValue, NumericValue};
use sinew::animation::{AnimationContainer, AnimationLibrary};
use sinew::errors::AnimationError;
use sinew::scene::Transform;
use sinew::settings::{AnimationSettings, InterpolationMode, RotationInterpolationMode};
use sinew::vertex::{AnimatedMesh, AnimatedVertexSet, HardwareSource, Pose, VertexBuffer, VertexData};
use sinew::Animation;

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn approx_vec3(a: Vec3, b: Vec3) -> bool {
    a.abs_diff_eq(b, EPSILON)
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn linear_settings() -> AnimationSettings {
    AnimationSettings {
        default_interpolation_mode: InterpolationMode::Linear,
        default_rotation_interpolation_mode: RotationInterpolationMode::Linear,
    }
}

/// Node track 0 with keyframes at `times`, translating by `(time, 0, 0)`.
fn ramp_animation(name: &str, length: f32, times: &[f32]) -> Animation {
    let mut animation = Animation::with_settings(name, length, &linear_settings());
    let track = animation.create_node_track(0).unwrap();
    for &time in times {
        track.create_key_frame(time).translate = Vec3::new(time, 0.0, 0.0);
    }
    animation
}

// ============================================================================
// Keyframe pair lookup
// ============================================================================

#[test]
fn pair_lookup_between_keyframes() {
    let mut animation = ramp_animation("ramp", 4.0, &[0.0, 1.0, 2.0]);
    let index = animation.time_index(1.5);
    let track = animation.node_track(0).unwrap();

    let pair = track.key_frames_at_time(4.0, &index).unwrap();
    assert_eq!(pair.first.time(), 1.0);
    assert_eq!(pair.second.time(), 2.0);
    assert!(approx(pair.t, 0.5));
}

#[test]
fn pair_lookup_wraps_past_last_keyframe() {
    let mut animation = ramp_animation("ramp", 4.0, &[0.0, 1.0, 2.0]);
    let index = animation.time_index(2.5);
    let track = animation.node_track(0).unwrap();

    // Second keyframe is the first one, placed at length + 0
    let pair = track.key_frames_at_time(4.0, &index).unwrap();
    assert_eq!(pair.first.time(), 2.0);
    assert_eq!(pair.second.time(), 0.0);
    assert!(approx(pair.t, 0.25));
}

#[test]
fn exact_multiple_of_length_wraps_to_start() {
    let mut animation = ramp_animation("ramp", 2.0, &[0.0, 1.0, 2.0]);
    let index = animation.time_index(4.0);
    assert_eq!(index.time_pos(), 0.0);

    let track = animation.node_track(0).unwrap();
    let pair = track.key_frames_at_time(2.0, &TimeIndex::new(4.0)).unwrap();
    assert_eq!(pair.first.time(), 0.0);
    assert_eq!(pair.t, 0.0);

    let mut node = Transform::new();
    animation.apply_to_node(&mut node, 4.0, 1.0, 1.0);
    assert!(approx_vec3(node.position, Vec3::ZERO));

    // The end of the animation itself is not wrapped
    assert_eq!(animation.time_index(2.0).time_pos(), 2.0);
}

#[test]
fn pair_lookup_exact_hit_pairs_with_successor() {
    let mut animation = ramp_animation("ramp", 4.0, &[0.0, 1.0, 2.0]);
    let index = animation.time_index(1.0);
    let track = animation.node_track(0).unwrap();

    let pair = track.key_frames_at_time(4.0, &index).unwrap();
    assert_eq!(pair.first.time(), 1.0);
    assert_eq!(pair.second.time(), 2.0);
    assert_eq!(pair.t, 0.0);
}

#[test]
fn pair_lookup_without_key_index_matches_indexed_lookup() {
    let mut animation = ramp_animation("ramp", 4.0, &[0.0, 1.0, 2.0]);
    for time in [0.0, 0.25, 1.0, 1.75, 2.0, 3.5, 5.5] {
        let indexed = animation.time_index(time);
        let track = animation.node_track(0).unwrap();
        let a = track.key_frames_at_time(4.0, &indexed).unwrap();
        let b = track.key_frames_at_time(4.0, &TimeIndex::new(time)).unwrap();
        assert_eq!(a.first_index, b.first_index, "time {time}");
        assert!(approx(a.t, b.t), "time {time}: {} vs {}", a.t, b.t);
    }
}

#[test]
fn empty_track_has_no_pair() {
    let track = NodeAnimationTrack::new(3);
    assert!(track.key_frames_at_time(1.0, &TimeIndex::new(0.5)).is_none());
}

#[test]
fn keyframes_stay_sorted_on_insert() {
    let mut track = NodeAnimationTrack::new(0);
    for time in [2.0, 0.0, 1.0, 0.5] {
        track.create_key_frame(time);
    }
    let times: Vec<f32> = track.key_frames().iter().map(KeyFrame::time).collect();
    assert_eq!(times, [0.0, 0.5, 1.0, 2.0]);
}

#[test]
fn global_time_list_is_sorted_union() {
    let mut animation = ramp_animation("ramp", 4.0, &[0.0, 2.0]);
    animation.create_numeric_track(1).unwrap().create_key_frame(1.0);
    animation.create_numeric_track(2).unwrap().create_key_frame(2.0);
    assert_eq!(animation.key_frame_times(), [0.0, 1.0, 2.0]);
}

// ============================================================================
// Time index generation
// ============================================================================

#[test]
fn stale_time_index_falls_back_to_search() {
    let mut animation = ramp_animation("ramp", 4.0, &[0.0, 2.0]);
    let stale = animation.time_index(1.5);

    animation
        .node_track_mut(0)
        .unwrap()
        .create_key_frame(1.0)
        .translate = Vec3::new(10.0, 0.0, 0.0);

    let track = animation.node_track(0).unwrap();
    let pair = track.key_frames_at_time(4.0, &stale).unwrap();
    assert_eq!(pair.first.time(), 1.0);
    assert_eq!(pair.second.time(), 2.0);
    assert!(approx(pair.t, 0.5));
}

#[test]
fn time_index_from_another_animation_is_not_trusted() {
    let mut dense = ramp_animation("dense", 4.0, &[0.0, 0.5, 1.0, 1.5, 2.0]);
    let mut sparse = ramp_animation("sparse", 4.0, &[0.0, 2.0]);
    sparse.time_index(0.0);

    let foreign = dense.time_index(1.75);
    assert_ne!(foreign.generation(), sparse.time_index(1.75).generation());

    let track = sparse.node_track(0).unwrap();
    let pair = track.key_frames_at_time(4.0, &foreign).unwrap();
    assert_eq!(pair.first.time(), 0.0);
    assert!(approx(pair.t, 0.875));
}

// ============================================================================
// Node track interpolation
// ============================================================================

#[test]
fn linear_interpolation_of_all_channels() {
    let mut animation = Animation::with_settings("turn", 1.0, &linear_settings());
    let track = animation.create_node_track(0).unwrap();
    let k0 = track.create_key_frame(0.0);
    k0.scale = Vec3::ONE;
    let k1 = track.create_key_frame(1.0);
    k1.translate = Vec3::new(2.0, 4.0, 0.0);
    k1.rotation = Quat::from_rotation_y(FRAC_PI_2);
    k1.scale = Vec3::splat(3.0);

    let index = animation.time_index(0.5);
    let ctx = animation.track_context();
    let kf = animation.node_track(0).unwrap().interpolated_key_frame(&ctx, &index);

    assert!(approx_vec3(kf.translate, Vec3::new(1.0, 2.0, 0.0)));
    assert!(approx_vec3(kf.scale, Vec3::splat(2.0)));
    let expected = Quat::from_rotation_y(FRAC_PI_2 * 0.5);
    assert!(kf.rotation.abs_diff_eq(expected, 1e-3), "{:?}", kf.rotation);
}

#[test]
fn exact_keyframe_hit_returns_keyframe_values() {
    let mut animation = ramp_animation("ramp", 4.0, &[0.0, 1.0, 2.0]);
    let index = animation.time_index(1.0);
    let ctx = animation.track_context();
    let kf = animation.node_track(0).unwrap().interpolated_key_frame(&ctx, &index);
    assert!(approx_vec3(kf.translate, Vec3::new(1.0, 0.0, 0.0)));
}

#[test]
fn spline_interpolation_passes_through_collinear_points() {
    let mut animation = ramp_animation("spline", 4.0, &[0.0, 1.0, 2.0, 3.0]);
    animation.set_interpolation_mode(InterpolationMode::Spline);
    animation.set_rotation_interpolation_mode(RotationInterpolationMode::Spherical);

    let ctx = animation.track_context();
    for (time, expected) in [(1.0, 1.0), (1.5, 1.5), (2.0, 2.0)] {
        let index = animation.time_index(time);
        let kf = animation.node_track(0).unwrap().interpolated_key_frame(&ctx, &index);
        assert!(approx(kf.translate.x, expected), "t={time}: {}", kf.translate.x);
        assert!(kf.rotation.abs_diff_eq(Quat::IDENTITY, 1e-3));
        assert!(approx_vec3(kf.scale, Vec3::ONE));
    }
}

struct FixedPose(Vec3);

impl TrackListener<TransformKeyFrame> for FixedPose {
    fn interpolated_key_frame(&self, _track_handle: u16, _time_index: &TimeIndex, out: &mut TransformKeyFrame) -> bool {
        out.translate = self.0;
        true
    }
}

#[test]
fn listener_overrides_interpolation() {
    let mut animation = ramp_animation("ramp", 4.0, &[0.0, 2.0]);
    animation
        .node_track_mut(0)
        .unwrap()
        .set_listener(Some(Rc::new(FixedPose(Vec3::new(7.0, 0.0, 0.0)))));

    let index = animation.time_index(1.0);
    let ctx = animation.track_context();
    let kf = animation.node_track(0).unwrap().interpolated_key_frame(&ctx, &index);
    assert!(approx_vec3(kf.translate, Vec3::new(7.0, 0.0, 0.0)));
}

#[test]
fn apply_drives_associated_node() {
    let node = Transform::from_trs(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, Vec3::ONE).into_ref();
    let mut animation = ramp_animation("ramp", 4.0, &[0.0, 2.0]);
    animation.node_track_mut(0).unwrap().set_associated_node(&node);

    animation.apply(1.0, 0.5, 1.0);
    assert!(approx_vec3(node.borrow().position, Vec3::new(0.5, 1.0, 0.0)));

    animation.node_track(0).unwrap().reset_associated_node();
    assert!(approx_vec3(node.borrow().position, Vec3::new(0.0, 1.0, 0.0)));
}

#[test]
fn apply_scale_only_affects_translation_and_scale() {
    let mut animation = Animation::with_settings("grow", 1.0, &linear_settings());
    let track = animation.create_node_track(0).unwrap();
    let k0 = track.create_key_frame(0.0);
    k0.translate = Vec3::X;
    k0.scale = Vec3::splat(3.0);

    let mut node = Transform::new();
    animation.apply_to_node(&mut node, 0.0, 1.0, 0.5);
    assert!(approx_vec3(node.position, Vec3::new(0.5, 0.0, 0.0)));
    assert!(approx_vec3(node.scale, Vec3::splat(2.0)));
}

// ============================================================================
// Base keyframe rebasing
// ============================================================================

#[test]
fn base_key_frame_rebase_happens_once() {
    init_logger();
    let mut animation = Animation::with_settings("additive", 2.0, &linear_settings());
    let track = animation.create_node_track(0).unwrap();
    track.create_key_frame(0.0).translate = Vec3::new(1.0, 0.0, 0.0);
    track.create_key_frame(2.0).translate = Vec3::new(3.0, 0.0, 0.0);

    animation.set_use_base_key_frame(true, 0.0, "");

    let mut first = Transform::new();
    animation.apply_to_node(&mut first, 1.0, 1.0, 1.0);
    assert!(!animation.use_base_key_frame());
    let after_first: Vec<Vec3> = animation.node_track(0).unwrap().key_frames().iter().map(|k| k.translate).collect();

    let mut second = Transform::new();
    animation.apply_to_node(&mut second, 1.0, 1.0, 1.0);
    let after_second: Vec<Vec3> = animation.node_track(0).unwrap().key_frames().iter().map(|k| k.translate).collect();

    assert_eq!(after_first, [Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)]);
    assert_eq!(after_first, after_second);
    assert!(approx_vec3(first.position, second.position));
    assert!(approx_vec3(first.position, Vec3::new(1.0, 0.0, 0.0)));
}

#[test]
fn base_key_frame_rebases_rotation_scale_and_pose_influence() {
    let mut animation = Animation::with_settings("layer", 2.0, &linear_settings());
    let track = animation.create_node_track(0).unwrap();
    let k0 = track.create_key_frame(0.0);
    k0.rotation = Quat::from_rotation_y(0.5);
    k0.scale = Vec3::splat(2.0);
    let k1 = track.create_key_frame(2.0);
    k1.rotation = Quat::from_rotation_y(1.0);
    k1.scale = Vec3::splat(4.0);

    let poses = animation.create_vertex_track(1, VertexAnimationType::Pose).unwrap();
    poses.create_vertex_pose_key_frame(0.0).unwrap().add_pose_reference(0, 0.25);
    poses.create_vertex_pose_key_frame(2.0).unwrap().add_pose_reference(0, 1.0);

    animation.set_use_base_key_frame(true, 0.0, "");
    let mut node = Transform::new();
    animation.apply_to_node(&mut node, 0.0, 1.0, 1.0);

    let keys = animation.node_track(0).unwrap().key_frames();
    assert!(keys[0].rotation.abs_diff_eq(Quat::IDENTITY, EPSILON));
    assert!(approx_vec3(keys[0].scale, Vec3::ONE));
    assert!(keys[1].rotation.abs_diff_eq(Quat::from_rotation_y(0.5), EPSILON));
    assert!(approx_vec3(keys[1].scale, Vec3::splat(2.0)));

    let poses = animation.vertex_track(1).unwrap();
    assert!(approx(poses.vertex_pose_key_frame(0).unwrap().influence_of(0).unwrap(), 0.0));
    assert!(approx(poses.vertex_pose_key_frame(1).unwrap().influence_of(0).unwrap(), 0.75));
}

#[test]
fn base_key_frame_from_another_animation() {
    let library = AnimationLibrary::new_shared();
    let base = library.borrow_mut().create_animation("base", 1.0).unwrap();
    base.borrow_mut()
        .create_node_track(0)
        .unwrap()
        .create_key_frame(0.0)
        .translate = Vec3::new(0.0, 2.0, 0.0);

    let layer = library.borrow_mut().create_animation("layer", 1.0).unwrap();
    layer
        .borrow_mut()
        .create_node_track(0)
        .unwrap()
        .create_key_frame(0.0)
        .translate = Vec3::new(1.0, 2.0, 0.0);
    layer.borrow_mut().set_use_base_key_frame(true, 0.0, "base");

    let mut node = Transform::new();
    layer.borrow_mut().apply_to_node(&mut node, 0.0, 1.0, 1.0);
    assert!(approx_vec3(node.position, Vec3::new(1.0, 0.0, 0.0)));
}

#[test]
fn missing_base_animation_leaves_keyframes_alone() {
    init_logger();
    let library = AnimationLibrary::new_shared();
    let layer = library.borrow_mut().create_animation("layer", 1.0).unwrap();
    layer
        .borrow_mut()
        .create_node_track(0)
        .unwrap()
        .create_key_frame(0.0)
        .translate = Vec3::X;
    layer.borrow_mut().set_use_base_key_frame(true, 0.0, "nowhere");

    let mut node = Transform::new();
    layer.borrow_mut().apply_to_node(&mut node, 0.0, 1.0, 1.0);
    assert!(!layer.borrow().use_base_key_frame());
    assert!(approx_vec3(node.position, Vec3::X));
}

// ============================================================================
// Cloning
// ============================================================================

#[test]
fn clone_copies_every_track_kind() {
    let mut animation = ramp_animation("walk", 3.0, &[0.0, 1.5, 3.0]);
    animation.set_interpolation_mode(InterpolationMode::Spline);
    animation.set_rotation_interpolation_mode(RotationInterpolationMode::Spherical);
    animation.create_numeric_track(4).unwrap().create_key_frame(1.0).value = NumericValue::Real(2.5);
    let pose_track = animation.create_vertex_track(1, VertexAnimationType::Pose).unwrap();
    pose_track.create_vertex_pose_key_frame(0.5).unwrap().add_pose_reference(2, 0.75);

    let copy = animation.clone_animation("walk_copy");
    assert_eq!(copy.name(), "walk_copy");
    assert_eq!(copy.length(), animation.length());
    assert_eq!(copy.interpolation_mode(), InterpolationMode::Spline);
    assert_eq!(copy.rotation_interpolation_mode(), RotationInterpolationMode::Spherical);

    assert_eq!(
        copy.node_track(0).unwrap().key_frames(),
        animation.node_track(0).unwrap().key_frames()
    );
    assert_eq!(
        copy.numeric_track(4).unwrap().key_frames(),
        animation.numeric_track(4).unwrap().key_frames()
    );
    let pose = copy.vertex_track(1).unwrap().vertex_pose_key_frame(0).unwrap();
    assert_eq!(pose.time(), 0.5);
    assert_eq!(pose.influence_of(2), Some(0.75));
}

// ============================================================================
// Optimisation
// ============================================================================

#[test]
fn optimise_keeps_run_boundaries() {
    let mut track = NodeAnimationTrack::new(0);
    for i in 0..8 {
        let kf = track.create_key_frame(i as f32);
        kf.translate = if i < 7 { Vec3::X } else { Vec3::new(2.0, 0.0, 0.0) };
    }
    track.optimise();

    let times: Vec<f32> = track.key_frames().iter().map(KeyFrame::time).collect();
    assert_eq!(times, [0.0, 1.0, 5.0, 6.0, 7.0]);
}

#[test]
fn optimise_leaves_short_runs() {
    let mut track = NodeAnimationTrack::new(0);
    for i in 0..4 {
        track.create_key_frame(i as f32).translate = Vec3::Y;
    }
    track.optimise();
    assert_eq!(track.num_key_frames(), 4);
}

#[test]
fn animation_optimise_discards_identity_tracks_on_request() {
    let mut animation = ramp_animation("mixed", 1.0, &[0.0, 1.0]);
    let idle = animation.create_node_track(5).unwrap();
    idle.create_key_frame(0.0);
    idle.create_key_frame(1.0);
    animation.create_vertex_track(2, VertexAnimationType::Pose).unwrap();

    animation.optimise(false);
    assert!(animation.has_node_track(5));
    assert!(!animation.has_vertex_track(2));

    animation.optimise(true);
    assert!(!animation.has_node_track(5));
    assert!(animation.has_node_track(0));
}

// ============================================================================
// Track management errors
// ============================================================================

#[test]
fn duplicate_and_missing_tracks_are_reported() {
    let mut animation = ramp_animation("ramp", 1.0, &[0.0]);
    assert!(matches!(
        animation.create_node_track(0),
        Err(AnimationError::DuplicateItem(_))
    ));
    assert!(matches!(
        animation.destroy_numeric_track(9),
        Err(AnimationError::ItemNotFound(_))
    ));
    assert!(matches!(
        animation.node_track(0).unwrap().key_frame(4),
        Err(AnimationError::ItemNotFound(_))
    ));
}

// ============================================================================
// Numeric tracks
// ============================================================================

#[derive(Debug, Default)]
struct Brightness(f32);

impl AnimableValue for Brightness {
    fn apply_delta_value(&mut self, delta: &NumericValue) {
        if let NumericValue::Real(d) = delta {
            self.0 += d;
        }
    }

    fn set_value(&mut self, value: &NumericValue) {
        if let NumericValue::Real(v) = value {
            self.0 = *v;
        }
    }
}

#[test]
fn numeric_track_adds_weighted_value() {
    let mut animation = Animation::with_settings("fade", 2.0, &linear_settings());
    let track = animation.create_numeric_track(0).unwrap();
    track.create_key_frame(0.0).value = NumericValue::Real(0.0);
    track.create_key_frame(2.0).value = NumericValue::Real(4.0);

    let mut value = Brightness(1.0);
    animation.apply_to_animable(&mut value, 1.0, 0.5, 1.0);
    assert!(approx(value.0, 2.0));

    let shared: Rc<RefCell<Brightness>> = Rc::new(RefCell::new(Brightness(0.0)));
    let dyn_shared: sinew::animation::AnimableValueRef = shared.clone();
    animation.numeric_track_mut(0).unwrap().set_associated_animable(&dyn_shared);
    animation.apply(2.0, 1.0, 1.0);
    assert!(approx(shared.borrow().0, 4.0));
}

// ============================================================================
// Vertex tracks
// ============================================================================

fn quad(offset: f32) -> Rc<VertexBuffer> {
    Rc::new(VertexBuffer::from_positions(vec![
        Vec3::new(offset, 0.0, 0.0),
        Vec3::new(offset, 1.0, 0.0),
    ]))
}

#[test]
fn pose_keyframes_reject_morph_operations() {
    let mut animation = Animation::new("faces", 1.0);
    let track = animation.create_vertex_track(1, VertexAnimationType::Pose).unwrap();
    assert!(matches!(
        track.create_vertex_morph_key_frame(0.0),
        Err(AnimationError::InvalidParameters(_))
    ));
    track.create_vertex_pose_key_frame(0.0).unwrap();
    assert!(matches!(
        track.vertex_morph_key_frame(0),
        Err(AnimationError::InvalidParameters(_))
    ));
}

#[test]
fn software_morph_blends_positions() {
    let mut animation = Animation::new("morph", 1.0);
    let track = animation.create_vertex_track(0, VertexAnimationType::Morph).unwrap();
    track.create_vertex_morph_key_frame(0.0).unwrap().set_vertex_buffer(quad(0.0));
    track.create_vertex_morph_key_frame(1.0).unwrap().set_vertex_buffer(quad(2.0));

    let mut data = VertexData::from_buffer(&quad(0.0));
    animation.apply_to_vertex_data(&mut data, 0.25, 1.0, &[]);
    assert!(approx_vec3(data.positions[0], Vec3::new(0.5, 0.0, 0.0)));
    assert!(approx_vec3(data.positions[1], Vec3::new(0.5, 1.0, 0.0)));
}

#[test]
fn hardware_morph_binds_buffers() {
    let first = quad(0.0);
    let second = quad(2.0);
    let mut animation = Animation::new("morph", 1.0);
    let track = animation.create_vertex_track(0, VertexAnimationType::Morph).unwrap();
    track.create_vertex_morph_key_frame(0.0).unwrap().set_vertex_buffer(Rc::clone(&first));
    track.create_vertex_morph_key_frame(1.0).unwrap().set_vertex_buffer(Rc::clone(&second));
    track.set_target_mode(VertexTargetMode::Hardware);

    let mut data = VertexData::from_buffer(&first).with_hardware_slots(1);
    animation.apply_to_vertex_data(&mut data, 0.75, 1.0, &[]);

    assert!(Rc::ptr_eq(data.position_binding.as_ref().unwrap(), &first));
    let slot = &data.hw_animation_data[0];
    assert!(matches!(&slot.source, Some(HardwareSource::KeyFrame(b)) if Rc::ptr_eq(b, &second)));
    assert!(approx(slot.parametric, 0.75));
    // CPU positions are untouched on the hardware path
    assert!(approx_vec3(data.positions[0], Vec3::ZERO));
}

fn smile_pose() -> Pose {
    let mut pose = Pose::new("smile", 1);
    pose.add_vertex(1, Vec3::new(0.0, 2.0, 0.0));
    pose
}

fn pose_animation() -> Animation {
    let mut animation = Animation::new("smile", 1.0);
    let track = animation.create_vertex_track(1, VertexAnimationType::Pose).unwrap();
    track.create_vertex_pose_key_frame(0.0).unwrap().add_pose_reference(0, 0.0);
    track.create_vertex_pose_key_frame(1.0).unwrap().add_pose_reference(0, 1.0);
    animation
}

#[test]
fn software_pose_blend_adds_weighted_offsets() {
    let mut animation = pose_animation();
    let mut data = VertexData::from_buffer(&quad(0.0));
    animation.apply_to_vertex_data(&mut data, 0.5, 1.0, &[smile_pose()]);
    assert!(approx_vec3(data.positions[1], Vec3::new(0.0, 2.0, 0.0)));
    assert!(approx_vec3(data.positions[0], Vec3::ZERO));
}

#[test]
fn pose_missing_from_first_keyframe_fades_in_from_zero() {
    let mut animation = Animation::new("blink", 1.0);
    let track = animation.create_vertex_track(1, VertexAnimationType::Pose).unwrap();
    track.create_vertex_pose_key_frame(0.0).unwrap().add_pose_reference(0, 1.0);
    let last = track.create_vertex_pose_key_frame(1.0).unwrap();
    last.add_pose_reference(0, 1.0);
    last.add_pose_reference(1, 0.8);

    let index = animation.time_index(0.5);
    let ctx = animation.track_context();
    let blended = animation.vertex_track(1).unwrap().interpolated_pose_key_frame(&ctx, &index);
    assert!(approx(blended.influence_of(0).unwrap(), 1.0));
    assert!(approx(blended.influence_of(1).unwrap(), 0.4));

    let mut lid = Pose::new("lid", 1);
    lid.add_vertex(0, Vec3::new(1.0, 0.0, 0.0));
    let mut data = VertexData::from_buffer(&quad(0.0));
    animation.apply_to_vertex_data(&mut data, 0.5, 1.0, &[smile_pose(), lid]);
    assert!(approx_vec3(data.positions[0], Vec3::new(0.4, 0.0, 0.0)));
    assert!(approx_vec3(data.positions[1], Vec3::new(0.0, 3.0, 0.0)));
}

#[test]
fn mesh_target_routes_tracks_to_submeshes() {
    init_logger();
    let mut animation = pose_animation();
    let mut mesh = AnimatedMesh::new();
    mesh.poses.push(smile_pose());
    mesh.submeshes.push(AnimatedVertexSet::new(quad(0.0), 2));

    mesh.begin_animation_update();
    animation.apply_to_mesh(&mut mesh, 0.5, 1.0, false, true);
    {
        let set = mesh.vertex_set_mut(1).unwrap();
        assert_eq!(set.hardware.hw_animation_data_items_used(), 1);
        assert!(matches!(set.hardware.hw_animation_data[0].source, Some(HardwareSource::Pose(0))));
        assert!(approx(set.hardware.hw_animation_data[0].parametric, 0.5));
        assert!(approx_vec3(set.software.positions[1], Vec3::new(0.0, 1.0, 0.0)));
    }

    // A pending request forces the software path as well
    mesh.add_software_animation_request(false);
    mesh.begin_animation_update();
    animation.apply_to_mesh(&mut mesh, 0.5, 1.0, false, true);
    let set = mesh.vertex_set_mut(1).unwrap();
    assert!(approx_vec3(set.software.positions[1], Vec3::new(0.0, 2.0, 0.0)));
    assert_eq!(set.hardware.hw_animation_data_items_used(), 1);

    mesh.remove_software_animation_request(false).unwrap();
    assert!(matches!(
        mesh.remove_software_animation_request(false),
        Err(AnimationError::InvalidParameters(_))
    ));
}
