//! Animation Settings Tests
//!
//! The defaults are process-wide and can be installed once, so the whole
//! lifecycle is exercised in a single test.

use sinew::errors::AnimationError;
use sinew::settings::{AnimationSettings, InterpolationMode, RotationInterpolationMode};
use sinew::Animation;

#[test]
fn settings_install_once_and_feed_new_animations() {
    let _ = env_logger::builder().is_test(true).try_init();

    assert!(!AnimationSettings::is_installed());
    assert_eq!(AnimationSettings::global(), AnimationSettings::default());
    let before = Animation::new("before", 1.0);
    assert_eq!(before.interpolation_mode(), InterpolationMode::Linear);

    let installed = AnimationSettings {
        default_interpolation_mode: InterpolationMode::Spline,
        default_rotation_interpolation_mode: RotationInterpolationMode::Spherical,
    };
    AnimationSettings::install(installed).unwrap();
    assert!(AnimationSettings::is_installed());
    assert_eq!(AnimationSettings::global(), installed);

    // A second install fails and keeps the first value
    let result = AnimationSettings::install(AnimationSettings::default());
    assert!(matches!(result, Err(AnimationError::InvalidParameters(_))));
    assert_eq!(AnimationSettings::global(), installed);

    let after = Animation::new("after", 1.0);
    assert_eq!(after.interpolation_mode(), InterpolationMode::Spline);
    assert_eq!(after.rotation_interpolation_mode(), RotationInterpolationMode::Spherical);

    // Existing animations keep the modes they were built with
    assert_eq!(before.interpolation_mode(), InterpolationMode::Linear);

    // Explicit settings bypass the installed defaults
    let explicit = Animation::with_settings("explicit", 1.0, &AnimationSettings::default());
    assert_eq!(explicit.interpolation_mode(), InterpolationMode::Linear);
}
