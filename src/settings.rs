//! Animation Settings
//!
//! Process-wide defaults applied when an [`Animation`](crate::Animation) is
//! constructed without explicit settings.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sinew::{AnimationSettings, InterpolationMode, RotationInterpolationMode};
//!
//! // Once, at startup, before any animation is created
//! AnimationSettings::install(AnimationSettings {
//!     default_interpolation_mode: InterpolationMode::Spline,
//!     default_rotation_interpolation_mode: RotationInterpolationMode::Spherical,
//! })?;
//!
//! // Animations created afterwards pick the defaults up
//! let walk = sinew::Animation::new("Walk", 2.0);
//! ```

use std::sync::OnceLock;

use crate::errors::{AnimationError, Result};

// ---------------------------------------------------------------------------
// Interpolation modes
// ---------------------------------------------------------------------------

/// How positions and scales are interpolated between keyframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterpolationMode {
    /// Straight-line interpolation between the two surrounding keyframes.
    #[default]
    Linear,
    /// Catmull-Rom style Hermite spline through all keyframes.
    Spline,
}

/// How rotations are interpolated when [`InterpolationMode::Linear`] is active.
///
/// In spline mode rotations always use spherical quadrangle interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RotationInterpolationMode {
    /// Normalised linear interpolation. Cheap, slightly non-uniform speed.
    #[default]
    Linear,
    /// Spherical linear interpolation. Constant angular velocity.
    Spherical,
}

// ---------------------------------------------------------------------------
// AnimationSettings
// ---------------------------------------------------------------------------

static GLOBAL_SETTINGS: OnceLock<AnimationSettings> = OnceLock::new();

/// Defaults used by newly created animations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnimationSettings {
    pub default_interpolation_mode: InterpolationMode,
    pub default_rotation_interpolation_mode: RotationInterpolationMode,
}

impl AnimationSettings {
    /// Installs the process-wide defaults.
    ///
    /// May be called at most once; later calls fail with
    /// [`AnimationError::InvalidParameters`] and leave the installed value
    /// untouched.
    pub fn install(settings: AnimationSettings) -> Result<()> {
        GLOBAL_SETTINGS.set(settings).map_err(|_| {
            AnimationError::InvalidParameters("animation settings are already installed".into())
        })?;
        log::info!(
            "Animation defaults installed: {:?} / {:?}",
            settings.default_interpolation_mode,
            settings.default_rotation_interpolation_mode
        );
        Ok(())
    }

    /// Returns the installed defaults, or [`AnimationSettings::default`]
    /// when nothing was installed.
    #[must_use]
    pub fn global() -> AnimationSettings {
        GLOBAL_SETTINGS.get().copied().unwrap_or_default()
    }

    /// Whether [`AnimationSettings::install`] has been called.
    #[must_use]
    pub fn is_installed() -> bool {
        GLOBAL_SETTINGS.get().is_some()
    }
}
