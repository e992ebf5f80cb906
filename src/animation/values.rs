use std::ops::{Add, Mul, Sub};

use glam::{Quat, Vec2, Vec3, Vec4};

/// Below this sine, log/exp treat a rotation as degenerate and slerp falls
/// back to a normalised lerp.
const QUAT_EPSILON: f32 = 1e-3;

/// Values that can be blended between two keyframes.
pub trait Interpolatable: Copy + Sized {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self;

    /// Cubic Hermite segment from `v0` to `v1` with tangents scaled by `dt`.
    fn interpolate_cubic(
        v0: Self,
        out_tangent0: Self,
        in_tangent1: Self,
        v1: Self,
        t: f32,
        dt: f32,
    ) -> Self;
}

/// Hermite basis weights `(s0, s1, s2, s3)` for `p0`, `m0`, `p1`, `m1`.
#[inline]
fn hermite_basis(t: f32) -> (f32, f32, f32, f32) {
    let t2 = t * t;
    let t3 = t2 * t;

    let s2 = -2.0 * t3 + 3.0 * t2;
    let s3 = t3 - t2;
    let s0 = 1.0 - s2;
    let s1 = s3 - t2 + t;
    (s0, s1, s2, s3)
}

impl Interpolatable for f32 {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        start + (end - start) * t
    }

    fn interpolate_cubic(v0: Self, out_tangent0: Self, in_tangent1: Self, v1: Self, t: f32, dt: f32) -> Self {
        let (s0, s1, s2, s3) = hermite_basis(t);
        s0 * v0 + s1 * out_tangent0 * dt + s2 * v1 + s3 * in_tangent1 * dt
    }
}

impl Interpolatable for Vec3 {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        start + (end - start) * t
    }

    fn interpolate_cubic(v0: Self, out_tangent0: Self, in_tangent1: Self, v1: Self, t: f32, dt: f32) -> Self {
        let (s0, s1, s2, s3) = hermite_basis(t);
        v0 * s0 + out_tangent0 * (s1 * dt) + v1 * s2 + in_tangent1 * (s3 * dt)
    }
}

// ============================================================================
// Quaternion helpers
// ============================================================================

/// Normalised linear interpolation.
///
/// With `shortest_path`, `b` is negated when the quaternions lie in opposite
/// hemispheres so the blend takes the short way round.
#[must_use]
pub fn nlerp(t: f32, a: Quat, b: Quat, shortest_path: bool) -> Quat {
    let target = if shortest_path && a.dot(b) < 0.0 { -b } else { b };
    (a + (target - a) * t).normalize()
}

/// Spherical linear interpolation.
///
/// Falls back to [`nlerp`]-style blending when the quaternions are nearly
/// parallel.
#[must_use]
pub fn slerp(t: f32, a: Quat, b: Quat, shortest_path: bool) -> Quat {
    let mut cos = a.dot(b);
    let target = if cos < 0.0 && shortest_path {
        cos = -cos;
        -b
    } else {
        b
    };

    if cos.abs() < 1.0 - QUAT_EPSILON {
        let sin = (1.0 - cos * cos).sqrt();
        let angle = sin.atan2(cos);
        let inv_sin = 1.0 / sin;
        let coeff0 = ((1.0 - t) * angle).sin() * inv_sin;
        let coeff1 = (t * angle).sin() * inv_sin;
        a * coeff0 + target * coeff1
    } else {
        (a * (1.0 - t) + target * t).normalize()
    }
}

/// Quaternion logarithm. The result is a pure quaternion (`w == 0`).
#[must_use]
pub fn quat_log(q: Quat) -> Quat {
    if q.w.abs() < 1.0 {
        let angle = q.w.acos();
        let sin = angle.sin();
        if sin.abs() >= QUAT_EPSILON {
            let coeff = angle / sin;
            return Quat::from_xyzw(coeff * q.x, coeff * q.y, coeff * q.z, 0.0);
        }
    }
    Quat::from_xyzw(q.x, q.y, q.z, 0.0)
}

/// Quaternion exponential of a pure quaternion.
#[must_use]
pub fn quat_exp(q: Quat) -> Quat {
    let angle = q.xyz().length();
    let sin = angle.sin();
    let w = angle.cos();
    if sin.abs() >= QUAT_EPSILON {
        let coeff = sin / angle;
        Quat::from_xyzw(coeff * q.x, coeff * q.y, coeff * q.z, w)
    } else {
        Quat::from_xyzw(q.x, q.y, q.z, w)
    }
}

/// Spherical quadrangle interpolation from `p` to `q` with inner control
/// points `a` and `b`.
#[must_use]
pub fn squad(t: f32, p: Quat, a: Quat, b: Quat, q: Quat, shortest_path: bool) -> Quat {
    let slerp_t = 2.0 * t * (1.0 - t);
    let slerp_p = slerp(t, p, q, shortest_path);
    let slerp_q = slerp(t, a, b, false);
    slerp(slerp_t, slerp_p, slerp_q, false)
}

/// Rotation angle of `q` in radians, zero for a rotation without an axis.
#[must_use]
pub fn rotation_angle(q: Quat) -> f32 {
    if q.xyz().length_squared() > 0.0 {
        2.0 * q.w.clamp(-1.0, 1.0).acos()
    } else {
        0.0
    }
}

/// Whether the rotation taking `a` to `b` is at most `tolerance` radians.
///
/// `q` and `-q` describe the same rotation and compare equal.
#[must_use]
pub fn quat_equals(a: Quat, b: Quat, tolerance: f32) -> bool {
    let relative = a.conjugate() * b;
    let angle = 2.0 * relative.xyz().length().atan2(relative.w.abs());
    angle <= tolerance
}

// ============================================================================
// Numeric values
// ============================================================================

/// A value driven by a numeric track.
///
/// Arithmetic between different kinds keeps the left operand and logs a
/// warning; integer values scaled by a real are rounded toward zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Int(i32),
    Real(f32),
    Vector2(Vec2),
    Vector3(Vec3),
    Vector4(Vec4),
}

impl NumericValue {
    /// The additive identity of the same kind.
    #[must_use]
    pub fn zero_like(&self) -> Self {
        match self {
            NumericValue::Int(_) => NumericValue::Int(0),
            NumericValue::Real(_) => NumericValue::Real(0.0),
            NumericValue::Vector2(_) => NumericValue::Vector2(Vec2::ZERO),
            NumericValue::Vector3(_) => NumericValue::Vector3(Vec3::ZERO),
            NumericValue::Vector4(_) => NumericValue::Vector4(Vec4::ZERO),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            NumericValue::Int(_) => "Int",
            NumericValue::Real(_) => "Real",
            NumericValue::Vector2(_) => "Vector2",
            NumericValue::Vector3(_) => "Vector3",
            NumericValue::Vector4(_) => "Vector4",
        }
    }

    fn combine(self, rhs: Self, sign: f32) -> Self {
        match (self, rhs) {
            (NumericValue::Int(a), NumericValue::Int(b)) => {
                NumericValue::Int(if sign > 0.0 { a.wrapping_add(b) } else { a.wrapping_sub(b) })
            }
            (NumericValue::Real(a), NumericValue::Real(b)) => NumericValue::Real(a + sign * b),
            (NumericValue::Vector2(a), NumericValue::Vector2(b)) => NumericValue::Vector2(a + b * sign),
            (NumericValue::Vector3(a), NumericValue::Vector3(b)) => NumericValue::Vector3(a + b * sign),
            (NumericValue::Vector4(a), NumericValue::Vector4(b)) => NumericValue::Vector4(a + b * sign),
            (lhs, rhs) => {
                log::warn!(
                    "Numeric value kind mismatch: {} with {}",
                    lhs.kind_name(),
                    rhs.kind_name()
                );
                lhs
            }
        }
    }
}

impl Default for NumericValue {
    fn default() -> Self {
        NumericValue::Real(0.0)
    }
}

impl Add for NumericValue {
    type Output = NumericValue;

    fn add(self, rhs: Self) -> Self::Output {
        self.combine(rhs, 1.0)
    }
}

impl Sub for NumericValue {
    type Output = NumericValue;

    fn sub(self, rhs: Self) -> Self::Output {
        self.combine(rhs, -1.0)
    }
}

impl Mul<f32> for NumericValue {
    type Output = NumericValue;

    fn mul(self, rhs: f32) -> Self::Output {
        match self {
            NumericValue::Int(v) => NumericValue::Int((v as f32 * rhs) as i32),
            NumericValue::Real(v) => NumericValue::Real(v * rhs),
            NumericValue::Vector2(v) => NumericValue::Vector2(v * rhs),
            NumericValue::Vector3(v) => NumericValue::Vector3(v * rhs),
            NumericValue::Vector4(v) => NumericValue::Vector4(v * rhs),
        }
    }
}

impl Interpolatable for NumericValue {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        start + (end - start) * t
    }

    fn interpolate_cubic(v0: Self, out_tangent0: Self, in_tangent1: Self, v1: Self, t: f32, dt: f32) -> Self {
        let (s0, s1, s2, s3) = hermite_basis(t);
        v0 * s0 + out_tangent0 * (s1 * dt) + v1 * s2 + in_tangent1 * (s3 * dt)
    }
}

/// A property that numeric tracks can drive.
pub trait AnimableValue {
    /// Adds `delta` to the current value.
    fn apply_delta_value(&mut self, delta: &NumericValue);

    /// Overwrites the current value.
    fn set_value(&mut self, value: &NumericValue);
}
