//! Keyframe splines.
//!
//! [`SimpleSpline`] is a Catmull-Rom style Hermite curve through a list of
//! points; [`RotationalSpline`] is its quaternion counterpart built on
//! spherical quadrangle interpolation. Both recompute their tangents eagerly
//! when points are added unless auto-calculation is switched off, which is
//! how tracks fill them in bulk.

use glam::{Quat, Vec3};

use super::values::{Interpolatable, quat_exp, quat_log, squad};

/// Hermite spline through 3D points with automatic tangents.
#[derive(Debug, Clone)]
pub struct SimpleSpline {
    points: Vec<Vec3>,
    tangents: Vec<Vec3>,
    auto_calc: bool,
}

impl Default for SimpleSpline {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleSpline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            tangents: Vec::new(),
            auto_calc: true,
        }
    }

    pub fn add_point(&mut self, point: Vec3) {
        self.points.push(point);
        if self.auto_calc {
            self.recalc_tangents();
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.tangents.clear();
    }

    #[must_use]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn point(&self, index: usize) -> Option<Vec3> {
        self.points.get(index).copied()
    }

    /// Toggles tangent recomputation on every [`SimpleSpline::add_point`].
    pub fn set_auto_calculate(&mut self, auto_calc: bool) {
        self.auto_calc = auto_calc;
    }

    /// Recomputes Catmull-Rom tangents.
    ///
    /// A curve whose first and last points coincide is treated as closed and
    /// its end tangents wrap around.
    pub fn recalc_tangents(&mut self) {
        let n = self.points.len();
        if n < 2 {
            return;
        }
        let p = &self.points;
        let closed = p[0].abs_diff_eq(p[n - 1], 1e-3);

        self.tangents.clear();
        self.tangents.reserve(n);
        for i in 0..n {
            let tangent = if i == 0 {
                if closed {
                    (p[1] - p[n - 2]) * 0.5
                } else {
                    (p[1] - p[0]) * 0.5
                }
            } else if i == n - 1 {
                if closed {
                    self.tangents[0]
                } else {
                    (p[i] - p[i - 1]) * 0.5
                }
            } else {
                (p[i + 1] - p[i - 1]) * 0.5
            };
            self.tangents.push(tangent);
        }
    }

    /// Evaluates the segment starting at `from_index` at parameter `t`.
    ///
    /// Asking for the segment after the last point returns that point.
    #[must_use]
    pub fn interpolate(&self, from_index: usize, t: f32) -> Vec3 {
        let n = self.points.len();
        if from_index >= n {
            return self.points.last().copied().unwrap_or(Vec3::ZERO);
        }
        if from_index + 1 == n || t == 0.0 {
            return self.points[from_index];
        }
        if t == 1.0 {
            return self.points[from_index + 1];
        }
        if self.tangents.len() != n {
            return Vec3::interpolate_linear(self.points[from_index], self.points[from_index + 1], t);
        }

        Vec3::interpolate_cubic(
            self.points[from_index],
            self.tangents[from_index],
            self.tangents[from_index + 1],
            self.points[from_index + 1],
            t,
            1.0,
        )
    }
}

/// Quaternion spline evaluated with squad.
#[derive(Debug, Clone)]
pub struct RotationalSpline {
    points: Vec<Quat>,
    tangents: Vec<Quat>,
    auto_calc: bool,
}

impl Default for RotationalSpline {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationalSpline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            tangents: Vec::new(),
            auto_calc: true,
        }
    }

    pub fn add_point(&mut self, point: Quat) {
        self.points.push(point);
        if self.auto_calc {
            self.recalc_tangents();
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.tangents.clear();
    }

    #[must_use]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn set_auto_calculate(&mut self, auto_calc: bool) {
        self.auto_calc = auto_calc;
    }

    /// Recomputes the inner squad control points.
    pub fn recalc_tangents(&mut self) {
        let n = self.points.len();
        if n < 2 {
            return;
        }
        let p = &self.points;
        let closed = p[0] == p[n - 1];

        self.tangents.clear();
        self.tangents.reserve(n);
        for i in 0..n {
            let current = p[i];
            let inv = current.inverse();
            let (next, prev) = if i == 0 {
                (p[1], if closed { p[n - 2] } else { current })
            } else if i == n - 1 {
                (if closed { p[1] } else { current }, p[i - 1])
            } else {
                (p[i + 1], p[i - 1])
            };
            let part1 = quat_log(inv * next);
            let part2 = quat_log(inv * prev);
            let pre_exp = (part1 + part2) * -0.25;
            self.tangents.push(current * quat_exp(pre_exp));
        }
    }

    #[must_use]
    pub fn interpolate(&self, from_index: usize, t: f32, shortest_path: bool) -> Quat {
        let n = self.points.len();
        if from_index >= n {
            return self.points.last().copied().unwrap_or(Quat::IDENTITY);
        }
        if from_index + 1 == n || t == 0.0 {
            return self.points[from_index];
        }
        if t == 1.0 {
            return self.points[from_index + 1];
        }
        if self.tangents.len() != n {
            return super::values::slerp(t, self.points[from_index], self.points[from_index + 1], shortest_path);
        }

        squad(
            t,
            self.points[from_index],
            self.tangents[from_index],
            self.tangents[from_index + 1],
            self.points[from_index + 1],
            shortest_path,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_spline_stays_on_line() {
        let mut spline = SimpleSpline::new();
        for x in 0..4 {
            spline.add_point(Vec3::new(x as f32, 0.0, 0.0));
        }
        let mid = spline.interpolate(1, 0.5);
        assert!((mid.x - 1.5).abs() < 1e-5);
        assert!(mid.y.abs() < 1e-6);
    }

    #[test]
    fn spline_hits_control_points() {
        let mut spline = SimpleSpline::new();
        spline.add_point(Vec3::ZERO);
        spline.add_point(Vec3::new(1.0, 2.0, 0.0));
        spline.add_point(Vec3::new(3.0, 0.0, 1.0));
        assert_eq!(spline.interpolate(0, 0.0), Vec3::ZERO);
        assert_eq!(spline.interpolate(0, 1.0), Vec3::new(1.0, 2.0, 0.0));
        // Past the last segment
        assert_eq!(spline.interpolate(2, 0.5), Vec3::new(3.0, 0.0, 1.0));
    }

    #[test]
    fn deferred_tangents() {
        let mut spline = SimpleSpline::new();
        spline.set_auto_calculate(false);
        spline.add_point(Vec3::ZERO);
        spline.add_point(Vec3::X);
        spline.add_point(Vec3::X * 2.0);
        // No tangents yet: plain linear blend
        assert!((spline.interpolate(0, 0.25).x - 0.25).abs() < 1e-5);

        spline.recalc_tangents();
        assert!((spline.interpolate(0, 0.25).x - 0.179_687_5).abs() < 1e-5);
    }

    #[test]
    fn rotational_spline_endpoints() {
        let mut spline = RotationalSpline::new();
        let a = Quat::from_rotation_y(0.0);
        let b = Quat::from_rotation_y(0.5);
        let c = Quat::from_rotation_y(1.0);
        let d = Quat::from_rotation_y(1.5);
        spline.add_point(a);
        spline.add_point(b);
        spline.add_point(c);
        spline.add_point(d);
        assert_eq!(spline.interpolate(0, 0.0, true), a);
        assert_eq!(spline.interpolate(1, 1.0, true), c);

        // Inner segment of a uniform rotation about one axis
        let mid = spline.interpolate(1, 0.5, true);
        let expected = Quat::from_rotation_y(0.75);
        assert!(mid.dot(expected).abs() > 0.9999);
    }
}
