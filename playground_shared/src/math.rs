//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! World space is 2D with `+y` pointing down (screen convention).

use std::f32::consts::{PI, TAU};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` (radians, measured from `+x`).
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn len(self) -> f32 {
        self.len_sq().sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (other - self).len()
    }

    /// Angle of the vector in radians, `atan2(y, x)`.
    pub fn angle(self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Returns the unit vector, or `None` for (near) zero length.
    pub fn normalized(self) -> Option<Self> {
        let len = self.len();
        if len > f32::EPSILON {
            Some(self * (1.0 / len))
        } else {
            None
        }
    }

    /// Shortens the vector to at most `max_len`.
    pub fn clamp_len(self, max_len: f32) -> Self {
        let len = self.len();
        if len > max_len && len > f32::EPSILON {
            self * (max_len / len)
        } else {
            self
        }
    }

    /// Exponential-smoothing step: moves `t` of the way toward `to`.
    ///
    /// Unlike a segment lerp, `t` is not clamped; callers pass a fixed blend
    /// factor in $(0,1]$.
    pub fn approach(self, to: Self, t: f32) -> Self {
        Self::new(self.x + (to.x - self.x) * t, self.y + (to.y - self.y) * t)
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        self.approach(to, t.clamp(0.0, 1.0))
    }

    /// Rounds both components to whole units.
    pub fn round(self) -> Self {
        Self::new(self.x.round(), self.y.round())
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Axis-aligned rectangle described by its centre and full extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub center: Vec2,
    pub size: Vec2,
}

impl Rect {
    pub const fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            center: Vec2::new(cx, cy),
            size: Vec2::new(w, h),
        }
    }

    pub fn min(&self) -> Vec2 {
        self.center - self.size * 0.5
    }

    pub fn max(&self) -> Vec2 {
        self.center + self.size * 0.5
    }

    /// Closest point of the rectangle to `p` (`p` itself when inside).
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        let (lo, hi) = (self.min(), self.max());
        Vec2::new(p.x.clamp(lo.x, hi.x), p.y.clamp(lo.y, hi.y))
    }

    pub fn contains(&self, p: Vec2) -> bool {
        let (lo, hi) = (self.min(), self.max());
        p.x >= lo.x && p.x <= hi.x && p.y >= lo.y && p.y <= hi.y
    }
}

/// Wraps an angle difference into $(-\pi, \pi]$.
pub fn wrap_angle(mut a: f32) -> f32 {
    a %= TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Moves `from` toward `to` by `t` along the shorter arc.
pub fn approach_angle(from: f32, to: f32, t: f32) -> f32 {
    from + wrap_angle(to - from) * t
}

/// Rounds to `digits` decimal places.
pub fn round_to(v: f32, digits: i32) -> f32 {
    let scale = 10f32.powi(digits);
    (v * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_lerp_midpoint() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(2.0, 4.0);
        assert_eq!(a.lerp(b, 0.5), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn clamp_len_only_shortens() {
        let v = Vec2::new(30.0, 40.0);
        assert!((v.clamp_len(10.0).len() - 10.0).abs() < 1e-4);
        assert_eq!(v.clamp_len(100.0), v);
    }

    #[test]
    fn wrap_angle_range() {
        assert!((wrap_angle(3.0 * PI - 0.1) - (PI - 0.1)).abs() < 1e-4);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-5);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-6);
        assert!((wrap_angle(-6.0) - (-6.0 + TAU)).abs() < 1e-5);
    }

    #[test]
    fn approach_angle_crosses_seam() {
        // From -3.0 toward 3.0 the short way goes down through -PI.
        let next = approach_angle(-3.0, 3.0, 0.25);
        assert!(next < -3.0);
        assert!((next - (-3.0 - (TAU - 6.0) * 0.25)).abs() < 1e-5);
    }

    #[test]
    fn rect_closest_point() {
        let r = Rect::new(0.0, 0.0, 10.0, 4.0);
        assert_eq!(r.closest_point(Vec2::new(20.0, 0.0)), Vec2::new(5.0, 0.0));
        assert!(r.contains(Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn round_to_two_digits() {
        assert!((round_to(1.23456, 2) - 1.23).abs() < 1e-6);
    }
}
