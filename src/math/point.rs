use approx::{AbsDiffEq, RelativeEq};
use std::ops::{Add, Sub};

use super::vector::Vec3;

// Based on Physically Based Rendering 3rd ed.
// http://www.pbr-book.org/3ed-2018/Geometry_and_Transformations/Points.html

/// A point in 3-space. Kept distinct from [`Vec3`]: point - point = vector,
/// point + vector = point, but point + point has no geometric meaning.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        let ret = Self { x, y, z };
        debug_assert!(!ret.has_nans());
        ret
    }

    pub fn zeros() -> Self {
        Self { x: 0.0, y: 0.0, z: 0.0 }
    }

    pub fn has_nans(&self) -> bool {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
            || self.x.is_infinite() || self.y.is_infinite() || self.z.is_infinite()
    }

    /// `self + v * t`
    pub fn add_scaled(&self, v: Vec3, t: f32) -> Self {
        Self::new(self.x + v.x * t, self.y + v.y * t, self.z + v.z * t)
    }

    /// `self - v * t`
    pub fn sub_scaled(&self, v: Vec3, t: f32) -> Self {
        Self::new(self.x - v.x * t, self.y - v.y * t, self.z - v.z * t)
    }
}

impl Add<Vec3> for Point3 {
    type Output = Self;
    fn add(self, rhs: Vec3) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub<Vec3> for Point3 {
    type Output = Self;
    fn sub(self, rhs: Vec3) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Vec3;
    fn sub(self, rhs: Self) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl AbsDiffEq for Point3 {
    type Epsilon = f32;

    fn default_epsilon() -> Self::Epsilon {
        f32::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.x.abs_diff_eq(&other.x, epsilon)
            && self.y.abs_diff_eq(&other.y, epsilon)
            && self.z.abs_diff_eq(&other.z, epsilon)
    }
}

impl RelativeEq for Point3 {
    fn default_max_relative() -> Self::Epsilon {
        f32::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.x.relative_eq(&other.x, epsilon, max_relative)
            && self.y.relative_eq(&other.y, epsilon, max_relative)
            && self.z.relative_eq(&other.z, epsilon, max_relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtracting_points_yields_a_vector() {
        let a = Point3::new(3.0, 2.0, 1.0);
        let b = Point3::new(1.0, 1.0, 1.0);
        assert_eq!(a - b, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn add_scaled_matches_manual_expansion() {
        let p = Point3::new(1.0, 1.0, 1.0);
        let v = Vec3::new(0.0, 0.0, 1.0);
        assert_eq!(p.add_scaled(v, 2.0), p + v * 2.0);
    }
}
