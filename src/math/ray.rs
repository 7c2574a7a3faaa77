use super::point::Point3;
use super::vector::Vec3;

// Based on Physically Based Rendering 3rd ed.
// http://www.pbr-book.org/3ed-2018/Geometry_and_Transformations/Rays.html

/// A ray: `origin + t * direction`. `direction` need not be unit length.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Point3,
    pub direction: Vec3,
    pub time: f32,
}

impl Ray {
    pub fn new(origin: Point3, direction: Vec3, time: f32) -> Self {
        let ret = Self { origin, direction, time };
        debug_assert!(!ret.has_nans());
        ret
    }

    pub fn has_nans(&self) -> bool {
        self.origin.has_nans() || self.direction.has_nans() || self.time.is_nan() || self.time.is_infinite()
    }

    /// `origin + t * direction`.
    pub fn endpoint(&self, t: f32) -> Point3 {
        self.origin.add_scaled(self.direction, t)
    }

    /// A copy of this ray with unit-length direction.
    pub fn normalized(&self) -> Self {
        Self::new(self.origin, self.direction.normalized(), self.time)
    }
}
