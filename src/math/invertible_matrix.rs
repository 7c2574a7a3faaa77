use std::sync::Arc;

use super::matrix::Matrix4x4;
use super::point::Point3;
use super::ray::Ray;
use super::vector::Vec3;
use crate::error::{CoreError, Result};

// Based on examples/original_source/iris/inc/iris_matrix.h's
// `INVERTIBLE_MATRIX { MATRIX Matrix; MATRIX Inverse; }`, reexpressed with an
// `Arc`-shared pair and a side discriminator instead of raw
// sibling pointers.

/// Which of the two matrices in a [`MatrixPair`] a [`MatrixHandle`] denotes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Side {
    Original,
    Inverse,
}

/// The shared allocation behind a matrix and its inverse. `inverse()` never
/// allocates: it just returns a handle onto the same pair with the opposite
/// `Side`, bumping the `Arc`'s refcount (atomic).
#[derive(Debug)]
pub struct MatrixPair {
    m: Matrix4x4,
    m_inv: Matrix4x4,
}

/// A reference-counted handle onto one side of an invertible matrix pair.
#[derive(Debug, Clone)]
pub struct MatrixHandle {
    pair: Arc<MatrixPair>,
    side: Side,
}

impl MatrixHandle {
    fn from_pair(pair: MatrixPair, side: Side) -> Self {
        Self { pair: Arc::new(pair), side }
    }

    /// Builds an invertible matrix from 16 raw values, computing the inverse
    /// via Gauss-Jordan elimination. Returns `ArithmeticError` if the matrix
    /// is singular.
    pub fn new(m: [[f32; 4]; 4]) -> Result<Self> {
        let m = Matrix4x4::new(m);
        let m_inv = m.inverted()?;
        Ok(Self::from_pair(MatrixPair { m, m_inv }, Side::Original))
    }

    fn new_full(m: Matrix4x4, m_inv: Matrix4x4) -> Self {
        debug_assert!(!m.has_nans());
        debug_assert!(!m_inv.has_nans());
        Self::from_pair(MatrixPair { m, m_inv }, Side::Original)
    }

    pub fn identity() -> Self {
        let m = Matrix4x4::identity();
        Self::new_full(m, m)
    }

    /// Analytic inverse, no Gauss-Jordan needed.
    pub fn translation(delta: Vec3) -> Self {
        let m = Matrix4x4::new([
            [1.0, 0.0, 0.0, delta.x],
            [0.0, 1.0, 0.0, delta.y],
            [0.0, 0.0, 1.0, delta.z],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let m_inv = Matrix4x4::new([
            [1.0, 0.0, 0.0, -delta.x],
            [0.0, 1.0, 0.0, -delta.y],
            [0.0, 0.0, 1.0, -delta.z],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        Self::new_full(m, m_inv)
    }

    /// Analytic inverse. Any of `x`, `y`, `z` being zero is `InvalidArgument`.
    pub fn scalar(x: f32, y: f32, z: f32) -> Result<Self> {
        if x == 0.0 || y == 0.0 || z == 0.0 {
            return Err(CoreError::InvalidArgument);
        }
        let m = Matrix4x4::new([
            [x, 0.0, 0.0, 0.0],
            [0.0, y, 0.0, 0.0],
            [0.0, 0.0, z, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let m_inv = Matrix4x4::new([
            [1.0 / x, 0.0, 0.0, 0.0],
            [0.0, 1.0 / y, 0.0, 0.0],
            [0.0, 0.0, 1.0 / z, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        Ok(Self::new_full(m, m_inv))
    }

    /// Rotation of `theta_degrees` around `axis`, via Rodrigues' formula.
    /// `axis` is normalized internally; a zero-length axis is `InvalidArgument`.
    ///
    /// NOTE: the original C rotation code has a transcription bug
    /// (`NormalizedAxis.Y * NormalizedAxis.X` in `M12` where `.Y * .Z` is
    /// required). This follows Rodrigues' formula verbatim and
    /// does not reproduce that bug.
    pub fn rotation(theta_degrees: f32, axis: Vec3) -> Result<Self> {
        if axis.length_squared() == 0.0 {
            return Err(CoreError::InvalidArgument);
        }
        let a = axis.normalized();
        let theta = theta_degrees.to_radians();
        let (sin_t, cos_t) = (theta.sin(), theta.cos());

        let m = Matrix4x4::new([
            [
                a.x * a.x + (1.0 - a.x * a.x) * cos_t,
                a.x * a.y * (1.0 - cos_t) - a.z * sin_t,
                a.x * a.z * (1.0 - cos_t) + a.y * sin_t,
                0.0,
            ],
            [
                a.x * a.y * (1.0 - cos_t) + a.z * sin_t,
                a.y * a.y + (1.0 - a.y * a.y) * cos_t,
                a.y * a.z * (1.0 - cos_t) - a.x * sin_t,
                0.0,
            ],
            [
                a.x * a.z * (1.0 - cos_t) - a.y * sin_t,
                a.y * a.z * (1.0 - cos_t) + a.x * sin_t,
                a.z * a.z + (1.0 - a.z * a.z) * cos_t,
                0.0,
            ],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        // A rotation matrix is orthogonal: its inverse is its transpose.
        Ok(Self::new_full(m, m.transposed()))
    }

    /// Analytic inverse. Any degenerate axis (`left == right`, `bottom ==
    /// top`, or `near == far`) is `InvalidArgumentCombination`
    /// (examples/original_source/iris/inc/iris_matrix.h's
    /// `MatrixInitializeFrustum`).
    pub fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Result<Self> {
        if left == right || bottom == top || near == far {
            return Err(CoreError::InvalidArgumentCombination);
        }
        let m = Matrix4x4::new([
            [
                2.0 * near / (right - left),
                0.0,
                (right + left) / (right - left),
                0.0,
            ],
            [
                0.0,
                2.0 * near / (top - bottom),
                (top + bottom) / (top - bottom),
                0.0,
            ],
            [
                0.0,
                0.0,
                -(far + near) / (far - near),
                -2.0 * far * near / (far - near),
            ],
            [0.0, 0.0, -1.0, 0.0],
        ]);
        let m_inv = m.inverted()?;
        Ok(Self::new_full(m, m_inv))
    }

    /// Analytic inverse. Same degeneracy rule as [`Self::frustum`].
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Result<Self> {
        if left == right || bottom == top || near == far {
            return Err(CoreError::InvalidArgumentCombination);
        }
        let sx = 2.0 / (right - left);
        let sy = 2.0 / (top - bottom);
        let sz = 2.0 / (far - near);
        let m = Matrix4x4::new([
            [sx, 0.0, 0.0, -(right + left) / (right - left)],
            [0.0, sy, 0.0, -(top + bottom) / (top - bottom)],
            [0.0, 0.0, sz, -(far + near) / (far - near)],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let m_inv = m.inverted()?;
        Ok(Self::new_full(m, m_inv))
    }

    /// Flips `self.side` with no allocation — just an `Arc` clone.
    pub fn inverse(&self) -> Self {
        let side = match self.side {
            Side::Original => Side::Inverse,
            Side::Inverse => Side::Original,
        };
        Self { pair: Arc::clone(&self.pair), side }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    fn active(&self) -> &Matrix4x4 {
        match self.side {
            Side::Original => &self.pair.m,
            Side::Inverse => &self.pair.m_inv,
        }
    }

    /// Copies out the 16 floats of the active side.
    pub fn read_contents(&self) -> [[f32; 4]; 4] {
        self.active().m
    }

    pub fn transform_point(&self, p: Point3) -> Point3 {
        let m = &self.active().m;
        let x = p.x;
        let y = p.y;
        let z = p.z;
        let xp = m[0][0] * x + m[0][1] * y + m[0][2] * z + m[0][3];
        let yp = m[1][0] * x + m[1][1] * y + m[1][2] * z + m[1][3];
        let zp = m[2][0] * x + m[2][1] * y + m[2][2] * z + m[2][3];
        let wp = m[3][0] * x + m[3][1] * y + m[3][2] * z + m[3][3];
        if wp == 1.0 {
            Point3::new(xp, yp, zp)
        } else {
            Point3::new(xp / wp, yp / wp, zp / wp)
        }
    }

    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        let m = &self.active().m;
        Vec3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    pub fn transform_ray(&self, r: Ray) -> Ray {
        Ray::new(self.transform_point(r.origin), self.transform_vector(r.direction), r.time)
    }
}

impl std::ops::Mul<&MatrixHandle> for &MatrixHandle {
    type Output = MatrixHandle;

    /// Allocates a new pair. Its inverse side is `B⁻¹ · A⁻¹`.
    fn mul(self, rhs: &MatrixHandle) -> MatrixHandle {
        let m = self.active() * rhs.active();
        let m_inv = {
            let a_inv = self.inverse();
            let b_inv = rhs.inverse();
            b_inv.active() * a_inv.active()
        };
        MatrixHandle::new_full(m, m_inv)
    }
}
