use std::sync::Arc;

use crate::error::Result;
use crate::hit::HitAllocator;
use crate::light::LightHandle;
use crate::material::MaterialHandle;
use crate::math::{MatrixHandle, Ray, Vec3};

// Based on examples/sndels-yuki's `shapes::Shape` trait, generalized from a
// single `intersect -> Option<Hit>` method to the arena-driven, possibly
// multi-hit-per-trace contract a ray tracer needs.

pub type ShapeRef = Arc<dyn Shape>;

/// An axis-aligned bounding box in whatever space it was computed in.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Bounds3 {
    pub min: Vec3,
    pub max: Vec3,
}

/// Polymorphic scene geometry. Shapes are reference-counted (`ShapeRef`) so
/// the same instance can be traced from multiple ray tracers concurrently.
pub trait Shape: Send + Sync {
    /// Intersects `ray` (already in this shape's tracing space) against the
    /// shape, allocating any emitted hits from `hit_allocator`. Shapes that
    /// intersect more than once (e.g. CSG operands) chain the extra hits
    /// through `next` when calling `HitAllocator::allocate*`.
    fn trace(&self, ray: &Ray, hit_allocator: &mut HitAllocator) -> Result<Option<crate::hit::HitListChain>>;

    /// Surface normal at a hit point already known to lie on the shape, in
    /// whichever space `model_hit_point` was given in.
    fn compute_normal(&self, _model_hit_point: crate::math::Point3, _face: i32) -> Option<Vec3> {
        None
    }

    /// Bounds of the shape, optionally transformed by `model_to_world`.
    fn compute_bounds(&self, _model_to_world: Option<&MatrixHandle>) -> Option<Bounds3> {
        None
    }

    fn material_for(&self, _face: i32) -> Option<MaterialHandle> {
        None
    }

    fn light_for(&self, _face: i32) -> Option<LightHandle> {
        None
    }
}
