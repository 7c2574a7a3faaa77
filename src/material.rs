use std::sync::Arc;

use crate::bsdf::{BsdfAllocator, BsdfHandle};
use crate::math::{Normal, Point3, Vec3};
use crate::spectrum::SpectrumCompositor;

// External collaborator contract: concrete materials (matte, glass, metal,
// ...) are out of scope; the integrator only depends on this method to turn
// a decoded hit into a BSDF.

/// Everything the integrator has already decoded about a hit by the time it
/// asks the material for a BSDF.
pub struct Intersection {
    pub model_hit_point: Point3,
    pub world_hit_point: Point3,
    pub normal: Normal,
    pub viewer: Vec3,
    pub face: i32,
}

pub trait Material: Send + Sync {
    fn sample(
        &self,
        intersection: &Intersection,
        additional_data: &[u8],
        texture_coords: (f32, f32),
        bsdf_allocator: &mut BsdfAllocator,
        reflector_compositor: &mut SpectrumCompositor,
    ) -> BsdfHandle;

    /// Alpha used by the integrator's alpha-over hit compositing; fully
    /// opaque unless a material overrides it.
    fn translucency(&self) -> f32 {
        1.0
    }
}

pub type MaterialHandle = Arc<dyn Material>;
