use crate::error::Result;
use crate::math::Ray;
use crate::ray_tracer::RayTracer;

// Based on examples/original_source/iris/inc/iris_scene.h's `SCENE_VTABLE`:
// a scene is anything that can drive a `RayTracer` over its own geometry.
// Concrete scene representations (acceleration structures, shape lists) are
// an external collaborator; the core only consumes this one method.

pub trait Scene: Send + Sync {
    fn trace_into(&self, world_ray: Ray, ray_tracer: &mut RayTracer) -> Result<()>;
}
