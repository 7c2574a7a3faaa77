use crate::error::Result;
use crate::math::Ray;
use crate::ray_tracer::RayTracer;

// Based on examples/original_source/iris/inc/iris_raytracer.h's
// `RAYTRACER_OWNER`: a per-thread container that lets a driver reuse one
// `RayTracer`'s arenas across every ray it traces, instead of allocating a
// fresh one per ray.

/// Owns exactly one [`RayTracer`] and rebinds it to a new ray on every call.
/// Allocates no per-ray memory itself.
pub struct RayTracerOwner {
    ray_tracer: RayTracer,
}

impl RayTracerOwner {
    pub fn new() -> Self {
        Self { ray_tracer: RayTracer::new() }
    }

    /// Rebinds the owned ray tracer to `ray` and returns it for tracing.
    pub fn get_ray_tracer(&mut self, ray: Ray) -> Result<&mut RayTracer> {
        self.ray_tracer.set_ray(ray, false)?;
        Ok(&mut self.ray_tracer)
    }
}

impl Default for RayTracerOwner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Point3, Vec3};

    #[test]
    fn reuses_the_same_ray_tracer_across_calls() {
        let mut owner = RayTracerOwner::new();
        let ray = Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0);
        {
            let rt = owner.get_ray_tracer(ray).unwrap();
            assert_eq!(rt.current_ray(), ray);
        }
        let ray2 = Ray::new(Point3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0), 0.0);
        let rt = owner.get_ray_tracer(ray2).unwrap();
        assert_eq!(rt.current_ray(), ray2);
    }
}
