use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::math::{Point3, Ray};
use crate::ray_tracer::{HitDecodeRequest, RayTracer};
use crate::ray_tracer_owner::RayTracerOwner;
use crate::scene::Scene;
use crate::shape::ShapeRef;

// Generalizes the teacher's BVH-backed `VisibilityTester` (a single
// any-intersect query) into the arena-driven shadow probe a path tracer's
// direct-lighting term needs: reuse one inner `RayTracer` across probes,
// treat near-zero self-intersections within `epsilon` as not occluding.

pub struct VisibilityTester {
    owner: RayTracerOwner,
    epsilon: f32,
}

impl VisibilityTester {
    pub fn new(epsilon: f32) -> Self {
        Self { owner: RayTracerOwner::new(), epsilon }
    }

    /// `true` iff no hit falls in the open interval `(epsilon, distance -
    /// epsilon)` — ties at either endpoint count as "the light is reached".
    pub fn test_visibility(&mut self, scene: &dyn Scene, ray: Ray, distance: f32) -> Result<bool> {
        let rt = self.ray_tracer_for(scene, ray)?;
        rt.sort();

        let lower = self.epsilon;
        let upper = distance - self.epsilon;
        loop {
            match rt.get_next_shape_hit() {
                Ok(hit) => {
                    if hit.distance > lower && hit.distance < upper {
                        return Ok(false);
                    }
                }
                Err(CoreError::NoMoreData) => return Ok(true),
                Err(e) => return Err(e),
            }
        }
    }

    /// `true` iff no hit lies beyond `epsilon` along `ray`, regardless of
    /// distance.
    pub fn test_visibility_any_distance(&mut self, scene: &dyn Scene, ray: Ray) -> Result<bool> {
        let rt = self.ray_tracer_for(scene, ray)?;
        rt.sort();

        loop {
            match rt.get_next_shape_hit() {
                Ok(hit) => {
                    if hit.distance > self.epsilon {
                        return Ok(false);
                    }
                }
                Err(CoreError::NoMoreData) => return Ok(true),
                Err(e) => return Err(e),
            }
        }
    }

    /// Walks hits toward a light along `ray_to_light`. If the closest hit is
    /// the light's own shape (`self_light_shape`), returns that hit's world
    /// point with `sample_pdf` unchanged; if anything else is closer, the
    /// light is occluded and the pdf collapses to zero.
    pub fn compute_pdf(
        &mut self,
        scene: &dyn Scene,
        ray_to_light: Ray,
        self_light_shape: &ShapeRef,
        sample_pdf: f32,
    ) -> Result<(Option<Point3>, f32)> {
        let rt = self.ray_tracer_for(scene, ray_to_light)?;
        rt.sort();

        let request = HitDecodeRequest { world_hit_point: true, ..Default::default() };
        match rt.get_next_hit(request) {
            Ok(decoding) => {
                if Arc::ptr_eq(decoding.shape_hit.shape, self_light_shape) {
                    Ok((decoding.world_hit_point, sample_pdf))
                } else {
                    Ok((None, 0.0))
                }
            }
            Err(CoreError::NoMoreData) => Ok((None, 0.0)),
            Err(e) => Err(e),
        }
    }

    fn ray_tracer_for(&mut self, scene: &dyn Scene, ray: Ray) -> Result<&mut RayTracer> {
        let rt = self.owner.get_ray_tracer(ray)?;
        scene.trace_into(ray, rt)?;
        Ok(rt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::HitAllocator;
    use crate::hit::HitListChain;
    use crate::math::Vec3;
    use crate::shape::Shape;

    struct Plane {
        z: f32,
    }

    impl Shape for Plane {
        fn trace(&self, ray: &Ray, hit_allocator: &mut HitAllocator) -> Result<Option<HitListChain>> {
            if ray.direction.z.abs() < 1e-9 {
                return Ok(None);
            }
            let t = (self.z - ray.origin.z) / ray.direction.z;
            if t <= 0.0 {
                return Ok(None);
            }
            Ok(Some(hit_allocator.allocate(None, t, 0, &[], 1)?))
        }
    }

    struct OnePlaneScene(ShapeRef);
    impl Scene for OnePlaneScene {
        fn trace_into(&self, _world_ray: Ray, ray_tracer: &mut RayTracer) -> Result<()> {
            ray_tracer.trace_shape(&self.0)
        }
    }

    #[test]
    fn occluding_plane_blocks_visibility() {
        let scene = OnePlaneScene(Arc::new(Plane { z: 0.5 }));
        let mut tester = VisibilityTester::new(1e-4);
        let ray = Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0);
        assert!(!tester.test_visibility(&scene, ray, 1.0).unwrap());
    }

    #[test]
    fn plane_behind_the_light_does_not_occlude() {
        let scene = OnePlaneScene(Arc::new(Plane { z: 5.0 }));
        let mut tester = VisibilityTester::new(1e-4);
        let ray = Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0);
        assert!(tester.test_visibility(&scene, ray, 1.0).unwrap());
    }

    #[test]
    fn compute_pdf_returns_zero_when_something_else_is_closer() {
        struct TwoShapeScene(ShapeRef, ShapeRef);
        impl Scene for TwoShapeScene {
            fn trace_into(&self, _world_ray: Ray, ray_tracer: &mut RayTracer) -> Result<()> {
                ray_tracer.trace_shape(&self.0)?;
                ray_tracer.trace_shape(&self.1)
            }
        }

        let light_shape: ShapeRef = Arc::new(Plane { z: 2.0 });
        let occluder: ShapeRef = Arc::new(Plane { z: 1.0 });
        let scene = TwoShapeScene(Arc::clone(&light_shape), occluder);
        let mut tester = VisibilityTester::new(1e-4);
        let ray = Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0);
        let (point, pdf) = tester.compute_pdf(&scene, ray, &light_shape, 2.0).unwrap();
        assert_eq!(pdf, 0.0);
        assert!(point.is_none());
    }
}
