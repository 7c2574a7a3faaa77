use std::ptr::NonNull;
use std::sync::Arc;

use crate::arena::{DynamicArena, StaticArena};
use crate::error::{CoreError, Result};
use crate::hit::{HitAllocator, HitRecord, SharedHitData};
use crate::math::{MatrixHandle, Point3, Ray, Vec3};
use crate::pointer_list::PointerList;
use crate::shape::ShapeRef;

// Based on examples/original_source/iris/inc/iris_raytracer.h's
// `RAYTRACER` opaque object and its `RayTracerSetRay` /
// `RayTracerTraceGeometry[WithTransform]` / `RayTracerSort` /
// `RayTracerGetNextShapeHit` / `RayTracerGetNextHit` entry points.

/// Tracks which phase of a trace the ray tracer is in, purely to back
/// `debug_assert`s — nothing here is enforced in release builds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Fresh,
    Set,
    Traced,
    Sorted,
    Iterated,
}

/// One accumulated hit, decoded back out for a caller walking in sorted
/// order. Borrows from the ray tracer, so it cannot outlive the next
/// `set_ray`/`trace_shape*` call.
pub struct ShapeHit<'a> {
    pub distance: f32,
    pub face: i32,
    pub additional_data: &'a [u8],
    pub shape: &'a ShapeRef,
}

/// Which of `get_next_hit`'s optional decodings the caller actually wants;
/// skipping the rest avoids needless matrix multiplies.
#[derive(Debug, Copy, Clone, Default)]
pub struct HitDecodeRequest {
    pub model_viewer: bool,
    pub model_hit_point: bool,
    pub world_hit_point: bool,
    pub model_to_world: bool,
}

impl HitDecodeRequest {
    pub fn all() -> Self {
        Self { model_viewer: true, model_hit_point: true, world_hit_point: true, model_to_world: true }
    }
}

pub struct HitDecoding<'a> {
    pub shape_hit: ShapeHit<'a>,
    pub model_viewer: Option<Vec3>,
    pub model_hit_point: Option<Point3>,
    pub world_hit_point: Option<Point3>,
    pub model_to_world: Option<MatrixHandle>,
}

/// Accumulates, sorts, and decodes the intersections of one world ray
/// against any number of shapes. Owns the three arenas a trace needs: a
/// static arena for hit records, a static arena for their shared per-shape
/// data, and a dynamic arena for shape-defined `additional_data` bytes.
pub struct RayTracer {
    hit_arena: StaticArena<HitRecord>,
    shared_arena: StaticArena<SharedHitData>,
    byte_arena: DynamicArena,
    hits: PointerList<NonNull<HitRecord>>,
    current_ray: Ray,
    hit_index: usize,
    state: State,
}

impl RayTracer {
    pub fn new() -> Self {
        Self {
            hit_arena: StaticArena::new(),
            shared_arena: StaticArena::new(),
            byte_arena: DynamicArena::new(),
            hits: PointerList::new(),
            current_ray: Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0),
            hit_index: 0,
            state: State::Fresh,
        }
    }

    /// Resets all per-ray state: clears both hit arenas, the dynamic byte
    /// arena, the hit list, and the iteration cursor, then adopts
    /// `world_ray` (normalized in place if `normalize` is set).
    pub fn set_ray(&mut self, world_ray: Ray, normalize: bool) -> Result<()> {
        if world_ray.has_nans() {
            return Err(CoreError::InvalidArgument);
        }

        self.hit_arena.free_all();
        self.shared_arena.free_all();
        self.byte_arena.free_all();
        self.hits.clear();
        self.hit_index = 0;

        self.current_ray = if normalize { world_ray.normalized() } else { world_ray };
        self.state = State::Set;
        Ok(())
    }

    pub fn current_ray(&self) -> Ray {
        self.current_ray
    }

    /// Traces `shape` directly against the current world ray: the hit is
    /// premultiplied (no transform applied), so model-space decoding later
    /// falls back to whatever `model_to_world` the caller supplies out of
    /// band, or is skipped entirely.
    pub fn trace_shape(&mut self, shape: &ShapeRef) -> Result<()> {
        let trace_ray = self.current_ray;
        let shared = SharedHitData { model_to_world: None, premultiplied: true, model_ray: trace_ray };
        self.trace_shape_impl(shape, trace_ray, shared)
    }

    /// Traces `shape` under `model_to_world`. If `premultiplied` is false
    /// the world ray is first pulled into model space via the inverse
    /// transform and the shape is traced there; if true the shape is traced
    /// directly in world space but every hit still carries `model_to_world`
    /// so `get_next_hit` can derive model-space quantities on demand.
    pub fn trace_shape_with_transform(
        &mut self,
        shape: &ShapeRef,
        model_to_world: &MatrixHandle,
        premultiplied: bool,
    ) -> Result<()> {
        let trace_ray =
            if premultiplied { self.current_ray } else { model_to_world.inverse().transform_ray(self.current_ray) };
        let shared =
            SharedHitData { model_to_world: Some(model_to_world.clone()), premultiplied, model_ray: trace_ray };
        self.trace_shape_impl(shape, trace_ray, shared)
    }

    fn trace_shape_impl(&mut self, shape: &ShapeRef, trace_ray: Ray, shared: SharedHitData) -> Result<()> {
        let shared_ptr = self.shared_arena.alloc(shared);

        let mut hit_allocator = HitAllocator::new(&mut self.hit_arena, &mut self.byte_arena);
        let chain = match shape.trace(&trace_ray, &mut hit_allocator) {
            Ok(chain) => chain,
            Err(e) => {
                // No hits were stamped yet; undo the shared-data allocation
                // so an aborted trace leaves nothing dangling.
                log::warn!("shape trace failed: {}", e);
                self.shared_arena.free_last();
                return Err(e);
            }
        };

        match chain {
            None => self.shared_arena.free_last(),
            Some(head) => {
                let mut cursor = Some(head);
                while let Some(mut node_ptr) = cursor {
                    // SAFETY: `node_ptr` was just allocated from
                    // `self.hit_arena` by the `trace` call above and is not
                    // yet reachable from `self.hits`, so this is the only
                    // live reference to it.
                    let node = unsafe { node_ptr.as_mut() };
                    cursor = node.next();
                    node.stamp(Arc::clone(shape), shared_ptr);
                    self.hits.push(node_ptr);
                }
            }
        }

        self.state = State::Traced;
        Ok(())
    }

    /// Sorts accumulated hits by `(distance, shape identity, face)`
    /// ascending. Idempotent; may be called again after more shapes are
    /// traced.
    pub fn sort(&mut self) {
        self.hits.sort_by(|a, b| {
            // SAFETY: both point into `self.hit_arena`, which is not
            // mutated while sorting.
            let ha = unsafe { a.as_ref() };
            let hb = unsafe { b.as_ref() };
            ha.distance
                .partial_cmp(&hb.distance)
                .unwrap_or_else(|| {
                    debug_assert!(false, "hit list contains a NaN distance");
                    std::cmp::Ordering::Equal
                })
                .then_with(|| shape_identity(ha.shape()).cmp(&shape_identity(hb.shape())))
                .then_with(|| ha.face.cmp(&hb.face))
        });
        self.state = State::Sorted;
    }

    /// Returns the next hit in whatever order the hit list is currently in
    /// (insertion order if `sort` hasn't been called yet).
    pub fn get_next_shape_hit(&mut self) -> Result<ShapeHit<'_>> {
        if self.hit_index >= self.hits.len() {
            return Err(CoreError::NoMoreData);
        }
        let ptr = self.hits[self.hit_index];
        self.hit_index += 1;
        self.state = State::Iterated;

        // SAFETY: arena contents are stable until the next `set_ray`.
        let hit = unsafe { ptr.as_ref() };
        Ok(ShapeHit { distance: hit.distance, face: hit.face, additional_data: hit.additional_data(), shape: hit.shape() })
    }

    /// Like [`Self::get_next_shape_hit`], additionally decoding whichever
    /// model/world quantities `request` asks for.
    pub fn get_next_hit(&mut self, request: HitDecodeRequest) -> Result<HitDecoding<'_>> {
        if self.hit_index >= self.hits.len() {
            return Err(CoreError::NoMoreData);
        }
        let ptr = self.hits[self.hit_index];
        self.hit_index += 1;
        self.state = State::Iterated;

        // SAFETY: arena contents are stable until the next `set_ray`.
        let hit = unsafe { ptr.as_ref() };
        let shared = hit.shared();
        let current_ray = self.current_ray;

        let world_hit_point_value =
            hit.precomputed_world_hit_point().unwrap_or_else(|| current_ray.endpoint(hit.distance));

        let (model_hit_point, model_viewer) = if shared.premultiplied {
            match shared.model_to_world.as_ref() {
                // `trace_shape` stamps premultiplied hits with no transform
                // at all: model space and world space coincide.
                None => (
                    request.model_hit_point.then_some(world_hit_point_value),
                    request.model_viewer.then_some(current_ray.direction),
                ),
                Some(model_to_world) => {
                    let inv = model_to_world.inverse();
                    (
                        request.model_hit_point.then(|| inv.transform_point(world_hit_point_value)),
                        request.model_viewer.then(|| inv.transform_vector(current_ray.direction)),
                    )
                }
            }
        } else {
            (
                request.model_hit_point.then(|| shared.model_ray.endpoint(hit.distance)),
                request.model_viewer.then_some(shared.model_ray.direction),
            )
        };

        Ok(HitDecoding {
            shape_hit: ShapeHit {
                distance: hit.distance,
                face: hit.face,
                additional_data: hit.additional_data(),
                shape: hit.shape(),
            },
            model_viewer,
            model_hit_point,
            world_hit_point: request.world_hit_point.then_some(world_hit_point_value),
            model_to_world: if request.model_to_world { shared.model_to_world.clone() } else { None },
        })
    }
}

impl Default for RayTracer {
    fn default() -> Self {
        Self::new()
    }
}

fn shape_identity(shape: &ShapeRef) -> usize {
    Arc::as_ptr(shape) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::HitListChain;

    struct Plane {
        z: f32,
    }

    impl crate::shape::Shape for Plane {
        fn trace(&self, ray: &Ray, hit_allocator: &mut HitAllocator) -> Result<Option<HitListChain>> {
            if ray.direction.z.abs() < 1e-9 {
                return Ok(None);
            }
            let t = (self.z - ray.origin.z) / ray.direction.z;
            if t <= 0.0 {
                return Ok(None);
            }
            let hit = hit_allocator.allocate(None, t, 0, &[], 1)?;
            Ok(Some(hit))
        }
    }

    #[test]
    fn single_plane_hit_reports_distance_and_world_point() {
        let mut rt = RayTracer::new();
        let plane: ShapeRef = Arc::new(Plane { z: 0.0 });
        rt.set_ray(Ray::new(Point3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 1.0), 0.0), false).unwrap();
        rt.trace_shape(&plane).unwrap();
        rt.sort();

        let decoding = rt.get_next_hit(HitDecodeRequest::all()).unwrap();
        assert_eq!(decoding.shape_hit.distance, 1.0);
        assert_eq!(decoding.world_hit_point, Some(Point3::new(0.0, 0.0, 0.0)));
        assert!(rt.get_next_hit(HitDecodeRequest::all()).is_err());
    }

    #[test]
    fn two_planes_iterate_in_sorted_order() {
        let mut rt = RayTracer::new();
        let near: ShapeRef = Arc::new(Plane { z: 1.0 });
        let far: ShapeRef = Arc::new(Plane { z: 2.0 });
        rt.set_ray(Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0), false).unwrap();
        // Trace far first; sort must still put near first.
        rt.trace_shape(&far).unwrap();
        rt.trace_shape(&near).unwrap();
        rt.sort();

        assert_eq!(rt.get_next_shape_hit().unwrap().distance, 1.0);
        assert_eq!(rt.get_next_shape_hit().unwrap().distance, 2.0);
        assert!(matches!(rt.get_next_shape_hit(), Err(CoreError::NoMoreData)));
    }

    #[test]
    fn a_shape_producing_no_hits_leaves_no_dangling_shared_data() {
        let mut rt = RayTracer::new();
        let miss: ShapeRef = Arc::new(Plane { z: -5.0 });
        rt.set_ray(Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0), false).unwrap();
        rt.trace_shape(&miss).unwrap();
        assert_eq!(rt.hits.len(), 0);
    }

    #[test]
    fn premultiplied_and_transformed_traces_agree_on_world_hit_point() {
        let transform = MatrixHandle::translation(Vec3::new(0.0, 0.0, 5.0));
        let plane_world: ShapeRef = Arc::new(Plane { z: 5.0 });
        let plane_model: ShapeRef = Arc::new(Plane { z: 0.0 });

        let mut rt_premultiplied = RayTracer::new();
        rt_premultiplied
            .set_ray(Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0), false)
            .unwrap();
        rt_premultiplied.trace_shape_with_transform(&plane_world, &transform, true).unwrap();
        rt_premultiplied.sort();
        let a = rt_premultiplied.get_next_hit(HitDecodeRequest::all()).unwrap();

        let mut rt_transformed = RayTracer::new();
        rt_transformed.set_ray(Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0), false).unwrap();
        rt_transformed.trace_shape_with_transform(&plane_model, &transform, false).unwrap();
        rt_transformed.sort();
        let b = rt_transformed.get_next_hit(HitDecodeRequest::all()).unwrap();

        assert!(
            approx::abs_diff_eq!(a.world_hit_point.unwrap().z, b.world_hit_point.unwrap().z, epsilon = 1e-4)
        );
    }

    #[test]
    fn trace_order_does_not_affect_sorted_result() {
        let mut forward = RayTracer::new();
        let a: ShapeRef = Arc::new(Plane { z: 1.0 });
        let b: ShapeRef = Arc::new(Plane { z: 2.0 });
        forward.set_ray(Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0), false).unwrap();
        forward.trace_shape(&a).unwrap();
        forward.trace_shape(&b).unwrap();
        forward.sort();

        let mut backward = RayTracer::new();
        backward.set_ray(Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0), false).unwrap();
        backward.trace_shape(&b).unwrap();
        backward.trace_shape(&a).unwrap();
        backward.sort();

        assert_eq!(
            forward.get_next_shape_hit().unwrap().distance,
            backward.get_next_shape_hit().unwrap().distance
        );
        assert_eq!(
            forward.get_next_shape_hit().unwrap().distance,
            backward.get_next_shape_hit().unwrap().distance
        );
    }

}
