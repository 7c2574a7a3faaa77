use std::ptr::NonNull;

use crate::arena::{DynamicArena, StaticArena};
use crate::error::{CoreError, Result};
use crate::math::{MatrixHandle, Point3, Ray};
use crate::shape::ShapeRef;

/// Per-shape-per-ray metadata shared by every hit that shape's `trace`
/// produced. `premultiplied = true` means the world ray was traced directly
/// (no inverse transform), so model-space quantities must be derived on
/// demand from `model_to_world`.
pub struct SharedHitData {
    pub model_to_world: Option<MatrixHandle>,
    pub premultiplied: bool,
    pub model_ray: Ray,
}

/// One intersection. Allocated from a ray tracer's static arena; stable
/// until that arena's next `free_all`. `shape` and `shared` are filled in by
/// the ray tracer once the shape's trace call has returned its whole chain —
/// a shape never needs to know its own `ShapeRef` or the transform it was
/// traced under.
pub struct HitRecord {
    shape: Option<ShapeRef>,
    shared: Option<NonNull<SharedHitData>>,
    pub distance: f32,
    pub face: i32,
    additional_data: NonNull<u8>,
    additional_data_len: usize,
    precomputed_world_hit_point: Option<Point3>,
    next: Option<NonNull<HitRecord>>,
}

impl HitRecord {
    pub fn additional_data(&self) -> &[u8] {
        if self.additional_data_len == 0 {
            &[]
        } else {
            // SAFETY: these bytes were copied in by `HitAllocator::allocate*`
            // and live in the ray tracer's dynamic arena, which outlives this
            // record until the next `free_all`.
            unsafe { std::slice::from_raw_parts(self.additional_data.as_ptr(), self.additional_data_len) }
        }
    }

    pub fn precomputed_world_hit_point(&self) -> Option<Point3> {
        self.precomputed_world_hit_point
    }

    pub fn shape(&self) -> &ShapeRef {
        self.shape.as_ref().expect("hit record read before the ray tracer stamped it")
    }

    pub fn shared(&self) -> &SharedHitData {
        // SAFETY: `shared` points into the same arena generation as `self`;
        // both are cleared together on `free_all`.
        unsafe {
            self.shared
                .expect("hit record read before the ray tracer stamped it")
                .as_ref()
        }
    }

    pub(crate) fn next(&self) -> Option<NonNull<HitRecord>> {
        self.next
    }

    pub(crate) fn stamp(&mut self, shape: ShapeRef, shared: NonNull<SharedHitData>) {
        self.shape = Some(shape);
        self.shared = Some(shared);
    }
}

/// A singly-linked chain of not-yet-stamped hits, returned to a shape's
/// `trace` so it can report more than one intersection per call.
pub type HitListChain = NonNull<HitRecord>;

/// Handed to `Shape::trace`. Carves hit records out of a static arena and
/// their variable-length `additional_data` out of a dynamic arena, both
/// owned by the ray tracer driving the trace.
pub struct HitAllocator<'a> {
    hits: &'a mut StaticArena<HitRecord>,
    bytes: &'a mut DynamicArena,
}

impl<'a> HitAllocator<'a> {
    pub(crate) fn new(hits: &'a mut StaticArena<HitRecord>, bytes: &'a mut DynamicArena) -> Self {
        Self { hits, bytes }
    }

    pub fn allocate(
        &mut self,
        next: Option<HitListChain>,
        distance: f32,
        face: i32,
        additional_data: &[u8],
        additional_data_align: usize,
    ) -> Result<HitListChain> {
        self.allocate_impl(next, distance, face, additional_data, additional_data_align, None)
    }

    pub fn allocate_with_hit_point(
        &mut self,
        next: Option<HitListChain>,
        distance: f32,
        face: i32,
        additional_data: &[u8],
        additional_data_align: usize,
        world_hit_point: Point3,
    ) -> Result<HitListChain> {
        self.allocate_impl(
            next,
            distance,
            face,
            additional_data,
            additional_data_align,
            Some(world_hit_point),
        )
    }

    fn allocate_impl(
        &mut self,
        next: Option<HitListChain>,
        distance: f32,
        face: i32,
        additional_data: &[u8],
        additional_data_align: usize,
        precomputed_world_hit_point: Option<Point3>,
    ) -> Result<HitListChain> {
        if !distance.is_finite() {
            debug_assert!(false, "HitAllocator::allocate called with a non-finite distance");
            return Err(CoreError::InvalidArgument);
        }

        let additional_data_ptr = if additional_data.is_empty() {
            NonNull::dangling()
        } else {
            let align = additional_data_align.max(1);
            let ptr = self.bytes.alloc(additional_data.len(), align);
            // SAFETY: `ptr` was just reserved for exactly this many bytes.
            unsafe {
                std::ptr::copy_nonoverlapping(additional_data.as_ptr(), ptr.as_ptr(), additional_data.len());
            }
            ptr
        };

        let record = HitRecord {
            shape: None,
            shared: None,
            distance,
            face,
            additional_data: additional_data_ptr,
            additional_data_len: additional_data.len(),
            precomputed_world_hit_point,
            next,
        };
        Ok(self.hits.alloc(record))
    }
}
