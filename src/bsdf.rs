use std::ptr::NonNull;
use std::sync::Arc;

use rand_pcg::Pcg32;

use crate::arena::StaticArena;
use crate::math::{Normal, Vec3};
use crate::spectrum::Reflector;

// Based on examples/sndels-yuki's `materials::bsdfs::BxDF`/`Bsdf` pair,
// generalized to the six-method contract a path tracer with explicit pdfs
// and delta distributions needs, and arena-scoped per integrator call
// instead of living in a `Vec<Box<dyn BxDF>>` owned by the surface
// interaction.

/// Result of sampling an outgoing direction from a BSDF.
pub struct BsdfSample {
    pub reflector: Option<Arc<dyn Reflector>>,
    pub outgoing: Vec3,
    /// Per-solid-angle pdf; `f32::INFINITY` marks a delta distribution.
    pub pdf: f32,
}

/// A bidirectional scattering distribution function attached to one
/// material evaluation. The `_with_lambertian_falloff` variants fold in the
/// `|cos θ|` term against the geometric normal; their default
/// implementations derive it from the plain variants, so most concrete
/// BSDFs only need to implement `sample`, `compute_reflectance`, and
/// `compute_reflectance_with_pdf`.
pub trait Bsdf: Send + Sync {
    fn sample(&self, incoming: Vec3, normal: Normal, rng: &mut Pcg32) -> BsdfSample;

    fn compute_reflectance(&self, incoming: Vec3, outgoing: Vec3, normal: Normal) -> Option<Arc<dyn Reflector>>;

    fn compute_reflectance_with_pdf(
        &self,
        incoming: Vec3,
        outgoing: Vec3,
        normal: Normal,
    ) -> (Option<Arc<dyn Reflector>>, f32);

    fn sample_with_lambertian_falloff(&self, incoming: Vec3, normal: Normal, rng: &mut Pcg32) -> BsdfSample {
        let mut sample = self.sample(incoming, normal, rng);
        let cos_theta = normal.dot_v(sample.outgoing).abs();
        sample.reflector = scale_reflector(sample.reflector, cos_theta);
        sample
    }

    fn compute_reflectance_with_lambertian_falloff(
        &self,
        incoming: Vec3,
        outgoing: Vec3,
        normal: Normal,
    ) -> Option<Arc<dyn Reflector>> {
        let reflectance = self.compute_reflectance(incoming, outgoing, normal);
        scale_reflector(reflectance, normal.dot_v(outgoing).abs())
    }

    fn compute_reflectance_with_pdf_with_lambertian_falloff(
        &self,
        incoming: Vec3,
        outgoing: Vec3,
        normal: Normal,
    ) -> (Option<Arc<dyn Reflector>>, f32) {
        let (reflectance, pdf) = self.compute_reflectance_with_pdf(incoming, outgoing, normal);
        (scale_reflector(reflectance, normal.dot_v(outgoing).abs()), pdf)
    }
}

struct ScaledReflector {
    inner: Arc<dyn Reflector>,
    scale: f32,
}

impl Reflector for ScaledReflector {
    fn reflect(&self, wavelength: f32, incoming: f32) -> f32 {
        self.scale * self.inner.reflect(wavelength, incoming)
    }
}

fn scale_reflector(reflector: Option<Arc<dyn Reflector>>, scale: f32) -> Option<Arc<dyn Reflector>> {
    reflector.map(|inner| Arc::new(ScaledReflector { inner, scale }) as Arc<dyn Reflector>)
}

/// A handle to an arena-allocated BSDF. Valid until the owning
/// [`BsdfAllocator`]'s next `clear`.
#[derive(Copy, Clone)]
pub struct BsdfHandle(NonNull<Box<dyn Bsdf>>);

impl BsdfHandle {
    pub fn get(&self) -> &dyn Bsdf {
        // SAFETY: the allocator that produced this handle keeps the backing
        // arena alive, and clears it only between samples.
        unsafe { self.0.as_ref().as_ref() }
    }
}

/// Arena scoped to one integrator call: every BSDF a material constructs
/// during that call is bump-allocated here and freed together at the end of
/// the sample.
pub struct BsdfAllocator {
    arena: StaticArena<Box<dyn Bsdf>>,
}

impl BsdfAllocator {
    pub fn new() -> Self {
        Self { arena: StaticArena::new() }
    }

    pub fn allocate<B: Bsdf + 'static>(&mut self, bsdf: B) -> BsdfHandle {
        BsdfHandle(self.arena.alloc(Box::new(bsdf)))
    }

    pub fn clear(&mut self) {
        self.arena.free_all();
    }
}

impl Default for BsdfAllocator {
    fn default() -> Self {
        Self::new()
    }
}
