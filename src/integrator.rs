use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::bsdf::BsdfAllocator;
use crate::color::{Color3, Color4};
use crate::error::Result;
use crate::light_sampler::{LightSampler, NextSample};
use crate::material::Intersection;
use crate::math::{Normal, Point3, Ray, Vec3};
use crate::ray_tracer::{HitDecodeRequest, RayTracer};
use crate::scene::Scene;
use crate::spectrum::SpectrumCompositor;
use crate::visibility::VisibilityTester;

// Based on examples/sndels-yuki's `integrators::path::Path::li_internal`
// (throughput accumulation, Russian roulette past a starting bounce count,
// light-sampling with MIS against the BSDF pdf), reshaped from a loop over
// one shared BVH into explicit recursion over a pre-allocated per-depth
// stack of ray tracers/compositors/BSDF allocators, per the arena
// discipline the core's components already establish.

/// Wavelengths at which a composited spectrum is materialized into RGB. Not
/// a claim of spectral accuracy — just a fixed hero-wavelength sampling the
/// same way teacher's `Spectrum<T>` RGB channels stand in for a continuous
/// distribution.
const WAVELENGTH_R: f32 = 611.0;
const WAVELENGTH_G: f32 = 549.0;
const WAVELENGTH_B: f32 = 466.0;

/// Integrator tunables, mirroring teacher's `integrators::path::Params`.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Params {
    pub max_depth: u8,
    /// `0` disables Russian roulette entirely.
    pub rr_start_depth: u8,
    pub min_continue: f32,
    pub max_continue: f32,
    /// Hits at or below this distance from a shading point are treated as
    /// self-intersection and skipped.
    pub epsilon: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self { max_depth: 5, rr_start_depth: 3, min_continue: 0.05, max_continue: 1.0, epsilon: 1e-4 }
    }
}

fn spectrum_to_color3(compositor: &SpectrumCompositor, handle: Option<crate::spectrum::SpectrumHandle>) -> Color3 {
    Color3::new(
        compositor.sample(handle, WAVELENGTH_R),
        compositor.sample(handle, WAVELENGTH_G),
        compositor.sample(handle, WAVELENGTH_B),
    )
}

/// The divisor applied to `f_r · cos θ` when weighting a light-sampled
/// direct-lighting term against the BSDF's own pdf at the same direction. A
/// delta-distributed side (`f32::INFINITY`) can't be hit by the other
/// strategy, so MIS degenerates to the plain single-strategy estimator
/// instead of the general balance-heuristic product.
fn light_sample_factor(p_l: f32, p_bsdf: f32) -> f32 {
    if p_l.is_infinite() {
        1.0
    } else if p_bsdf.is_infinite() {
        0.0
    } else {
        1.0 / (p_l * p_bsdf)
    }
}

/// Recursion-bounded path tracer. Owns a fixed stack of per-depth ray
/// tracers, spectrum compositors, and BSDF allocators, all allocated once at
/// construction and reused sample after sample.
pub struct Integrator {
    params: Params,
    ray_tracers: Vec<RayTracer>,
    compositors: Vec<SpectrumCompositor>,
    bsdf_allocators: Vec<BsdfAllocator>,
}

impl Integrator {
    pub fn new(params: Params) -> Self {
        let depth_count = params.max_depth as usize + 1;
        Self {
            params,
            ray_tracers: (0..depth_count).map(|_| RayTracer::new()).collect(),
            compositors: (0..depth_count).map(|_| SpectrumCompositor::new()).collect(),
            bsdf_allocators: (0..depth_count).map(|_| BsdfAllocator::new()).collect(),
        }
    }

    /// Entry point for one camera sample. Materializes the result to RGB
    /// before clearing every depth's arenas, since the clear would otherwise
    /// invalidate a handle returned into depth 0's compositor.
    pub fn integrate(
        &mut self,
        world_ray: Ray,
        throughput_in: Color3,
        scene: &dyn Scene,
        light_sampler: &mut LightSampler,
        visibility_tester: &mut VisibilityTester,
        rng: &mut Pcg32,
    ) -> Result<Color3> {
        let handle = self.integrate_at_depth(world_ray, throughput_in, 0, scene, light_sampler, visibility_tester, rng)?;
        let color = spectrum_to_color3(&self.compositors[0], handle);

        for compositor in &mut self.compositors {
            compositor.clear();
        }
        for allocator in &mut self.bsdf_allocators {
            allocator.clear();
        }

        Ok(color)
    }

    fn integrate_at_depth(
        &mut self,
        world_ray: Ray,
        path_throughput: Color3,
        depth: u8,
        scene: &dyn Scene,
        light_sampler: &mut LightSampler,
        visibility_tester: &mut VisibilityTester,
        rng: &mut Pcg32,
    ) -> Result<Option<crate::spectrum::SpectrumHandle>> {
        let mut throughput = path_throughput;

        // Steps 1-2: Russian-roulette continuation probability.
        let p_c = if self.params.rr_start_depth == 0 || depth < self.params.rr_start_depth {
            1.0
        } else {
            throughput.avg().clamp(self.params.min_continue, self.params.max_continue)
        };
        if p_c <= 0.0 {
            log::trace!("depth {}: Russian roulette probability hit zero, terminating path", depth);
            return Ok(None);
        }
        if p_c < 1.0 {
            let u: f32 = rng.gen();
            if u >= p_c {
                log::trace!("depth {}: Russian roulette killed path (p_c = {})", depth, p_c);
                return Ok(None);
            }
            throughput = throughput / p_c;
        }

        // Step 3: trace and sort against this depth's own ray tracer.
        let d = depth as usize;
        self.ray_tracers[d].set_ray(world_ray, false)?;
        scene.trace_into(world_ray, &mut self.ray_tracers[d])?;
        self.ray_tracers[d].sort();

        let request = HitDecodeRequest { model_hit_point: true, model_viewer: true, world_hit_point: true, model_to_world: false };

        // Step 4: walk hits in distance order, alpha-over-blending results.
        let mut accum = Color4::transparent();
        loop {
            if accum.alpha >= 1.0 {
                break;
            }
            let decoding = match self.ray_tracers[d].get_next_hit(request) {
                Ok(decoding) => decoding,
                Err(crate::error::CoreError::NoMoreData) => break,
                Err(e) => return Err(e),
            };

            if decoding.shape_hit.distance <= self.params.epsilon {
                continue;
            }

            let shape = decoding.shape_hit.shape;
            let face = decoding.shape_hit.face;
            let Some(material) = shape.material_for(face) else {
                log::trace!("depth {}: face {} has no material, skipping hit", depth, face);
                continue;
            };
            let model_hit_point = decoding.model_hit_point.unwrap();
            let Some(normal_vec) = shape.compute_normal(model_hit_point, face) else { continue };
            // Shading happens in the hit's own (model) space. This matches
            // world space exactly for untransformed shapes; a shape traced
            // under a non-identity `model_to_world` would additionally need
            // its normal carried through the inverse-transpose of that
            // transform, which this integrator does not yet do.
            let normal = Normal::from(normal_vec);
            let viewer = -decoding.model_viewer.unwrap();
            let world_hit_point = decoding.world_hit_point.unwrap();

            let intersection = Intersection { model_hit_point, world_hit_point, normal, viewer, face };

            let bsdf_handle = material.sample(
                &intersection,
                decoding.shape_hit.additional_data,
                (0.0, 0.0),
                &mut self.bsdf_allocators[d],
                &mut self.compositors[d],
            );
            let bsdf = bsdf_handle.get();

            let bsdf_sample = bsdf.sample_with_lambertian_falloff(viewer, normal, rng);

            // Emissive term: this hit directly struck a light-carrying face.
            let mut spectrum = if let Some(light) = shape.light_for(face) {
                light.compute_emissive(world_ray, visibility_tester, scene, &mut self.compositors[d])?
            } else {
                None
            };

            // Direct lighting via the light sampler, MIS-weighted against
            // this hit's own BSDF pdf at each sampled direction.
            light_sampler.prepare_samples(world_hit_point);
            loop {
                match light_sampler.next_sample()? {
                    NextSample::Done => break,
                    NextSample::Light(light, p_select) => {
                        let (light_spectrum, to_light, p_direction) =
                            light.sample(world_hit_point, visibility_tester, scene, rng, &mut self.compositors[d])?;
                        if light_spectrum.is_none() {
                            continue;
                        }
                        let (reflector, p_bsdf) =
                            bsdf.compute_reflectance_with_pdf_with_lambertian_falloff(viewer, to_light, normal);
                        // The light-sampling strategy's total pdf for this
                        // direction is the chance of picking this light times
                        // the chance of picking this direction on it.
                        let p_l = p_select * p_direction;
                        let factor = light_sample_factor(p_l, p_bsdf);
                        if factor <= 0.0 {
                            continue;
                        }
                        let term = self.compositors[d].attenuated_reflect(reflector, light_spectrum, factor);
                        spectrum = self.compositors[d].sum(spectrum, term);
                    }
                }
            }

            // Indirect bounce: materialized to RGB immediately on return, so
            // no spectrum handle ever crosses a depth boundary.
            let indirect_color = if bsdf_sample.pdf > 0.0 && depth < self.params.max_depth {
                if let Some(reflector) = &bsdf_sample.reflector {
                    let tint = Color3::new(
                        reflector.reflect(WAVELENGTH_R, 1.0),
                        reflector.reflect(WAVELENGTH_G, 1.0),
                        reflector.reflect(WAVELENGTH_B, 1.0),
                    );
                    let pdf_factor = if bsdf_sample.pdf.is_infinite() { 1.0 } else { 1.0 / bsdf_sample.pdf };
                    let next_throughput = throughput * tint * pdf_factor;
                    let next_ray = Ray::new(world_hit_point, bsdf_sample.outgoing, world_ray.time);
                    let next_depth = depth + 1;
                    let handle = self.integrate_at_depth(
                        next_ray,
                        next_throughput,
                        next_depth,
                        scene,
                        light_sampler,
                        visibility_tester,
                        rng,
                    )?;
                    Some(spectrum_to_color3(&self.compositors[next_depth as usize], handle))
                } else {
                    None
                }
            } else {
                None
            };

            let mut color = spectrum_to_color3(&self.compositors[d], spectrum);
            if let Some(indirect) = indirect_color {
                color = color + indirect;
            }

            let hit_color = Color4::new(color, material.translucency());
            accum = hit_color.over(accum);
        }

        // Promote `accum` back into a lazy spectrum so the caller's own
        // alpha-over blending composes uniformly whether it's looking at a
        // leaf hit or a recursive bounce's result.
        let result = self.compositors[d]
            .leaf(std::sync::Arc::new(ConstantSpectrum(accum.rgb)) as std::sync::Arc<dyn crate::spectrum::Spectrum>);

        // Step 5: unbias the stochastic termination.
        let result = if p_c < 1.0 { self.compositors[d].attenuate(Some(result), 1.0 / p_c) } else { Some(result) };

        // Step 6: scale by the throughput carried into this depth.
        let scaled = self.compositors[d].attenuate(result, throughput.avg());
        Ok(scaled)
    }
}

/// A constant-per-channel spectrum used only to carry an already-materialized
/// RGB value (a resolved `accum` or a finished recursive bounce) back into
/// the lazy compositor tree at the wavelengths `spectrum_to_color3` samples.
struct ConstantSpectrum(Color3);

impl crate::spectrum::Spectrum for ConstantSpectrum {
    fn sample(&self, wavelength: f32) -> f32 {
        if wavelength <= (WAVELENGTH_B + WAVELENGTH_G) / 2.0 {
            self.0.b
        } else if wavelength <= (WAVELENGTH_G + WAVELENGTH_R) / 2.0 {
            self.0.g
        } else {
            self.0.r
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsdf::{Bsdf, BsdfSample};
    use crate::hit::HitAllocator;
    use crate::light::Light;
    use crate::material::Material;
    use crate::shape::{Shape, ShapeRef};
    use crate::spectrum::{Reflector, Spectrum, SpectrumHandle};
    use rand::SeedableRng;
    use std::sync::Arc;

    struct EmptyScene;
    impl Scene for EmptyScene {
        fn trace_into(&self, _world_ray: Ray, _ray_tracer: &mut RayTracer) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn a_ray_hitting_nothing_returns_black() {
        let mut integrator = Integrator::new(Params::default());
        let mut light_sampler = LightSampler::new(vec![]);
        let mut visibility_tester = VisibilityTester::new(1e-4);
        let mut rng = Pcg32::seed_from_u64(0);
        let ray = Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0);

        let color = integrator
            .integrate(ray, Color3::ones(), &EmptyScene, &mut light_sampler, &mut visibility_tester, &mut rng)
            .unwrap();

        assert_eq!(color, Color3::zeros());
    }

    struct ConstantEmission(f32);
    impl Spectrum for ConstantEmission {
        fn sample(&self, _wavelength: f32) -> f32 {
            self.0
        }
    }

    struct EmissiveMatte;
    impl Bsdf for EmissiveMatte {
        fn sample(&self, _incoming: Vec3, normal: Normal, _rng: &mut Pcg32) -> BsdfSample {
            BsdfSample { reflector: None, outgoing: Vec3::from(normal), pdf: 0.0 }
        }
        fn compute_reflectance(&self, _incoming: Vec3, _outgoing: Vec3, _normal: Normal) -> Option<Arc<dyn Reflector>> {
            None
        }
        fn compute_reflectance_with_pdf(
            &self,
            _incoming: Vec3,
            _outgoing: Vec3,
            _normal: Normal,
        ) -> (Option<Arc<dyn Reflector>>, f32) {
            (None, 0.0)
        }
    }

    struct EmissiveMaterial;
    impl Material for EmissiveMaterial {
        fn sample(
            &self,
            _intersection: &Intersection,
            _additional_data: &[u8],
            _texture_coords: (f32, f32),
            bsdf_allocator: &mut BsdfAllocator,
            _reflector_compositor: &mut SpectrumCompositor,
        ) -> crate::bsdf::BsdfHandle {
            bsdf_allocator.allocate(EmissiveMatte)
        }
    }

    struct SelfLight;
    impl Light for SelfLight {
        fn sample(
            &self,
            _world_hit_point: Point3,
            _visibility_tester: &mut VisibilityTester,
            _scene: &dyn Scene,
            _rng: &mut Pcg32,
            _spectrum_compositor: &mut SpectrumCompositor,
        ) -> Result<(Option<SpectrumHandle>, Vec3, f32)> {
            Ok((None, Vec3::new(0.0, 0.0, 1.0), f32::INFINITY))
        }
        fn compute_emissive(
            &self,
            _ray_to_light: Ray,
            _visibility_tester: &mut VisibilityTester,
            _scene: &dyn Scene,
            spectrum_compositor: &mut SpectrumCompositor,
        ) -> Result<Option<SpectrumHandle>> {
            Ok(Some(spectrum_compositor.leaf(Arc::new(ConstantEmission(2.0)))))
        }
        fn compute_emissive_with_pdf(
            &self,
            _ray_to_light: Ray,
            _visibility_tester: &mut VisibilityTester,
            _scene: &dyn Scene,
            spectrum_compositor: &mut SpectrumCompositor,
        ) -> Result<(Option<SpectrumHandle>, f32)> {
            Ok((Some(spectrum_compositor.leaf(Arc::new(ConstantEmission(2.0)))), f32::INFINITY))
        }
    }

    struct EmissivePlane {
        z: f32,
    }
    impl Shape for EmissivePlane {
        fn trace(&self, ray: &Ray, hit_allocator: &mut HitAllocator) -> Result<Option<crate::hit::HitListChain>> {
            if ray.direction.z.abs() < 1e-9 {
                return Ok(None);
            }
            let t = (self.z - ray.origin.z) / ray.direction.z;
            if t <= 0.0 {
                return Ok(None);
            }
            Ok(Some(hit_allocator.allocate(None, t, 0, &[], 1)?))
        }
        fn compute_normal(&self, _model_hit_point: Point3, _face: i32) -> Option<Vec3> {
            Some(Vec3::new(0.0, 0.0, -1.0))
        }
        fn material_for(&self, _face: i32) -> Option<crate::material::MaterialHandle> {
            Some(Arc::new(EmissiveMaterial))
        }
        fn light_for(&self, _face: i32) -> Option<crate::light::LightHandle> {
            Some(Arc::new(SelfLight))
        }
    }

    struct OneShapeScene(ShapeRef);
    impl Scene for OneShapeScene {
        fn trace_into(&self, _world_ray: Ray, ray_tracer: &mut RayTracer) -> Result<()> {
            ray_tracer.trace_shape(&self.0)
        }
    }

    #[test]
    fn a_directly_hit_light_contributes_its_emission() {
        let mut params = Params::default();
        params.rr_start_depth = 0;
        let mut integrator = Integrator::new(params);
        let scene = OneShapeScene(Arc::new(EmissivePlane { z: 2.0 }));
        let mut light_sampler = LightSampler::new(vec![]);
        let mut visibility_tester = VisibilityTester::new(1e-4);
        let mut rng = Pcg32::seed_from_u64(1);
        let ray = Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0);

        let color = integrator
            .integrate(ray, Color3::ones(), &scene, &mut light_sampler, &mut visibility_tester, &mut rng)
            .unwrap();

        assert_eq!(color, Color3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn repeated_misses_are_deterministically_black_regardless_of_throughput() {
        let mut params = Params::default();
        params.rr_start_depth = 0;
        let mut integrator = Integrator::new(params);
        let scene = EmptyScene;
        let mut light_sampler = LightSampler::new(vec![]);
        let mut visibility_tester = VisibilityTester::new(1e-4);
        let mut rng = Pcg32::seed_from_u64(2);
        let ray = Ray::new(Point3::zeros(), Vec3::new(0.0, 0.0, 1.0), 0.0);

        for _ in 0..8 {
            let color = integrator
                .integrate(ray, Color3::new(0.01, 0.01, 0.01), &scene, &mut light_sampler, &mut visibility_tester, &mut rng)
                .unwrap();
            assert_eq!(color, Color3::zeros());
        }
    }
}
