use std::sync::Arc;

use rand_pcg::Pcg32;

use crate::error::Result;
use crate::math::{Point3, Ray, Vec3};
use crate::scene::Scene;
use crate::spectrum::{SpectrumCompositor, SpectrumHandle};
use crate::visibility::VisibilityTester;

// External collaborator contract: concrete lights (point, distant, area,
// ...) are out of scope; the integrator and light sampler only depend on
// these three methods.

pub trait Light: Send + Sync {
    /// Samples an incoming direction toward this light from `world_hit_point`,
    /// returning its contribution, the direction to sample along, and the
    /// pdf of having chosen that direction (`f32::INFINITY` for a delta light).
    fn sample(
        &self,
        world_hit_point: Point3,
        visibility_tester: &mut VisibilityTester,
        scene: &dyn Scene,
        rng: &mut Pcg32,
        spectrum_compositor: &mut SpectrumCompositor,
    ) -> Result<(Option<SpectrumHandle>, Vec3, f32)>;

    /// Emitted radiance along `ray_to_light`, with no pdf attached — used
    /// when a bounced ray happens to hit this light directly.
    fn compute_emissive(
        &self,
        ray_to_light: Ray,
        visibility_tester: &mut VisibilityTester,
        scene: &dyn Scene,
        spectrum_compositor: &mut SpectrumCompositor,
    ) -> Result<Option<SpectrumHandle>>;

    /// Like [`Self::compute_emissive`] but also returns the pdf of having
    /// sampled `ray_to_light`'s direction from its origin, for MIS weighting.
    fn compute_emissive_with_pdf(
        &self,
        ray_to_light: Ray,
        visibility_tester: &mut VisibilityTester,
        scene: &dyn Scene,
        spectrum_compositor: &mut SpectrumCompositor,
    ) -> Result<(Option<SpectrumHandle>, f32)>;
}

pub type LightHandle = Arc<dyn Light>;
