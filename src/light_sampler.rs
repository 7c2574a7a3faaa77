use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::light::LightHandle;
use crate::math::Point3;

// Based on examples/original_source/iris/src/light_sampler.c's
// prepare/iterate pattern: select a candidate set once per shading point,
// then hand them out one at a time with a selection pdf.

pub enum NextSample {
    Light(LightHandle, f32),
    Done,
}

/// Selects, per shading point, which lights are worth sampling and in what
/// order. This implementation enumerates every light uniformly; a scene
/// with bounding-volume culling would override the candidate selection in
/// `prepare_samples` without changing the `next_sample` contract.
pub struct LightSampler {
    lights: Vec<LightHandle>,
    prepared: bool,
    cursor: usize,
}

impl LightSampler {
    pub fn new(lights: Vec<LightHandle>) -> Self {
        Self { lights, prepared: false, cursor: 0 }
    }

    /// Selects candidates for `shading_point`. Must be called before
    /// `next_sample`; resets the iteration cursor even if already prepared.
    pub fn prepare_samples(&mut self, _shading_point: Point3) {
        self.cursor = 0;
        self.prepared = true;
    }

    /// Returns the next candidate light and its uniform selection pdf, or
    /// `Done` once every candidate has been yielded. Becomes unprepared on
    /// `Done`; calling this again without a fresh `prepare_samples` is
    /// `InvalidArgument`.
    pub fn next_sample(&mut self) -> Result<NextSample> {
        if !self.prepared {
            return Err(CoreError::InvalidArgument);
        }
        if self.cursor >= self.lights.len() {
            self.prepared = false;
            return Ok(NextSample::Done);
        }
        let light = Arc::clone(&self.lights[self.cursor]);
        self.cursor += 1;
        let pdf = 1.0 / self.lights.len() as f32;
        Ok(NextSample::Light(light, pdf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;
    use crate::spectrum::SpectrumCompositor;
    use crate::visibility::VisibilityTester;
    use rand_pcg::Pcg32;

    struct Stub;
    impl crate::light::Light for Stub {
        fn sample(
            &self,
            _world_hit_point: Point3,
            _visibility_tester: &mut VisibilityTester,
            _scene: &dyn Scene,
            _rng: &mut Pcg32,
            _spectrum_compositor: &mut SpectrumCompositor,
        ) -> Result<(Option<crate::spectrum::SpectrumHandle>, crate::math::Vec3, f32)> {
            unimplemented!()
        }
        fn compute_emissive(
            &self,
            _ray_to_light: crate::math::Ray,
            _visibility_tester: &mut VisibilityTester,
            _scene: &dyn Scene,
            _spectrum_compositor: &mut SpectrumCompositor,
        ) -> Result<Option<crate::spectrum::SpectrumHandle>> {
            unimplemented!()
        }
        fn compute_emissive_with_pdf(
            &self,
            _ray_to_light: crate::math::Ray,
            _visibility_tester: &mut VisibilityTester,
            _scene: &dyn Scene,
            _spectrum_compositor: &mut SpectrumCompositor,
        ) -> Result<(Option<crate::spectrum::SpectrumHandle>, f32)> {
            unimplemented!()
        }
    }

    #[test]
    fn next_sample_before_prepare_is_invalid_argument() {
        let mut sampler = LightSampler::new(vec![Arc::new(Stub)]);
        assert_eq!(sampler.next_sample().err(), Some(CoreError::InvalidArgument));
    }

    #[test]
    fn yields_every_light_once_then_done_and_unprepares() {
        let mut sampler = LightSampler::new(vec![Arc::new(Stub), Arc::new(Stub)]);
        sampler.prepare_samples(Point3::zeros());
        let mut count = 0;
        loop {
            match sampler.next_sample().unwrap() {
                NextSample::Light(_, pdf) => {
                    assert_eq!(pdf, 0.5);
                    count += 1;
                }
                NextSample::Done => break,
            }
        }
        assert_eq!(count, 2);
        assert_eq!(sampler.next_sample().err(), Some(CoreError::InvalidArgument));
    }
}
