use std::ptr::NonNull;
use std::sync::Arc;

use crate::arena::StaticArena;

// Loosely based on the arithmetic surface of `math::spectrum::Spectrum` (the
// teacher's RGB spectral power distribution), reworked into a wavelength-
// sampled, arena-backed expression tree: each composite operation allocates
// at most one tagged node instead of eagerly evaluating per-channel floats.

/// Radiance as a function of wavelength.
pub trait Spectrum: Send + Sync {
    fn sample(&self, wavelength: f32) -> f32;
}

/// Spectral reflectance: how much of an incoming intensity bounces back out
/// at a given wavelength.
pub trait Reflector: Send + Sync {
    fn reflect(&self, wavelength: f32, incoming: f32) -> f32;
}

enum SpectrumNode {
    Leaf(Arc<dyn Spectrum>),
    Attenuated { input: SpectrumHandle, scale: f32 },
    Sum { a: SpectrumHandle, b: SpectrumHandle },
    Fma { a: SpectrumHandle, b: SpectrumHandle, scale: f32 },
    Reflected { reflector: Arc<dyn Reflector>, input: SpectrumHandle },
    AttenuatedReflected { reflector: Arc<dyn Reflector>, input: SpectrumHandle, scale: f32 },
}

/// A handle into a [`SpectrumCompositor`]'s arena. `None` in the surrounding
/// `Option<SpectrumHandle>` represents the zero spectrum — the compositor
/// never materializes an explicit "black" node for it.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct SpectrumHandle(NonNull<SpectrumNode>);

fn flush_denormal(x: f32) -> f32 {
    if x.is_subnormal() {
        0.0
    } else {
        x
    }
}

/// Arena of lazy spectrum nodes, scoped to one integrator depth and cleared
/// between samples. Every combinator is pointer-identity-aware so repeated
/// composition over the same operand collapses instead of growing the tree.
pub struct SpectrumCompositor {
    arena: StaticArena<SpectrumNode>,
}

impl SpectrumCompositor {
    pub fn new() -> Self {
        Self { arena: StaticArena::new() }
    }

    pub fn leaf(&mut self, spectrum: Arc<dyn Spectrum>) -> SpectrumHandle {
        self.alloc(SpectrumNode::Leaf(spectrum))
    }

    /// `attenuate(s, 1) ≡ s`, `attenuate(s, 0) ≡ attenuate(s, -0) ≡ None`.
    /// Denormal scales flush to zero. Collapses a nested attenuation into a
    /// single node with the product scale.
    pub fn attenuate(&mut self, s: Option<SpectrumHandle>, scale: f32) -> Option<SpectrumHandle> {
        let scale = flush_denormal(scale);
        if scale == 0.0 {
            return None;
        }
        let s = s?;
        if scale == 1.0 {
            return Some(s);
        }

        // SAFETY: arena contents are stable for the compositor's lifetime.
        if let SpectrumNode::Attenuated { input, scale: inner } = unsafe { s.0.as_ref() } {
            let combined = flush_denormal(inner * scale);
            return if combined == 0.0 {
                None
            } else if combined == 1.0 {
                Some(*input)
            } else {
                Some(self.alloc(SpectrumNode::Attenuated { input: *input, scale: combined }))
            };
        }

        Some(self.alloc(SpectrumNode::Attenuated { input: s, scale }))
    }

    /// `add(s, None) ≡ s`. `add(a, a)` materializes as `attenuate(a, 2)`
    /// rather than a redundant `Sum` node.
    pub fn sum(&mut self, a: Option<SpectrumHandle>, b: Option<SpectrumHandle>) -> Option<SpectrumHandle> {
        match (a, b) {
            (None, None) => None,
            (Some(x), None) => Some(x),
            (None, Some(y)) => Some(y),
            (Some(x), Some(y)) if x == y => self.attenuate(Some(x), 2.0),
            (Some(x), Some(y)) => Some(self.alloc(SpectrumNode::Sum { a: x, b: y })),
        }
    }

    /// `a + b * scale`. Always materializes a ternary node (unlike `sum`,
    /// which folds into `attenuate` on self-addition) so that
    /// `fma(a, b, 0) ≡ a` holds exactly rather than approximately.
    pub fn fma(&mut self, a: Option<SpectrumHandle>, b: Option<SpectrumHandle>, scale: f32) -> Option<SpectrumHandle> {
        let scale = flush_denormal(scale);
        if scale == 0.0 {
            return a;
        }
        match (a, b) {
            (None, None) => None,
            (None, Some(b)) => self.attenuate(Some(b), scale),
            (Some(a), None) => Some(a),
            (Some(a), Some(b)) => Some(self.alloc(SpectrumNode::Fma { a, b, scale })),
        }
    }

    pub fn reflect(
        &mut self,
        reflector: Option<Arc<dyn Reflector>>,
        incoming: Option<SpectrumHandle>,
    ) -> Option<SpectrumHandle> {
        let reflector = reflector?;
        let incoming = incoming?;
        Some(self.alloc(SpectrumNode::Reflected { reflector, input: incoming }))
    }

    pub fn attenuated_reflect(
        &mut self,
        reflector: Option<Arc<dyn Reflector>>,
        incoming: Option<SpectrumHandle>,
        scale: f32,
    ) -> Option<SpectrumHandle> {
        let scale = flush_denormal(scale);
        if scale == 0.0 {
            return None;
        }
        let reflector = reflector?;
        let incoming = incoming?;
        if scale == 1.0 {
            return Some(self.alloc(SpectrumNode::Reflected { reflector, input: incoming }));
        }
        Some(self.alloc(SpectrumNode::AttenuatedReflected { reflector, input: incoming, scale }))
    }

    pub fn sample(&self, handle: Option<SpectrumHandle>, wavelength: f32) -> f32 {
        match handle {
            None => 0.0,
            Some(h) => self.sample_node(h, wavelength),
        }
    }

    fn sample_node(&self, handle: SpectrumHandle, wavelength: f32) -> f32 {
        // SAFETY: nodes are stable until the next `clear`.
        match unsafe { handle.0.as_ref() } {
            SpectrumNode::Leaf(s) => s.sample(wavelength),
            SpectrumNode::Attenuated { input, scale } => scale * self.sample_node(*input, wavelength),
            SpectrumNode::Sum { a, b } => self.sample_node(*a, wavelength) + self.sample_node(*b, wavelength),
            SpectrumNode::Fma { a, b, scale } => {
                self.sample_node(*a, wavelength) + scale * self.sample_node(*b, wavelength)
            }
            SpectrumNode::Reflected { reflector, input } => {
                reflector.reflect(wavelength, self.sample_node(*input, wavelength))
            }
            SpectrumNode::AttenuatedReflected { reflector, input, scale } => {
                scale * reflector.reflect(wavelength, self.sample_node(*input, wavelength))
            }
        }
    }

    /// Invalidates every handle produced so far. Called by the integrator
    /// between samples.
    pub fn clear(&mut self) {
        self.arena.free_all();
    }

    fn alloc(&mut self, node: SpectrumNode) -> SpectrumHandle {
        SpectrumHandle(self.arena.alloc(node))
    }
}

impl Default for SpectrumCompositor {
    fn default() -> Self {
        Self::new()
    }
}
