//! Exposure curve: gamma, then shadow lift, then highlight compression.
//!
//! The slider coefficients below are what the sliders are calibrated
//! against; changing them changes the look of every stored edit.

use image::{ImageBuffer, Pixel};

use crate::config::ToneParams;
use crate::types::MAX_VALUE;

const QUADRATIC: f32 = 4.15e-5;
const LINEAR: f32 = 0.02185;
const SHADOW_KNEE: f32 = 0.75;
const HIGHLIGHT_KNEE: f32 = 0.25;

/// Curve parameters derived from the sliders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureCurve {
    exponent: f32,
    shadows: f32,
    highlights: f32,
}

impl ExposureCurve {
    /// Build the curve for the given sliders.
    #[must_use]
    pub fn new(tone: &ToneParams) -> Self {
        let s = tone.shadows;
        let h = tone.highlights;
        Self {
            exponent: (-tone.gamma / 100.0).exp2(),
            shadows: QUADRATIC.mul_add(s * s, LINEAR * s),
            highlights: (-QUADRATIC).mul_add(h * h, LINEAR * h),
        }
    }

    /// Map one normalized value.
    #[must_use]
    pub fn eval(self, v: f32) -> f32 {
        let mut v = v.clamp(0.0, 1.0).powf(self.exponent);
        let low = (v - SHADOW_KNEE).min(0.0);
        v += self.shadows * low * low * v;
        let high = (v - HIGHLIGHT_KNEE).max(0.0);
        v += self.highlights * high * high * (1.0 - v);
        v
    }
}

/// Apply the exposure curve in place to a 16-bit-range buffer.
///
/// Values are normalized with a clip to [0, 1] first.
pub fn apply<P>(image: &mut ImageBuffer<P, Vec<f32>>, tone: &ToneParams)
where
    P: Pixel<Subpixel = f32>,
{
    let curve = ExposureCurve::new(tone);
    for v in image.iter_mut() {
        *v = curve.eval(*v / MAX_VALUE) * MAX_VALUE;
    }
}
