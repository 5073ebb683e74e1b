//! Temperature and tint correction.
//!
//! Three strategies share the same two sliders:
//!
//! - [`WhiteBalanceMode::Additive`] shifts red and blue in opposite
//!   directions by `200·temp` and green by `-200·tint`.
//! - [`WhiteBalanceMode::Coefficient`] scales red by `1 + a + b/2`, green by
//!   `1 - b` and blue by `1 - a + b/2`, with `a = temp/200` and
//!   `b = tint/200`. Black stays black.
//! - [`WhiteBalanceMode::Gamma`] raises normalized red to `2^(-temp/100)`,
//!   green to `2^(tint/100)` and blue to `2^(temp/100)`. Black and white
//!   stay fixed; only midtones move.
//!
//! [`calibrate`] inverts each forward formula in closed form: given the
//! mean colour of a region it returns the temp/tint that render that mean
//! neutral.

use image::Rgb32FImage;
use serde::{Deserialize, Serialize};

use crate::config::{ColorParams, WhiteBalanceMode};
use crate::types::MAX_VALUE;

/// Slider scale of the additive and coefficient modes.
const SLIDER_SCALE: f32 = 200.0;

/// Slider range.
const LIMIT: f64 = 100.0;

/// Keeps normalized means strictly inside (0, 1) for the logarithmic solve.
const LOG_EPSILON: f64 = 1e-6;

/// Temperature and tint solved from a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhiteBalanceCalibration {
    /// Temperature slider value.
    pub temp: f32,
    /// Tint slider value.
    pub tint: f32,
}

/// A white-balance correction ready to apply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhiteBalance {
    /// Temperature slider value.
    pub temp: f32,
    /// Tint slider value.
    pub tint: f32,
    /// Strategy.
    pub mode: WhiteBalanceMode,
}

impl WhiteBalance {
    /// The correction described by the colour sliders.
    #[must_use]
    pub const fn from_color(color: &ColorParams) -> Self {
        Self {
            temp: color.temp,
            tint: color.tint,
            mode: color.mode,
        }
    }

    /// Zero temp and tint leave every mode a no-op.
    #[must_use]
    pub fn is_neutral(self) -> bool {
        self.temp == 0.0 && self.tint == 0.0
    }

    /// Correct one RGB value in the 16-bit range.
    #[must_use]
    pub fn correct(self, [r, g, b]: [f32; 3]) -> [f32; 3] {
        match self.mode {
            WhiteBalanceMode::Additive => {
                let t = self.temp * SLIDER_SCALE;
                let n = self.tint * SLIDER_SCALE;
                [r + t, g - n, b - t]
            }
            WhiteBalanceMode::Coefficient => {
                let a = self.temp / SLIDER_SCALE;
                let n = self.tint / SLIDER_SCALE;
                [r * (1.0 + a + n / 2.0), g * (1.0 - n), b * (1.0 - a + n / 2.0)]
            }
            WhiteBalanceMode::Gamma => {
                let exponents = [
                    (-self.temp / 100.0).exp2(),
                    (self.tint / 100.0).exp2(),
                    (self.temp / 100.0).exp2(),
                ];
                // Negative values have no real power; they are black here.
                let mut out = [r, g, b];
                for (v, e) in out.iter_mut().zip(exponents) {
                    *v = (v.max(0.0) / MAX_VALUE).powf(e) * MAX_VALUE;
                }
                out
            }
        }
    }

    /// Correct `image` in place.
    pub fn apply(self, image: &mut Rgb32FImage) {
        if self.is_neutral() {
            return;
        }
        for px in image.pixels_mut() {
            px.0 = self.correct(px.0);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn clamp_slider(v: f64) -> Option<f32> {
    v.is_finite().then(|| v.clamp(-LIMIT, LIMIT) as f32)
}

/// Solve temp/tint that neutralize a region whose mean colour is `mean`
/// (RGB, 16-bit range). Results are clamped to the slider range.
///
/// `None` when the mean admits no solution, e.g. an all-black region.
#[must_use]
pub fn calibrate(mean: [f64; 3], mode: WhiteBalanceMode) -> Option<WhiteBalanceCalibration> {
    let [r, g, b] = mean;
    let scale = f64::from(SLIDER_SCALE);
    let (temp, tint) = match mode {
        WhiteBalanceMode::Additive => ((b - r) / (2.0 * scale), (g - f64::midpoint(b, r)) / scale),
        WhiteBalanceMode::Coefficient => {
            // r(1 + a + b'/2) = g(1 - b') = b(1 - a + b'/2), solved for a, b'.
            let det = r.mul_add(b, r * g) + g * b;
            if det <= 0.0 {
                return None;
            }
            let a = (g - r).mul_add(b / 2.0 + g, -(r / 2.0 + g) * (g - b)) / det;
            let n = (r * g + b * g - 2.0 * r * b) / det;
            (a * scale, n * scale)
        }
        WhiteBalanceMode::Gamma => {
            let ln = |v: f64| (v / f64::from(MAX_VALUE)).clamp(LOG_EPSILON, 1.0 - LOG_EPSILON).ln();
            let (lr, lg, lb) = (ln(r), ln(g), ln(b));
            let k = (lr / lb).sqrt();
            let target = k * lb;
            (100.0 * k.log2(), 100.0 * (target / lg).log2())
        }
    };
    let calibration = WhiteBalanceCalibration {
        temp: clamp_slider(temp)?,
        tint: clamp_slider(tint)?,
    };
    tracing::debug!(?mean, ?mode, ?calibration, "white balance calibrated");
    Some(calibration)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    const MODES: [WhiteBalanceMode; 3] = [
        WhiteBalanceMode::Additive,
        WhiteBalanceMode::Coefficient,
        WhiteBalanceMode::Gamma,
    ];

    fn assert_neutral(px: [f32; 3], tolerance: f32) {
        let [r, g, b] = px;
        assert!((r - g).abs() < tolerance && (g - b).abs() < tolerance, "{px:?}");
    }

    #[test]
    fn calibration_neutralizes_the_sample_in_every_mode() {
        let mean = [30_000.0, 25_000.0, 20_000.0];
        for mode in MODES {
            let c = calibrate(mean, mode).unwrap();
            let wb = WhiteBalance {
                temp: c.temp,
                tint: c.tint,
                mode,
            };
            let out = wb.correct(mean.map(|v| v as f32));
            assert_neutral(out, 2.0);
        }
    }

    #[test]
    fn calibration_handles_green_casts() {
        let mean = [20_000.0, 32_000.0, 21_000.0];
        for mode in MODES {
            let c = calibrate(mean, mode).unwrap();
            assert!(c.tint > 0.0, "{mode:?} {c:?}");
            let wb = WhiteBalance {
                temp: c.temp,
                tint: c.tint,
                mode,
            };
            assert_neutral(wb.correct(mean.map(|v| v as f32)), 2.0);
        }
    }

    #[test]
    fn neutral_sample_needs_no_correction() {
        for mode in MODES {
            let c = calibrate([20_000.0, 20_000.0, 20_000.0], mode).unwrap();
            assert!(c.temp.abs() < 1e-4 && c.tint.abs() < 1e-4, "{mode:?} {c:?}");
        }
    }

    #[test]
    fn extreme_casts_clamp_to_slider_range() {
        let c = calibrate([60_000.0, 1_000.0, 500.0], WhiteBalanceMode::Additive).unwrap();
        assert!((c.temp + 100.0).abs() < f32::EPSILON);
        assert!((c.tint + 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn black_sample_has_no_coefficient_solution() {
        assert!(calibrate([0.0, 0.0, 0.0], WhiteBalanceMode::Coefficient).is_none());
    }

    #[test]
    fn coefficient_mode_keeps_black_black() {
        let wb = WhiteBalance {
            temp: 40.0,
            tint: -30.0,
            mode: WhiteBalanceMode::Coefficient,
        };
        assert_eq!(wb.correct([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn gamma_mode_pins_black_and_white() {
        let wb = WhiteBalance {
            temp: 40.0,
            tint: -30.0,
            mode: WhiteBalanceMode::Gamma,
        };
        let black = wb.correct([0.0, 0.0, 0.0]);
        let white = wb.correct([MAX_VALUE; 3]);
        assert!(black.iter().all(|v| v.abs() < 1e-3));
        assert!(white.iter().all(|v| (v - MAX_VALUE).abs() < 0.1));
        let mid = wb.correct([MAX_VALUE / 2.0; 3]);
        // Positive temp warms: red up, blue down.
        assert!(mid[0] > mid[2]);
    }

    #[test]
    fn neutral_sliders_leave_image_untouched() {
        let mut img = Rgb32FImage::from_pixel(3, 3, Rgb([-5.0, 100.0, 70_000.0]));
        let before = img.clone();
        for mode in MODES {
            WhiteBalance {
                temp: 0.0,
                tint: 0.0,
                mode,
            }
            .apply(&mut img);
            assert_eq!(img, before);
        }
    }
}
