//! Black and white point equalization.
//!
//! Statistics come from a sample crop inside the frame so the film base
//! and scanner border do not pull the levels. The black point is a low
//! percentile of the sample (or a sampled film base colour), the white
//! point a high percentile of the black-shifted sample. The result is an
//! unclipped `f32` buffer in the 16-bit range.

use image::{ImageBuffer, Pixel};
use serde::{Deserialize, Serialize};

use crate::config::{BaseColor, ToneParams};
use crate::stats::channel_percentiles;
use crate::types::MAX_VALUE;

/// How strongly the black and white point sliders move the levels, as a
/// fraction of full scale at a slider value of 100.
pub const SLIDER_SENSITIVITY: f32 = 0.2;

/// Percentiles used for the automatic levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentiles {
    /// Low percentile for the black point.
    pub black: f64,
    /// High percentile for the white point.
    pub white: f64,
}

/// Levels computed by one equalization, per channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToneStats {
    /// Black point before the slider offset.
    pub black_point: Vec<f32>,
    /// Offset added to every sample.
    pub black_offset: Vec<f32>,
    /// White point of the shifted sample.
    pub white_point: Vec<f32>,
    /// Gain applied after the offset.
    pub multiplier: Vec<f32>,
}

/// Black point implied by a sampled film base.
///
/// Negatives are inverted before equalization, so their base sits at the
/// inverted level.
#[must_use]
pub fn base_black_point(base: BaseColor, inverted: bool) -> Vec<f32> {
    base.channels()
        .iter()
        .map(|&c| {
            let v = f32::from(c) * 256.0;
            if inverted { MAX_VALUE - v } else { v }
        })
        .collect()
}

fn slider_level(slider: f32) -> f32 {
    slider / 100.0 * SLIDER_SENSITIVITY * MAX_VALUE
}

/// Compute the levels for `sample`.
#[must_use]
pub fn measure<P>(
    sample: &ImageBuffer<P, Vec<u16>>,
    tone: &ToneParams,
    percentiles: Percentiles,
    base_black: Option<&[f32]>,
) -> ToneStats
where
    P: Pixel<Subpixel = u16>,
{
    let black_point = base_black.map_or_else(
        || channel_percentiles(sample, percentiles.black),
        <[f32]>::to_vec,
    );
    let black_offset: Vec<f32> = black_point
        .iter()
        .map(|bp| slider_level(tone.black_point) - bp)
        .collect();
    // The percentile of a shifted sample is the shifted percentile.
    let white_point: Vec<f32> = channel_percentiles(sample, percentiles.white)
        .iter()
        .zip(&black_offset)
        .map(|(wp, off)| wp + off)
        .collect();
    let target = MAX_VALUE + slider_level(tone.white_point);
    let multiplier = white_point
        .iter()
        .map(|&wp| if wp > 0.0 { target / wp } else { 1.0 })
        .collect();
    ToneStats {
        black_point,
        black_offset,
        white_point,
        multiplier,
    }
}

/// Apply measured levels to `image`.
#[must_use = "returns the equalized image"]
pub fn apply<P, Q>(image: &ImageBuffer<P, Vec<u16>>, stats: &ToneStats) -> ImageBuffer<Q, Vec<f32>>
where
    P: Pixel<Subpixel = u16>,
    Q: Pixel<Subpixel = f32>,
{
    let channels = usize::from(P::CHANNEL_COUNT);
    let mut out = ImageBuffer::<Q, Vec<f32>>::new(image.width(), image.height());
    for (i, (dst, &src)) in out.iter_mut().zip(image.iter()).enumerate() {
        let c = i % channels;
        let offset = stats.black_offset.get(c).copied().unwrap_or(0.0);
        let gain = stats.multiplier.get(c).copied().unwrap_or(1.0);
        *dst = (f32::from(src) + offset) * gain;
    }
    out
}

/// Measure `sample` and equalize `image` in one step.
#[must_use = "returns the equalized image and its levels"]
pub fn equalize<P, Q>(
    image: &ImageBuffer<P, Vec<u16>>,
    sample: &ImageBuffer<P, Vec<u16>>,
    tone: &ToneParams,
    percentiles: Percentiles,
    base_black: Option<&[f32]>,
) -> (ImageBuffer<Q, Vec<f32>>, ToneStats)
where
    P: Pixel<Subpixel = u16>,
    Q: Pixel<Subpixel = f32>,
{
    let stats = measure(sample, tone, percentiles, base_black);
    tracing::debug!(
        black_point = ?stats.black_point,
        white_point = ?stats.white_point,
        multiplier = ?stats.multiplier,
        "tone levels"
    );
    let out = apply(image, &stats);
    (out, stats)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Gray16Image, Gray32FImage, Rgb16Image};
    use image::{Luma, Rgb, Rgb32FImage};

    const FULL: Percentiles = Percentiles {
        black: 0.0,
        white: 100.0,
    };

    fn ramp() -> Gray16Image {
        Gray16Image::from_fn(101, 1, |x, _| Luma([10_000 + x as u16 * 300]))
    }

    #[test]
    fn neutral_sliders_stretch_sample_range_to_full_scale() {
        let img = ramp();
        let (out, stats): (Gray32FImage, _) = equalize(&img, &img, &ToneParams::default(), FULL, None);
        assert_eq!(stats.black_point, vec![10_000.0]);
        assert!(out.get_pixel(0, 0).0[0].abs() < 1e-3);
        assert!((out.get_pixel(100, 0).0[0] - MAX_VALUE).abs() < 0.5);
        // Linear in between.
        let mid = out.get_pixel(50, 0).0[0];
        assert!((mid - MAX_VALUE / 2.0).abs() < 1.0, "mid {mid}");
    }

    #[test]
    fn raising_black_slider_raises_black_level() {
        let img = ramp();
        let black_at = |slider: f32| {
            let tone = ToneParams {
                black_point: slider,
                ..ToneParams::default()
            };
            let (out, _): (Gray32FImage, _) = equalize(&img, &img, &tone, FULL, None);
            out.get_pixel(0, 0).0[0]
        };
        let levels: Vec<f32> = [-50.0, -10.0, 0.0, 10.0, 50.0].map(black_at).to_vec();
        assert!(levels.windows(2).all(|w| w[0] < w[1]), "{levels:?}");
    }

    #[test]
    fn white_slider_sets_target_above_full_scale() {
        let img = ramp();
        let tone = ToneParams {
            white_point: 50.0,
            ..ToneParams::default()
        };
        let (out, _): (Gray32FImage, _) = equalize(&img, &img, &tone, FULL, None);
        let expected = MAX_VALUE * 1.1;
        assert!((out.get_pixel(100, 0).0[0] - expected).abs() < 1.0);
    }

    #[test]
    fn non_positive_white_point_keeps_unit_gain() {
        let img = Rgb16Image::new(4, 4);
        let (out, stats): (Rgb32FImage, _) = equalize(&img, &img, &ToneParams::default(), FULL, None);
        assert_eq!(stats.multiplier, vec![1.0, 1.0, 1.0]);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn base_colour_replaces_percentile_black_point() {
        let img = Rgb16Image::from_pixel(2, 2, Rgb([20_000, 30_000, 40_000]));
        let base = BaseColor::new(10, 20, 30);
        let slide = base_black_point(base, false);
        assert_eq!(slide, vec![2560.0, 5120.0, 7680.0]);
        let negative = base_black_point(base, true);
        assert_eq!(negative, vec![65535.0 - 2560.0, 65535.0 - 5120.0, 65535.0 - 7680.0]);

        let stats = measure(&img, &ToneParams::default(), FULL, Some(slide.as_slice()));
        assert_eq!(stats.black_point, slide);
        assert_eq!(stats.black_offset, vec![-2560.0, -5120.0, -7680.0]);
    }

    #[test]
    fn statistics_come_from_the_sample_only() {
        let image = Gray16Image::from_pixel(3, 3, Luma([60_000]));
        let sample = ramp();
        let (out, _): (Gray32FImage, _) = equalize(&image, &sample, &ToneParams::default(), FULL, None);
        // 60000 lies above the sample's white point of 40000.
        assert!(out.get_pixel(0, 0).0[0] > MAX_VALUE);
    }
}
