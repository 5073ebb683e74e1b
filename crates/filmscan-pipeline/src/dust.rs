//! Dust detection on the cropped raw scan.
//!
//! Dust shows as small specks on the far side of the tonal range. The
//! detector thresholds a grayscale rendering near its black level, closes
//! the result so clusters of specks merge, and keeps only connected
//! components small enough to be dust. Everything here is best-effort:
//! large dust is missed and fine detail can be flagged.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};

use crate::config::{AdvancedSettings, AxisPercent};
use crate::scale::ResolutionScale;
use crate::stats::Histogram;
use crate::types::Rgb16Image;

const LOW_PERCENTILE: f64 = 0.5;
const HIGH_PERCENTILE: f64 = 99.5;

/// Detector parameters, in reference-resolution units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DustParams {
    /// Threshold as a percentage of the black-to-white range.
    pub threshold: f64,
    /// Largest component kept, in pixels at the reference size.
    pub max_area: f64,
    /// Closing iterations.
    pub iterations: u8,
    /// Border excluded when estimating levels.
    pub ignore_border: AxisPercent,
}

impl DustParams {
    /// Parameters taken from the advanced settings.
    #[must_use]
    pub const fn from_settings(advanced: &AdvancedSettings) -> Self {
        Self {
            threshold: advanced.dust_threshold,
            max_area: advanced.max_dust_area,
            iterations: advanced.dust_iterations,
            ignore_border: advanced.ignore_border,
        }
    }
}

/// Counts reported by one detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DustReport {
    /// Threshold level on the 8-bit rendering.
    pub threshold: f64,
    /// Components after closing.
    pub components: usize,
    /// Components small enough to be dust.
    pub kept: usize,
    /// Non-zero pixels in the final mask.
    pub mask_pixels: u64,
}

/// Histogram of `gray` without an `ignore` border. When the border would
/// leave nothing, the whole image is used.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn inner_histogram(gray: &GrayImage, ignore: AxisPercent) -> Histogram {
    let (w, h) = gray.dimensions();
    let bx = (ignore.x / 100.0 * f64::from(w)).max(0.0) as u32;
    let by = (ignore.y / 100.0 * f64::from(h)).max(0.0) as u32;
    if bx == 0 || by == 0 || 2 * bx >= w || 2 * by >= h {
        return Histogram::of_gray8(gray);
    }
    Histogram::from_values(
        256,
        gray.enumerate_pixels()
            .filter(|(x, y, _)| (bx..w - bx).contains(x) && (by..h - by).contains(y))
            .map(|(_, _, p)| usize::from(p.0[0])),
    )
}

/// Detect dust in `image`, returning a mask (255 = dust) of the same size.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn detect(image: &Rgb16Image, params: &DustParams, scale: ResolutionScale) -> (GrayImage, DustReport) {
    let gray = crate::grayscale::to_gray8(image);
    let hist = inner_histogram(&gray, params.ignore_border);
    let (Some(low), Some(high)) = (hist.percentile(LOW_PERCENTILE), hist.percentile(HIGH_PERCENTILE)) else {
        return (GrayImage::new(gray.width(), gray.height()), DustReport::default());
    };
    let threshold = (high - low).mul_add(params.threshold / 100.0, low);

    let mut candidates = gray;
    for v in candidates.iter_mut() {
        *v = if f64::from(*v) <= threshold { 255 } else { 0 };
    }

    let radius = scale.dust_kernel_radius();
    let closing = (u32::from(radius) * u32::from(params.iterations)).min(u32::from(u8::MAX)) as u8;
    let closed = erode(&dilate(&candidates, Norm::LInf, closing), Norm::LInf, closing);

    let labels = connected_components(&closed, Connectivity::Eight, Luma([0u8]));
    let mut areas: Vec<u64> = Vec::new();
    for label in labels.iter() {
        let l = *label as usize;
        if l == 0 {
            continue;
        }
        if areas.len() < l {
            areas.resize(l, 0);
        }
        areas[l - 1] += 1;
    }
    let limit = scale.dust_area_limit(params.max_area);
    let keep: Vec<bool> = areas.iter().map(|&a| (a as f64) < limit).collect();

    let mut mask = GrayImage::new(closed.width(), closed.height());
    for (dst, label) in mask.iter_mut().zip(labels.iter()) {
        let l = *label as usize;
        if l > 0 && keep.get(l - 1).copied().unwrap_or(false) {
            *dst = 255;
        }
    }
    let mask = dilate(&mask, Norm::LInf, radius);

    let report = DustReport {
        threshold,
        components: areas.len(),
        kept: keep.iter().filter(|&&k| k).count(),
        mask_pixels: mask.iter().filter(|&&v| v > 0).count() as u64,
    };
    tracing::debug!(
        threshold = report.threshold,
        components = report.components,
        kept = report.kept,
        area_limit = limit,
        "dust detected"
    );
    (mask, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimensions;
    use image::Rgb;

    fn params() -> DustParams {
        DustParams {
            threshold: 10.0,
            max_area: 15.0,
            iterations: 5,
            ignore_border: AxisPercent::new(1.0, 1.0),
        }
    }

    /// Reference-size scale: kernel radius 1, area limit 15 pixels.
    fn unit_scale() -> ResolutionScale {
        ResolutionScale::new(Dimensions::new(800, 800))
    }

    #[test]
    fn keeps_small_speck_and_drops_large_region() {
        let img = Rgb16Image::from_fn(200, 200, |x, y| {
            let speck = (40..43).contains(&x) && (40..43).contains(&y);
            let blotch = (100..160).contains(&x) && (100..160).contains(&y);
            if speck || blotch {
                Rgb([5000, 5000, 5000])
            } else {
                Rgb([50_000, 50_000, 50_000])
            }
        });
        let (mask, report) = detect(&img, &params(), unit_scale());
        assert_eq!(mask.dimensions(), (200, 200));
        assert_eq!(report.components, 2);
        assert_eq!(report.kept, 1);
        // Speck plus a one-pixel dilation on every side.
        assert_eq!(mask.get_pixel(41, 41).0[0], 255);
        assert_eq!(mask.get_pixel(39, 39).0[0], 255);
        assert_eq!(mask.get_pixel(37, 41).0[0], 0);
        assert_eq!(report.mask_pixels, 25);
        assert_eq!(mask.get_pixel(130, 130).0[0], 0);
    }

    #[test]
    fn uniform_image_has_no_dust() {
        let img = Rgb16Image::from_pixel(64, 64, Rgb([30_000, 30_000, 30_000]));
        let (mask, report) = detect(&img, &params(), unit_scale());
        // The whole frame sits at the threshold and forms one large region.
        assert_eq!(report.kept, 0);
        assert!(mask.iter().all(|&v| v == 0));
    }

    #[test]
    fn nearby_specks_merge_into_one_component() {
        // A dark strip along the left edge fixes the black level.
        let img = Rgb16Image::from_fn(120, 120, |x, y| {
            let strip = x < 30;
            let a = x == 50 && y == 50;
            let b = x == 53 && y == 50;
            if strip {
                Rgb([5000, 5000, 5000])
            } else if a || b {
                Rgb([0, 0, 0])
            } else {
                Rgb([60_000, 60_000, 60_000])
            }
        });
        let (mask, report) = detect(&img, &params(), unit_scale());
        assert_eq!(report.components, 2);
        assert_eq!(report.kept, 1);
        // The gap between the specks is closed.
        assert_eq!(mask.get_pixel(51, 50).0[0], 255);
        assert_eq!(mask.get_pixel(10, 60).0[0], 0);
    }
}
