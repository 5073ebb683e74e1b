//! Histogram plot of a developed positive.
//!
//! Each channel is counted into 256 bins over the 16-bit range. Interior
//! bins are smoothed with a 5-tap binomial kernel (a Gaussian of σ ≈ 1.1)
//! while the two end bins keep their raw counts, so clipping at black or
//! white stays visible. All channels share one vertical scale so their
//! heights compare directly.

use image::{GrayImage, ImageBuffer, Pixel, Rgb, RgbImage};

use crate::stats::Histogram;
use crate::types::Positive;

/// Number of bins.
pub const BINS: usize = 256;

/// Rows left empty above the tallest bin.
const HEADROOM: u32 = 10;

const KERNEL: [f64; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Plot size and colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramStyle {
    /// Plot width in pixels.
    pub width: u32,
    /// Plot height in pixels.
    pub height: u32,
    /// Colour of pixels no channel covers.
    pub background: [u8; 3],
}

fn channel_counts<P>(image: &ImageBuffer<P, Vec<u16>>, channel: usize) -> Vec<f64>
where
    P: Pixel<Subpixel = u16>,
{
    let stride = usize::from(P::CHANNEL_COUNT).max(1);
    let hist = Histogram::from_values(
        BINS,
        image
            .as_raw()
            .iter()
            .skip(channel)
            .step_by(stride)
            .map(|&v| usize::from(v >> 8)),
    );
    #[allow(clippy::cast_precision_loss)]
    hist.counts().iter().map(|&c| c as f64).collect()
}

/// Smooth `counts[1..len-1]` in place, reflecting at the ends of that
/// interior span without repeating the edge bin.
fn smooth_interior(counts: &mut [f64]) {
    let Some(interior) = counts.get(1..counts.len().saturating_sub(1)) else {
        return;
    };
    let n = interior.len();
    if n < 2 {
        return;
    }
    let reflect = |i: isize| -> usize {
        let last = n as isize - 1;
        let mut i = i;
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
        i.clamp(0, last) as usize
    };
    let smoothed: Vec<f64> = (0..n as isize)
        .map(|i| {
            KERNEL
                .iter()
                .zip(-2..=2_isize)
                .map(|(k, d)| k * interior[reflect(i + d)])
                .sum()
        })
        .collect();
    counts[1..=n].copy_from_slice(&smoothed);
}

/// Draw one filled channel curve into `plot`, adding `colour`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fill_channel(plot: &mut RgbImage, heights: &[f64], colour: [u8; 3]) {
    let (w, h) = plot.dimensions();
    let last = (heights.len() - 1) as f64;
    for x in 0..w {
        let t = if w > 1 {
            f64::from(x) / f64::from(w - 1) * last
        } else {
            0.0
        };
        let i = t.floor() as usize;
        let j = (i + 1).min(heights.len() - 1);
        let height = (heights[j] - heights[i]).mul_add(t - i as f64, heights[i]);
        let rows = (height.round().max(0.0) as u32).min(h);
        for y in h - rows..h {
            let px = plot.get_pixel_mut(x, y);
            for (dst, add) in px.0.iter_mut().zip(colour) {
                *dst = dst.saturating_add(add);
            }
        }
    }
}

/// Render the histogram of `positive`.
#[must_use]
pub fn render(positive: &Positive, style: &HistogramStyle) -> RgbImage {
    let channels: Vec<(Vec<f64>, [u8; 3])> = match positive {
        Positive::Color(img) => vec![
            (channel_counts(img, 0), [255, 0, 0]),
            (channel_counts(img, 1), [0, 255, 0]),
            (channel_counts(img, 2), [0, 0, 255]),
        ],
        Positive::Mono(img) => vec![(channel_counts(img, 0), [255, 255, 255])],
    };
    let peak = channels
        .iter()
        .flat_map(|(c, _)| c.iter().copied())
        .fold(0.0_f64, f64::max);
    let usable = f64::from(style.height.saturating_sub(HEADROOM));

    let mut plot = RgbImage::new(style.width, style.height);
    for (mut counts, colour) in channels {
        smooth_interior(&mut counts);
        if peak > 0.0 {
            for c in &mut counts {
                *c = *c / peak * usable;
            }
        }
        fill_channel(&mut plot, &counts, colour);
    }
    for px in plot.pixels_mut() {
        if px.0 == [0, 0, 0] {
            *px = Rgb(style.background);
        }
    }
    plot
}

/// Mask of the plot area covered by any channel, for tests and overlays.
#[must_use]
pub fn coverage(plot: &RgbImage, background: [u8; 3]) -> GrayImage {
    GrayImage::from_fn(plot.width(), plot.height(), |x, y| {
        image::Luma([if plot.get_pixel(x, y).0 == background { 0 } else { 255 }])
    })
}
