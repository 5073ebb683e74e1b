//! Order statistics and masked means over image samples.
//!
//! Percentiles are read off a counting histogram rather than a sorted
//! copy of the samples. Between two ranks the value is interpolated
//! linearly, the same convention as the common "linear" percentile
//! definition, so `percentile(0)` is the minimum, `percentile(100)` the
//! maximum, and the median of an even-sized set is the midpoint of its
//! two middle values.

use image::{GrayImage, ImageBuffer, Pixel};

/// Sample counts per integer level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u64>,
    total: u64,
}

impl Histogram {
    /// Count `values` into `bins` levels. Values past the last bin are
    /// counted in the last bin.
    #[must_use]
    pub fn from_values<I>(bins: usize, values: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut counts = vec![0_u64; bins.max(1)];
        let last = counts.len() - 1;
        let mut total = 0;
        for v in values {
            counts[v.min(last)] += 1;
            total += 1;
        }
        Self { counts, total }
    }

    /// Full-resolution histogram of one channel of a 16-bit image.
    #[must_use]
    pub fn of_channel<P>(image: &ImageBuffer<P, Vec<u16>>, channel: usize) -> Self
    where
        P: Pixel<Subpixel = u16>,
    {
        let stride = usize::from(P::CHANNEL_COUNT);
        Self::from_values(
            usize::from(u16::MAX) + 1,
            image
                .as_raw()
                .iter()
                .skip(channel)
                .step_by(stride.max(1))
                .map(|&v| usize::from(v)),
        )
    }

    /// Histogram of an 8-bit single-channel image.
    #[must_use]
    pub fn of_gray8(image: &GrayImage) -> Self {
        Self::from_values(256, image.as_raw().iter().map(|&v| usize::from(v)))
    }

    /// Per-level counts.
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Number of samples counted.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Level of the sample with zero-based rank `k` in sorted order.
    fn level_at(&self, k: u64) -> usize {
        let mut seen = 0;
        for (level, &count) in self.counts.iter().enumerate() {
            seen += count;
            if seen > k {
                return level;
            }
        }
        self.counts.len() - 1
    }

    /// The `q`-th percentile (0..=100) with linear interpolation between
    /// ranks. `None` for an empty histogram.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn percentile(&self, q: f64) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let rank = q.clamp(0.0, 100.0) / 100.0 * (self.total - 1) as f64;
        let lo = rank.floor();
        let hi = rank.ceil();
        let lo_value = self.level_at(lo as u64) as f64;
        let hi_value = self.level_at(hi as u64) as f64;
        Some((hi_value - lo_value).mul_add(rank - lo, lo_value))
    }
}

/// The `q`-th percentile of every channel of a 16-bit image. Empty
/// images give zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn channel_percentiles<P>(image: &ImageBuffer<P, Vec<u16>>, q: f64) -> Vec<f32>
where
    P: Pixel<Subpixel = u16>,
{
    (0..usize::from(P::CHANNEL_COUNT))
        .map(|c| {
            Histogram::of_channel(image, c)
                .percentile(q)
                .unwrap_or(0.0) as f32
        })
        .collect()
}

/// Mean of each channel over the pixels where `mask` is non-zero.
///
/// `None` when the mask selects nothing or its size differs from the
/// image.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn masked_mean<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>, mask: &GrayImage) -> Option<Vec<f64>>
where
    P: Pixel,
    P::Subpixel: Into<f64>,
{
    if image.dimensions() != mask.dimensions() {
        return None;
    }
    let channels = usize::from(P::CHANNEL_COUNT);
    let mut sums = vec![0.0_f64; channels];
    let mut count = 0_u64;
    for (px, m) in image.pixels().zip(mask.pixels()) {
        if m.0[0] == 0 {
            continue;
        }
        for (sum, &v) in sums.iter_mut().zip(px.channels()) {
            *sum += v.into();
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(sums.into_iter().map(|s| s / count as f64).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Rgb16Image;
    use image::{Luma, Rgb};

    #[test]
    fn percentile_interpolates_between_ranks() {
        // Sorted: 10, 20, 30, 40.
        let h = Histogram::from_values(100, [40, 10, 30, 20]);
        assert!((h.percentile(0.0).unwrap() - 10.0).abs() < 1e-12);
        assert!((h.percentile(100.0).unwrap() - 40.0).abs() < 1e-12);
        assert!((h.percentile(50.0).unwrap() - 25.0).abs() < 1e-12);
        // rank 0.3 * 3 = 0.9 -> 10 + 0.9 * 10
        assert!((h.percentile(30.0).unwrap() - 19.0).abs() < 1e-9);
    }

    #[test]
    fn percentile_handles_repeated_levels() {
        let h = Histogram::from_values(10, [3, 3, 3, 7]);
        assert!((h.percentile(50.0).unwrap() - 3.0).abs() < 1e-12);
        assert!((h.percentile(100.0).unwrap() - 7.0).abs() < 1e-12);
    }

    #[test]
    fn empty_histogram_has_no_percentile() {
        let h = Histogram::from_values(10, std::iter::empty());
        assert_eq!(h.total(), 0);
        assert!(h.percentile(50.0).is_none());
    }

    #[test]
    fn out_of_range_values_land_in_last_bin() {
        let h = Histogram::from_values(4, [0, 9]);
        assert_eq!(h.counts(), &[1, 0, 0, 1]);
    }

    #[test]
    fn channel_percentiles_are_independent() {
        let img = Rgb16Image::from_fn(10, 1, |x, _| {
            let v = x as u16 * 1000;
            Rgb([v, 65535 - v, 500])
        });
        let p = channel_percentiles(&img, 100.0);
        assert_eq!(p, vec![9000.0, 65535.0, 500.0]);
        let p = channel_percentiles(&img, 0.0);
        assert_eq!(p, vec![0.0, 56535.0, 500.0]);
    }

    #[test]
    fn masked_mean_ignores_unselected_pixels() {
        let img = Rgb16Image::from_fn(4, 1, |x, _| Rgb([x as u16 * 10, 100, 0]));
        let mask = GrayImage::from_fn(4, 1, |x, _| Luma([if x >= 2 { 255 } else { 0 }]));
        let mean = masked_mean(&img, &mask).unwrap();
        assert_eq!(mean, vec![25.0, 100.0, 0.0]);
        assert!(masked_mean(&img, &GrayImage::new(4, 1)).is_none());
        assert!(masked_mean(&img, &GrayImage::new(3, 1)).is_none());
    }
}
