//! Proxy derivation for interactive preview.
//!
//! A proxy is a reduced copy of the full decode, created once when the
//! image's width plus height exceeds the configured bound. All preview
//! runs use it; geometry found on the proxy transfers to the full image
//! because rectangles are stored in normalized coordinates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Rgb16Image};

/// Resampling filter used when deriving the proxy.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownsampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl DownsampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for DownsampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Size of the proxy for an image of `dims`, or `None` when the image is
/// already within `max_extent_sum` (width plus height).
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn proxy_dimensions(dims: Dimensions, max_extent_sum: u32) -> Option<Dimensions> {
    let extent = dims.extent_sum();
    if extent <= u64::from(max_extent_sum) || dims.is_empty() {
        return None;
    }
    let scale = f64::from(max_extent_sum) / extent as f64;
    let width = (f64::from(dims.width) * scale).round().max(1.0) as u32;
    let height = (f64::from(dims.height) * scale).round().max(1.0) as u32;
    Some(Dimensions::new(width, height))
}

/// Derive a proxy of `image`, or `None` when no proxy is needed.
#[must_use]
pub fn make_proxy(
    image: &Rgb16Image,
    max_extent_sum: u32,
    filter: DownsampleFilter,
) -> Option<Rgb16Image> {
    let target = proxy_dimensions(Dimensions::of(image), max_extent_sum)?;
    tracing::info!(
        from_width = image.width(),
        from_height = image.height(),
        to_width = target.width,
        to_height = target.height,
        %filter,
        "derived proxy"
    );
    Some(image::imageops::resize(
        image,
        target.width,
        target.height,
        filter.to_image_filter(),
    ))
}
