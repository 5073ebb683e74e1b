//! Shared types for the filmscan conversion pipeline.

use image::{DynamicImage, ImageBuffer, Luma, Pixel, Rgb};
use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference masks
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` for 8-bit visualizations (overlay, histogram).
pub use image::RgbImage;

/// Re-export `Rgb32FImage`, the unclipped working buffer of the colour
/// tone stages.
pub use image::Rgb32FImage;

/// 16-bit RGB working buffer. Channel order is RGB everywhere.
pub type Rgb16Image = ImageBuffer<Rgb<u16>, Vec<u16>>;

/// 16-bit single-channel buffer produced by the black-and-white path.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Unclipped single-channel working buffer.
pub type Gray32FImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Largest value of a 16-bit working sample.
pub const MAX_VALUE: f32 = 65535.0;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.hypot(dy)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create dimensions from width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: Pixel>(image: &ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Width plus height, the measure used by the proxy size bound.
    #[must_use]
    pub const fn extent_sum(self) -> u64 {
        self.width as u64 + self.height as u64
    }

    /// The shorter side.
    #[must_use]
    pub const fn min_side(self) -> u32 {
        if self.width < self.height {
            self.width
        } else {
            self.height
        }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The same dimensions with width and height exchanged.
    #[must_use]
    pub const fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }
}

/// A decoded scan as delivered by the decode collaborator.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Dense 16-bit RGB samples.
    pub pixels: Rgb16Image,
    /// Colour-plane descriptor reported by the decoder. Carried through
    /// untouched.
    pub colour_desc: String,
}

/// A developed positive: colour for negatives and slides, single channel
/// for black-and-white negatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Positive {
    /// Three-channel result.
    Color(Rgb16Image),
    /// Single-channel result.
    Mono(Gray16Image),
}

impl Positive {
    /// Dimensions of the underlying buffer.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        match self {
            Self::Color(img) => Dimensions::of(img),
            Self::Mono(img) => Dimensions::of(img),
        }
    }

    /// The colour buffer, if this is a colour positive.
    #[must_use]
    pub const fn as_color(&self) -> Option<&Rgb16Image> {
        match self {
            Self::Color(img) => Some(img),
            Self::Mono(_) => None,
        }
    }

    /// The single-channel buffer, if this is a mono positive.
    #[must_use]
    pub const fn as_mono(&self) -> Option<&Gray16Image> {
        match self {
            Self::Mono(img) => Some(img),
            Self::Color(_) => None,
        }
    }

    /// Bytes held by the sample buffer.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Color(img) => img.as_raw().len() * 2,
            Self::Mono(img) => img.as_raw().len() * 2,
        }
    }

    /// Convert into a [`DynamicImage`] without changing bit depth.
    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Self::Color(img) => DynamicImage::ImageRgb16(img),
            Self::Mono(img) => DynamicImage::ImageLuma16(img),
        }
    }
}

/// Map every subpixel of `image` into a buffer of pixel type `Q`.
///
/// `P` and `Q` must have the same channel count.
pub(crate) fn map_subpixels<P, Q, F>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    f: F,
) -> ImageBuffer<Q, Vec<Q::Subpixel>>
where
    P: Pixel,
    Q: Pixel,
    F: Fn(P::Subpixel) -> Q::Subpixel,
{
    debug_assert_eq!(P::CHANNEL_COUNT, Q::CHANNEL_COUNT);
    let mut out = ImageBuffer::<Q, Vec<Q::Subpixel>>::new(image.width(), image.height());
    for (dst, src) in out.iter_mut().zip(image.iter()) {
        *dst = f(*src);
    }
    out
}

/// Clip an unclipped working value into the 16-bit range.
///
/// Values are clamped then truncated, matching an integer cast of the
/// clamped float.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clip_to_u16(value: f32) -> u16 {
    value.clamp(0.0, MAX_VALUE) as u16
}

/// Errors that can occur while running the pipeline or loading a photo.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image data was empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The image source could not produce pixels.
    #[error("image source failed: {0}")]
    Source(String),
}

/// Serde-compatible proxy for `PipelineError`.
///
/// `image::ImageError` does not implement serde, so the `ImageDecode`
/// variant stores its `Display` string instead.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidConfig(String),
    Source(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
            Self::Source(s) => PipelineErrorProxy::Source(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image error cannot be rebuilt; keep its message.
            PipelineErrorProxy::ImageDecode(msg) => Self::Source(format!("image decode error: {msg}")),
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::Source(s) => Self::Source(s),
        })
    }
}
