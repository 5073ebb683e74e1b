//! Image sources: the decode collaborator behind a photo.
//!
//! Raw sensor decoding lives outside this crate. A [`Photo`](crate::Photo)
//! only sees an [`ImageSource`] that yields a dense 16-bit RGB buffer and
//! an opaque colour-plane descriptor. Two sources ship here:
//! [`MemorySource`] for buffers decoded elsewhere and [`EncodedSource`]
//! for anything the `image` crate can read.

use image::{ColorType, DynamicImage};

use crate::types::{DecodedImage, PipelineError, Rgb16Image};

/// Produces the decoded scan on demand.
///
/// `load` may be called again after a photo reclaims its buffers, so
/// implementations keep whatever they need to decode a second time.
pub trait ImageSource: Send + Sync {
    /// Decode the scan.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] when the source cannot produce pixels.
    /// The photo then marks itself unreadable.
    fn load(&self) -> Result<DecodedImage, PipelineError>;
}

/// A scan that is already decoded.
#[derive(Debug, Clone)]
pub struct MemorySource {
    decoded: DecodedImage,
}

impl MemorySource {
    /// Wrap decoded pixels with their colour descriptor.
    #[must_use]
    pub fn new(pixels: Rgb16Image, colour_desc: impl Into<String>) -> Self {
        Self {
            decoded: DecodedImage {
                pixels,
                colour_desc: colour_desc.into(),
            },
        }
    }
}

impl ImageSource for MemorySource {
    fn load(&self) -> Result<DecodedImage, PipelineError> {
        if self.decoded.pixels.width() == 0 || self.decoded.pixels.height() == 0 {
            return Err(PipelineError::EmptyInput);
        }
        Ok(self.decoded.clone())
    }
}

/// An encoded file (PNG, JPEG, TIFF, BMP, WebP) held in memory.
#[derive(Debug, Clone)]
pub struct EncodedSource {
    bytes: Vec<u8>,
}

impl EncodedSource {
    /// Wrap encoded file contents.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Widen to 16 bits per channel. 8-bit samples are shifted left by eight,
/// so 255 becomes 65280.
fn widen(image: &DynamicImage) -> Rgb16Image {
    match image.color() {
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => {
            let rgb8 = image.to_rgb8();
            Rgb16Image::from_fn(rgb8.width(), rgb8.height(), |x, y| {
                image::Rgb(rgb8.get_pixel(x, y).0.map(|v| u16::from(v) << 8))
            })
        }
        _ => image.to_rgb16(),
    }
}

impl ImageSource for EncodedSource {
    fn load(&self) -> Result<DecodedImage, PipelineError> {
        if self.bytes.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let image = image::load_from_memory(&self.bytes)?;
        let colour_desc = format!("{:?}", image.color());
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            %colour_desc,
            "decoded source"
        );
        Ok(DecodedImage {
            pixels: widen(&image),
            colour_desc,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn empty_bytes_are_rejected() {
        let result = EncodedSource::new(vec![]).load();
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_are_a_decode_error() {
        let result = EncodedSource::new(vec![0xFF, 0x00]).load();
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn eight_bit_samples_are_scaled_by_256() {
        let img = image::RgbImage::from_pixel(3, 2, Rgb([1, 128, 255]));
        let decoded = EncodedSource::new(png_bytes(&DynamicImage::ImageRgb8(img)))
            .load()
            .unwrap();
        assert_eq!(decoded.pixels.dimensions(), (3, 2));
        assert_eq!(decoded.pixels.get_pixel(2, 1).0, [256, 32768, 65280]);
        assert_eq!(decoded.colour_desc, "Rgb8");
    }

    #[test]
    fn sixteen_bit_samples_pass_through() {
        let img = Rgb16Image::from_pixel(2, 2, Rgb([7, 40_000, 65535]));
        let decoded = EncodedSource::new(png_bytes(&DynamicImage::ImageRgb16(img)))
            .load()
            .unwrap();
        assert_eq!(decoded.pixels.get_pixel(0, 0).0, [7, 40_000, 65535]);
        assert_eq!(decoded.colour_desc, "Rgb16");
    }

    #[test]
    fn memory_source_returns_its_buffer() {
        let src = MemorySource::new(Rgb16Image::from_pixel(4, 4, Rgb([1, 2, 3])), "RGBG");
        let decoded = src.load().unwrap();
        assert_eq!(decoded.colour_desc, "RGBG");
        assert_eq!(decoded.pixels.get_pixel(3, 3).0, [1, 2, 3]);
    }

    #[test]
    fn empty_memory_source_is_rejected() {
        let src = MemorySource::new(Rgb16Image::new(0, 0), "RGB");
        assert!(matches!(src.load(), Err(PipelineError::EmptyInput)));
    }
}
