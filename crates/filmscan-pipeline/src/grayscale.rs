//! Bit-depth and channel conversions between working and display buffers.

use image::{ImageBuffer, Luma, Pixel, Rgb};

use crate::types::{Gray16Image, GrayImage, Rgb16Image, RgbImage};

/// Rec. 601 luma weights in RGB order.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Scale a 16-bit sample to 8 bits with rounding.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_u8(value: u16) -> u8 {
    (f32::from(value) * 255.0 / 65535.0).round().min(255.0) as u8
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn luma_u8(px: [u8; 3]) -> u8 {
    let y: f32 = px
        .iter()
        .zip(LUMA_WEIGHTS)
        .map(|(&v, w)| f32::from(v) * w)
        .sum();
    y.round().min(255.0) as u8
}

/// 8-bit RGB rendering of a working buffer.
#[must_use]
pub fn to_rgb8(image: &Rgb16Image) -> RgbImage {
    crate::types::map_subpixels(image, to_u8)
}

/// 8-bit grayscale rendering of a working buffer: each channel is scaled
/// to 8 bits first, then weighted.
#[must_use]
pub fn to_gray8(image: &Rgb16Image) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb(px) = *image.get_pixel(x, y);
        Luma([luma_u8(px.map(to_u8))])
    })
}

/// 16-bit luma of a working buffer.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_gray16(image: &Rgb16Image) -> Gray16Image {
    Gray16Image::from_fn(image.width(), image.height(), |x, y| {
        let Rgb(px) = *image.get_pixel(x, y);
        let v: f32 = px
            .iter()
            .zip(LUMA_WEIGHTS)
            .map(|(&c, w)| f32::from(c) * w)
            .sum();
        Luma([v.round().clamp(0.0, 65535.0) as u16])
    })
}

/// Replace every sample `v` with `65535 - v`.
pub fn invert<P>(image: &mut ImageBuffer<P, Vec<u16>>)
where
    P: Pixel<Subpixel = u16>,
{
    for v in image.iter_mut() {
        *v = u16::MAX - *v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_u8_maps_extremes_and_midpoint() {
        assert_eq!(to_u8(0), 0);
        assert_eq!(to_u8(65535), 255);
        assert_eq!(to_u8(32896), 128);
    }

    #[test]
    fn gray8_of_neutral_pixel_is_its_level() {
        let img = Rgb16Image::from_pixel(2, 2, Rgb([32896, 32896, 32896]));
        assert!(to_gray8(&img).pixels().all(|p| p.0[0] == 128));
    }

    #[test]
    fn gray8_weights_green_most() {
        let red = Rgb16Image::from_pixel(1, 1, Rgb([65535, 0, 0]));
        let green = Rgb16Image::from_pixel(1, 1, Rgb([0, 65535, 0]));
        let blue = Rgb16Image::from_pixel(1, 1, Rgb([0, 0, 65535]));
        let r = to_gray8(&red).get_pixel(0, 0).0[0];
        let g = to_gray8(&green).get_pixel(0, 0).0[0];
        let b = to_gray8(&blue).get_pixel(0, 0).0[0];
        assert_eq!((r, g, b), (76, 150, 29));
    }

    #[test]
    fn gray16_of_white_is_white() {
        let img = Rgb16Image::from_pixel(1, 1, Rgb([65535, 65535, 65535]));
        assert_eq!(to_gray16(&img).get_pixel(0, 0).0[0], 65535);
    }

    #[test]
    fn invert_twice_is_identity() {
        let img = Rgb16Image::from_fn(4, 3, |x, y| Rgb([x as u16 * 1000, y as u16, 65535]));
        let mut twice = img.clone();
        invert(&mut twice);
        assert_eq!(twice.get_pixel(0, 0).0, [65535, 65535, 0]);
        invert(&mut twice);
        assert_eq!(twice, img);
    }

    #[test]
    fn rgb8_scales_each_channel() {
        let img = Rgb16Image::from_pixel(1, 1, Rgb([0, 32896, 65535]));
        assert_eq!(to_rgb8(&img).get_pixel(0, 0).0, [0, 128, 255]);
    }
}
