//! White border and aspect-ratio padding for the final render.

use image::{ImageBuffer, Pixel, imageops};

use crate::config::FitAspectRatio;
use crate::types::{Dimensions, Positive};

/// Border thickness for an image of `dims`: `frame` percent of the short
/// side, at least one pixel.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn frame_size(dims: Dimensions, frame: f64) -> u32 {
    let size = (f64::from(dims.min_side()) * frame.max(0.0) / 100.0).floor();
    (size as u32).max(1)
}

/// `(width, height)` of the target ratio, turned to match the image: a
/// portrait image gets the ratio with its long side vertical.
const fn oriented_ratio(width: u32, height: u32, dims: Dimensions) -> (u32, u32) {
    let portrait = dims.height > dims.width;
    let ratio_portrait = height > width;
    if portrait == ratio_portrait || dims.height == dims.width {
        (width, height)
    } else {
        (height, width)
    }
}

/// Size after padding `dims` to `ratio` and the offset of the original
/// inside it. Odd leftovers go to the bottom or right side.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fit(dims: Dimensions, ratio: (u32, u32)) -> (Dimensions, u32, u32) {
    let target = f64::from(ratio.0) / f64::from(ratio.1);
    let w = f64::from(dims.width);
    let h = f64::from(dims.height);
    if w / h > target {
        let new_h = ((w / target) as u32).max(dims.height);
        (Dimensions::new(dims.width, new_h), 0, (new_h - dims.height) / 2)
    } else {
        let new_w = ((h * target) as u32).max(dims.width);
        (Dimensions::new(new_w, dims.height), (new_w - dims.width) / 2, 0)
    }
}

fn white_canvas<P>(dims: Dimensions) -> ImageBuffer<P, Vec<u16>>
where
    P: Pixel<Subpixel = u16>,
{
    let mut canvas = ImageBuffer::<P, Vec<u16>>::new(dims.width, dims.height);
    for v in canvas.iter_mut() {
        *v = u16::MAX;
    }
    canvas
}

/// Surround `image` with a white border and pad it to `aspect`.
///
/// With no border and no target ratio the image is returned as is. A
/// target ratio alone still adds the minimum one-pixel border.
#[must_use = "returns the framed image"]
pub fn add_frame<P>(
    image: &ImageBuffer<P, Vec<u16>>,
    frame: f64,
    aspect: FitAspectRatio,
) -> ImageBuffer<P, Vec<u16>>
where
    P: Pixel<Subpixel = u16>,
{
    let dims = Dimensions::of(image);
    if (frame <= 0.0 && aspect == FitAspectRatio::KeepOriginal) || dims.is_empty() {
        return image.clone();
    }
    let border = frame_size(dims, frame);
    let framed_dims = Dimensions::new(dims.width + 2 * border, dims.height + 2 * border);
    let (out_dims, pad_x, pad_y) = match aspect {
        FitAspectRatio::KeepOriginal => (framed_dims, 0, 0),
        FitAspectRatio::Ratio { width, height } => {
            fit(framed_dims, oriented_ratio(width, height, dims))
        }
    };
    let mut out = white_canvas::<P>(out_dims);
    imageops::replace(
        &mut out,
        image,
        i64::from(pad_x + border),
        i64::from(pad_y + border),
    );
    out
}

/// [`add_frame`] for either kind of positive.
#[must_use = "returns the framed image"]
pub fn frame_positive(positive: &Positive, frame: f64, aspect: FitAspectRatio) -> Positive {
    match positive {
        Positive::Color(img) => Positive::Color(add_frame(img, frame, aspect)),
        Positive::Mono(img) => Positive::Mono(add_frame(img, frame, aspect)),
    }
}
