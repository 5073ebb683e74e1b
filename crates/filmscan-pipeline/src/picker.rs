//! Disc-shaped sampling regions picked on the displayed image.

use image::{GrayImage, ImageBuffer, Luma, Pixel};
use imageproc::drawing::draw_filled_circle_mut;
use serde::{Deserialize, Serialize};

use crate::orientation::Orientation;
use crate::stats::masked_mean;
use crate::types::Dimensions;

/// A location on the displayed image as fractions of its width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickPoint {
    /// Horizontal fraction, 0 at the left edge.
    pub x: f64,
    /// Vertical fraction, 0 at the top edge.
    pub y: f64,
}

impl PickPoint {
    /// Create a pick point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Mask of the picker disc, drawn in display orientation and turned back
/// to the orientation of an image of `sensor_dims`.
///
/// The radius is `radius_percent` of the displayed short side.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn disc_mask(
    sensor_dims: Dimensions,
    orientation: Orientation,
    point: PickPoint,
    radius_percent: f64,
) -> GrayImage {
    let display = orientation.display_dimensions(sensor_dims);
    let mut mask = GrayImage::new(display.width, display.height);
    let cx = (point.x * f64::from(display.width)) as i32;
    let cy = (point.y * f64::from(display.height)) as i32;
    let radius = (f64::from(display.min_side()) * radius_percent / 100.0) as i32;
    draw_filled_circle_mut(&mut mask, (cx, cy), radius.max(0), Luma([255]));
    orientation.undo(&mask)
}

/// Mean channel values of `image` inside the picker disc. `None` when the
/// disc falls entirely outside the image.
#[must_use]
pub fn sample_mean<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    orientation: Orientation,
    point: PickPoint,
    radius_percent: f64,
) -> Option<Vec<f64>>
where
    P: Pixel,
    P::Subpixel: Into<f64>,
{
    let mask = disc_mask(Dimensions::of(image), orientation, point, radius_percent);
    masked_mean(image, &mask)
}
