//! Frame location: threshold the scan, take the dominant contour, and fit
//! a minimum-area rotated rectangle to it.

use imageproc::contours::{BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::point::Point as IPoint;

use crate::rect::{NormalizedRect, min_area_rect};
use crate::types::{Dimensions, GrayImage, Rgb16Image};

/// Chebyshev radius of the speckle erosion: two passes of a 7x7 square.
const ERODE_RADIUS: u8 = 6;

/// Result of locating the film frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Size of the image the estimate was made on.
    pub dimensions: Dimensions,
    /// Eroded midtone mask (255 = frame candidate).
    pub threshold: GrayImage,
    /// Outline of the largest external contour, for visualization.
    pub contour: Option<Vec<IPoint<i32>>>,
    /// Detected frame, or `None` when nothing was found.
    pub rect: Option<NormalizedRect>,
}

impl Geometry {
    /// Bytes held by the threshold mask and contour.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.threshold.as_raw().len()
            + self
                .contour
                .as_ref()
                .map_or(0, |c| c.len() * std::mem::size_of::<IPoint<i32>>())
    }
}

/// Convert a slider percentage into an 8-bit threshold level.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn level(percent: f64) -> u8 {
    (percent / 100.0 * 255.0).clamp(0.0, 255.0) as u8
}

/// Midtone mask: pixels brighter than `dark_threshold` and not brighter
/// than `light_threshold` (both percent of full scale), eroded to drop
/// speckle.
#[must_use]
pub fn threshold_mask(image: &Rgb16Image, dark_threshold: f64, light_threshold: f64) -> GrayImage {
    let dark = level(dark_threshold);
    let light = level(light_threshold);
    let mut mask = crate::grayscale::to_gray8(image);
    for v in mask.iter_mut() {
        *v = if *v > dark && *v <= light { 255 } else { 0 };
    }
    imageproc::morphology::erode(&mask, Norm::LInf, ERODE_RADIUS)
}

/// The external contour enclosing the largest area.
#[must_use]
pub fn largest_external_contour(mask: &GrayImage) -> Option<Vec<IPoint<i32>>> {
    let contours: Vec<Contour<i32>> = imageproc::contours::find_contours(mask);
    let total = contours.len();
    let best = contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| (imageproc::geometry::contour_area(&c.points), c.points))
        .fold(None::<(f64, Vec<IPoint<i32>>)>, |best, (area, points)| {
            match best {
                Some((best_area, _)) if best_area >= area => best,
                _ => Some((area, points)),
            }
        });
    tracing::debug!(
        contours = total,
        largest_area = best.as_ref().map_or(0.0, |(a, _)| *a),
        "traced threshold contours"
    );
    best.map(|(_, points)| points)
}

/// Locate the film frame in `image`.
///
/// Finding nothing is not an error: the returned geometry has no
/// rectangle and the crop stage passes the image through.
#[must_use]
pub fn estimate(image: &Rgb16Image, dark_threshold: f64, light_threshold: f64) -> Geometry {
    let dimensions = Dimensions::of(image);
    let threshold = threshold_mask(image, dark_threshold, light_threshold);
    let contour = largest_external_contour(&threshold);
    let rect = contour
        .as_deref()
        .and_then(min_area_rect)
        .filter(|r| r.width >= 1.0 && r.height >= 1.0)
        .map(|r| r.normalize(dimensions));
    match rect {
        Some(r) => tracing::debug!(
            center_x = r.center_x,
            center_y = r.center_y,
            width = r.width,
            height = r.height,
            angle = r.angle,
            "frame located"
        ),
        None => tracing::warn!("no frame detected; crop disabled for this run"),
    }
    Geometry {
        dimensions,
        threshold,
        contour,
        rect,
    }
}
