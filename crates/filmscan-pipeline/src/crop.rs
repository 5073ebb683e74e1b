//! Perspective-correcting crop of a rotated frame.
//!
//! The frame rectangle is scaled to the buffer, its corners are moved by
//! the crop margins, and a projective transform maps them onto an
//! axis-aligned output. The same machinery yields the statistics sample
//! used by tone equalization, which is additionally shrunk by the ignore
//! border.

use image::{ImageBuffer, Pixel};
use imageproc::definitions::Clamp;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use imageproc::point::Point as IPoint;

use crate::box_adjust::shrink_box;
use crate::config::AxisPercent;
use crate::rect::{NormalizedRect, RotatedRect};
use crate::types::Dimensions;

/// Signed per-axis crop percentages of the frame rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropMargins {
    /// Percentage of the frame width.
    pub x: f64,
    /// Percentage of the frame height.
    pub y: f64,
}

impl CropMargins {
    /// Split one border percentage across the axes so both axes lose the
    /// same number of pixels. The shorter image axis takes the full
    /// percentage.
    #[must_use]
    pub fn from_border_crop(border_crop: f64, dims: Dimensions) -> Self {
        let w = f64::from(dims.width.max(1));
        let h = f64::from(dims.height.max(1));
        if h > w {
            Self {
                x: border_crop,
                y: border_crop * w / h,
            }
        } else {
            Self {
                x: border_crop * h / w,
                y: border_crop,
            }
        }
    }

    /// Whether the user asked to include extra border.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.x < 0.0 || self.y < 0.0
    }
}

/// Statistics ignore zone settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IgnoreZone {
    /// Extra border excluded from statistics.
    pub border: AxisPercent,
    /// With a negative crop margin, sample inside the detected frame rather
    /// than the enlarged crop.
    pub ignore_negative_border: bool,
}

/// The corner sets derived from one frame rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBoxes {
    /// Detected frame corners.
    pub frame: [IPoint<i32>; 4],
    /// Output crop corners.
    pub crop: [IPoint<i32>; 4],
    /// Statistics sample corners.
    pub sample: [IPoint<i32>; 4],
    /// Output buffer size for the crop.
    pub output: Dimensions,
    /// Output buffer size for the sample.
    pub sample_output: Dimensions,
}

/// Compute every corner set for `rect` on an image of `dims`.
///
/// Returns `None` when the cropped output would be empty.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn crop_boxes(
    rect: &NormalizedRect,
    dims: Dimensions,
    margins: CropMargins,
    ignore: IgnoreZone,
) -> Option<CropBoxes> {
    let pixels: RotatedRect = rect.to_pixels(dims).canonical();
    let frame = pixels.box_points();
    let crop = shrink_box(frame, margins.x, margins.y);
    let sample_base = if margins.is_negative() && ignore.ignore_negative_border {
        frame
    } else {
        crop
    };
    let sample = shrink_box(sample_base, ignore.border.x, ignore.border.y);

    let out_w = (pixels.width * (1.0 - margins.x / 100.0)).floor();
    let out_h = (pixels.height * (1.0 - margins.y / 100.0)).floor();
    if out_w < 1.0 || out_h < 1.0 {
        return None;
    }
    let output = Dimensions::new(out_w as u32, out_h as u32);
    let sample_output = quad_size(&sample);
    Some(CropBoxes {
        frame,
        crop,
        sample,
        output,
        sample_output,
    })
}

/// Mean side lengths of a quadrilateral, at least one pixel each.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quad_size(q: &[IPoint<i32>; 4]) -> Dimensions {
    let len = |a: IPoint<i32>, b: IPoint<i32>| f64::from(b.x - a.x).hypot(f64::from(b.y - a.y));
    let w = f64::midpoint(len(q[0], q[1]), len(q[3], q[2]));
    let h = f64::midpoint(len(q[1], q[2]), len(q[0], q[3]));
    Dimensions::new(w.floor().max(1.0) as u32, h.floor().max(1.0) as u32)
}

/// Warp the quadrilateral `corners` of `image` onto an upright buffer of
/// size `output`. Pixels mapped from outside the image are black.
///
/// Returns `None` when the corners do not define a projective transform.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn warp_quad<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    corners: &[IPoint<i32>; 4],
    output: Dimensions,
) -> Option<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel + Send + Sync + 'static,
    P::Subpixel: Into<f32> + Clamp<f32> + Send + Sync,
{
    let src = corners.map(|p| (p.x as f32, p.y as f32));
    let w = output.width as f32;
    let h = output.height as f32;
    let dst = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    let projection = Projection::from_control_points(src, dst)?;
    let mut out = ImageBuffer::<P, Vec<P::Subpixel>>::new(output.width, output.height);
    let black = *out.get_pixel(0, 0);
    warp_into(image, &projection, Interpolation::Bilinear, black, &mut out);
    Some(out)
}

/// Which of the two crops to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropRegion {
    /// The user-visible crop.
    Output,
    /// The statistics sample inside the ignore zone.
    Sample,
}

/// Crop parameters shared by every crop of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropSpec {
    /// Frame rectangle, if one was found.
    pub rect: Option<NormalizedRect>,
    /// Crop margin percentage from the photo settings.
    pub border_crop: f64,
    /// Statistics ignore zone.
    pub ignore: IgnoreZone,
}

impl CropSpec {
    /// Corner sets for an image of `dims`, if a usable frame exists.
    #[must_use]
    pub fn boxes(&self, dims: Dimensions) -> Option<CropBoxes> {
        let rect = self.rect?;
        crop_boxes(
            &rect,
            dims,
            CropMargins::from_border_crop(self.border_crop, dims),
            self.ignore,
        )
    }

    /// Crop `image`, either 16-bit or float. Without a frame, or when the
    /// transform is degenerate, the image is returned unchanged.
    #[must_use]
    pub fn apply<P>(
        &self,
        image: &ImageBuffer<P, Vec<P::Subpixel>>,
        region: CropRegion,
    ) -> ImageBuffer<P, Vec<P::Subpixel>>
    where
        P: Pixel + Send + Sync + 'static,
        P::Subpixel: Into<f32> + Clamp<f32> + Send + Sync,
    {
        let Some(boxes) = self.boxes(Dimensions::of(image)) else {
            return image.clone();
        };
        let (corners, output) = match region {
            CropRegion::Output => (boxes.crop, boxes.output),
            CropRegion::Sample => (boxes.sample, boxes.sample_output),
        };
        warp_quad(image, &corners, output).unwrap_or_else(|| {
            tracing::warn!(?corners, "degenerate crop transform; leaving image uncropped");
            image.clone()
        })
    }
}
