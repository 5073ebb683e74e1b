//! Rotated rectangles in pixel and normalized coordinates.
//!
//! A rectangle is stored as centre, size, and angle in degrees. `width`
//! runs along the direction `(cos a, sin a)` in image coordinates (y
//! down) and `height` along the perpendicular `(-sin a, cos a)`.
//!
//! # Canonical form
//!
//! The same rectangle can be described by four angles 90° apart, with
//! width and height swapped for every quarter turn. [`RotatedRect::canonical`]
//! picks the description whose angle lies in (-45°, 45°], so `width` is
//! always the near-horizontal side. Geometry estimation emits only
//! canonical rectangles and the cropper canonicalizes whatever it is
//! given, which keeps the output upright for any input angle.

use imageproc::point::Point as IPoint;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Point};

/// A rotated rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    /// Centre in pixels.
    pub center: Point,
    /// Extent along the rectangle's own x axis.
    pub width: f64,
    /// Extent along the rectangle's own y axis.
    pub height: f64,
    /// Rotation of the rectangle's x axis, in degrees, clockwise on screen.
    pub angle: f64,
}

impl RotatedRect {
    /// An axis-aligned rectangle covering a whole image.
    #[must_use]
    pub fn full_image(dims: Dimensions) -> Self {
        let w = f64::from(dims.width);
        let h = f64::from(dims.height);
        Self {
            center: Point::new(w / 2.0, h / 2.0),
            width: w,
            height: h,
            angle: 0.0,
        }
    }

    /// The equivalent rectangle with angle in (-45°, 45°].
    #[must_use]
    pub fn canonical(self) -> Self {
        let mut rect = self;
        if !rect.angle.is_finite() {
            rect.angle = 0.0;
            return rect;
        }
        rect.angle %= 360.0;
        while rect.angle <= -45.0 {
            rect.angle += 90.0;
            std::mem::swap(&mut rect.width, &mut rect.height);
        }
        while rect.angle > 45.0 {
            rect.angle -= 90.0;
            std::mem::swap(&mut rect.width, &mut rect.height);
        }
        rect
    }

    /// The rectangle through four corners given in cyclic order.
    ///
    /// Opposite sides are averaged, which absorbs corners that were
    /// rounded to integer pixels.
    #[must_use]
    pub fn from_corners(corners: [Point; 4]) -> Self {
        let [a, b, c, d] = corners;
        let center = Point::new(
            (a.x + b.x + c.x + d.x) / 4.0,
            (a.y + b.y + c.y + d.y) / 4.0,
        );
        let width = f64::midpoint(a.distance(b), d.distance(c));
        let height = f64::midpoint(b.distance(c), a.distance(d));
        let (dx, dy) = ((b.x - a.x) + (c.x - d.x), (b.y - a.y) + (c.y - d.y));
        let angle = if dx.hypot(dy) <= f64::EPSILON {
            0.0
        } else {
            dy.atan2(dx).to_degrees()
        };
        Self {
            center,
            width,
            height,
            angle,
        }
    }

    /// Unit vectors of the rectangle's own x and y axes.
    fn axes(self) -> ((f64, f64), (f64, f64)) {
        let (sin, cos) = self.angle.to_radians().sin_cos();
        ((cos, sin), (-sin, cos))
    }

    /// Corners in the order top-left, top-right, bottom-right, bottom-left
    /// of the rectangle's own frame.
    #[must_use]
    pub fn corners(self) -> [Point; 4] {
        let (u, v) = self.axes();
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)].map(|(su, sv)| {
            Point::new(
                (su * hw).mul_add(u.0, (sv * hh) * v.0) + self.center.x,
                (su * hw).mul_add(u.1, (sv * hh) * v.1) + self.center.y,
            )
        })
    }

    /// Corners truncated to integer pixel coordinates.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn box_points(self) -> [IPoint<i32>; 4] {
        self.corners().map(|p| IPoint::new(p.x as i32, p.y as i32))
    }

    /// Express in fractions of `dims`.
    #[must_use]
    pub fn normalize(self, dims: Dimensions) -> NormalizedRect {
        let w = f64::from(dims.width.max(1));
        let h = f64::from(dims.height.max(1));
        NormalizedRect {
            center_x: self.center.x / w,
            center_y: self.center.y / h,
            width: self.width / w,
            height: self.height / h,
            angle: self.angle,
        }
    }
}

/// A rotated rectangle in image-relative coordinates.
///
/// Horizontal quantities are fractions of the image width and vertical
/// quantities fractions of the image height, so one rectangle applies to
/// a proxy and to the full decode alike.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    /// Centre x as a fraction of image width.
    pub center_x: f64,
    /// Centre y as a fraction of image height.
    pub center_y: f64,
    /// Width as a fraction of image width.
    pub width: f64,
    /// Height as a fraction of image height.
    pub height: f64,
    /// Angle in degrees.
    pub angle: f64,
}

impl NormalizedRect {
    /// Scale to pixel coordinates of an image of `dims`.
    #[must_use]
    pub fn to_pixels(self, dims: Dimensions) -> RotatedRect {
        let w = f64::from(dims.width);
        let h = f64::from(dims.height);
        RotatedRect {
            center: Point::new(self.center_x * w, self.center_y * h),
            width: self.width * w,
            height: self.height * h,
            angle: self.angle,
        }
    }
}

/// Minimum-area rectangle enclosing `points`, in canonical form.
///
/// Returns `None` for an empty point set. One or two distinct points give
/// a degenerate rectangle with zero height. Corners come back from
/// imageproc snapped outward to whole pixels, so sizes may exceed the
/// exact hull extent by up to a pixel.
#[must_use]
pub fn min_area_rect(points: &[IPoint<i32>]) -> Option<RotatedRect> {
    if points.is_empty() {
        return None;
    }
    let corners = imageproc::geometry::min_area_rect(points)
        .map(|p| Point::new(f64::from(p.x), f64::from(p.y)));
    Some(RotatedRect::from_corners(corners).canonical())
}
