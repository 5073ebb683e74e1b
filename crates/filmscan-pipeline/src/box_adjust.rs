//! Shrinking or growing a rotated box by per-axis percentages.
//!
//! Percentages are of the box's own width and height, split evenly
//! between opposite sides, so a 5% shrink leaves a box 95% as wide.
//! Negative percentages grow the box.
//!
//! Corners move toward the centroid along the image axes. For a tilted
//! box that alone would drag each corner off the box's own edges, so a
//! skew term proportional to the tilt moves the corner back along the
//! other axis.

use imageproc::point::Point as IPoint;

/// Skew correction gain applied to the horizontal tilt of the box.
const SKEW_GAIN: f64 = 1.5;

/// Return `corners` moved inward by `x_percent` of the box width and
/// `y_percent` of the box height, in the input's corner order.
///
/// The skew term is tuned for the small tilts of a scanned frame. As the
/// tilt approaches 45° it grows large enough to cancel the vertical
/// move: at 40° to 45° the width still shrinks by `x_percent` but the
/// height is left unchanged.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn shrink_box(corners: [IPoint<i32>; 4], x_percent: f64, y_percent: f64) -> [IPoint<i32>; 4] {
    // Start from the corner nearest the origin.
    let start = (0..4)
        .min_by_key(|&i| i64::from(corners[i].x) + i64::from(corners[i].y))
        .unwrap_or(0);
    let ordered: [IPoint<i32>; 4] = std::array::from_fn(|i| corners[(start + i) % 4]);

    let mut xs = ordered.map(|p| f64::from(p.x));
    let mut ys = ordered.map(|p| f64::from(p.y));
    xs.sort_by(f64::total_cmp);
    ys.sort_by(f64::total_cmp);
    let width = (xs[2] + xs[3] - xs[0] - xs[1]) / 2.0;
    let height = (ys[2] + ys[3] - ys[0] - ys[1]) / 2.0;

    let skew = if width.abs() > f64::EPSILON {
        f64::from(ordered[3].x - ordered[0].x) / width * SKEW_GAIN
    } else {
        0.0
    };

    let centre_x = ordered.iter().map(|p| f64::from(p.x)).sum::<f64>() / 4.0;
    let centre_y = ordered.iter().map(|p| f64::from(p.y)).sum::<f64>() / 4.0;

    let x_offset = x_percent / 200.0 * width;
    let y_offset = y_percent / 200.0 * height;
    let x_step = x_offset as i32;
    let y_step = y_offset as i32;
    let x_skew = (x_offset * skew) as i32;
    let y_skew = (y_offset * skew) as i32;

    let moved = ordered.map(|p| {
        let mut dx = 0;
        let mut dy = 0;
        if f64::from(p.y) < centre_y {
            dy += y_step;
        } else if f64::from(p.y) > centre_y {
            dy -= y_step;
        }
        if f64::from(p.x) < centre_x {
            dx += x_step;
        } else if f64::from(p.x) > centre_x {
            dx -= x_step;
        }
        if dx > 0 {
            dy -= x_skew;
        } else {
            dy += x_skew;
        }
        if dy < 0 {
            dx -= y_skew;
        } else {
            dx += y_skew;
        }
        IPoint::new(p.x + dx, p.y + dy)
    });

    std::array::from_fn(|i| moved[(i + 4 - start) % 4])
}
