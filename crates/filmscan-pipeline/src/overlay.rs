//! Diagnostic overlay of frame detection on the raw scan.
//!
//! The threshold mask is tinted cyan, striped, and added faintly to an
//! 8-bit rendering of the raw image. When a frame was found, the band
//! between the crop and the statistics sample is shaded red, the detected
//! rectangle and contour are outlined in yellow, and the crop in green.

use image::{GrayImage, Luma, Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point as IPoint;

use crate::crop::CropSpec;
use crate::geometry::Geometry;
use crate::scale::ResolutionScale;
use crate::types::{Dimensions, Rgb16Image};

const DETECTED: Rgb<u8> = Rgb([255, 255, 0]);
const CROP: Rgb<u8> = Rgb([0, 255, 0]);

/// Weight of the threshold tint.
const THRESHOLD_WEIGHT: f32 = 0.2;

/// Threshold mask at `dims`, resampled from the estimate's size if needed.
fn mask_at(geometry: &Geometry, dims: Dimensions) -> GrayImage {
    if geometry.dimensions == dims {
        geometry.threshold.clone()
    } else {
        imageops::resize(
            &geometry.threshold,
            dims.width,
            dims.height,
            imageops::FilterType::Nearest,
        )
    }
}

/// Add the striped cyan threshold tint to `img`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn tint_threshold(img: &mut RgbImage, mask: &GrayImage, zebra: u32) {
    for (x, y, px) in img.enumerate_pixels_mut() {
        let stripe = (x + y) % (2 * zebra) > zebra;
        let m = mask.get_pixel(x, y).0[0];
        if stripe || m == 0 {
            continue;
        }
        let tint = f32::from(m / 2) * THRESHOLD_WEIGHT;
        for c in &mut px.0[1..] {
            *c = (f32::from(*c) + tint).round().min(255.0) as u8;
        }
    }
}

/// Shade pixels inside the crop but outside the statistics sample.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shade_ignore_zone(img: &mut RgbImage, crop: &[IPoint<i32>; 4], sample: &[IPoint<i32>; 4]) {
    let mut zone = GrayImage::new(img.width(), img.height());
    fill_quad(&mut zone, crop, Luma([255]));
    fill_quad(&mut zone, sample, Luma([0]));
    for (px, z) in img.pixels_mut().zip(zone.iter()) {
        if *z == 0 {
            continue;
        }
        px.0[0] = 255;
        for c in &mut px.0[1..] {
            *c = (f32::from(*c) * 0.8).round() as u8;
        }
    }
}

fn fill_quad(mask: &mut GrayImage, quad: &[IPoint<i32>; 4], value: Luma<u8>) {
    let mut poly: Vec<IPoint<i32>> = quad.to_vec();
    poly.dedup();
    if poly.len() >= 3 && poly.first() != poly.last() {
        draw_polygon_mut(mask, &poly, value);
    }
}

/// Draw a segment `thickness` pixels wide.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn thick_segment(img: &mut RgbImage, a: IPoint<i32>, b: IPoint<i32>, thickness: u32, colour: Rgb<u8>) {
    let (ax, ay) = (a.x as f32, a.y as f32);
    let (bx, by) = (b.x as f32, b.y as f32);
    if thickness <= 1 {
        draw_line_segment_mut(img, (ax, ay), (bx, by), colour);
        return;
    }
    let len = (bx - ax).hypot(by - ay);
    if len < f32::EPSILON {
        return;
    }
    let half = thickness as f32 / 2.0;
    let (nx, ny) = (-(by - ay) / len * half, (bx - ax) / len * half);
    let quad = [
        IPoint::new((ax + nx).round() as i32, (ay + ny).round() as i32),
        IPoint::new((bx + nx).round() as i32, (by + ny).round() as i32),
        IPoint::new((bx - nx).round() as i32, (by - ny).round() as i32),
        IPoint::new((ax - nx).round() as i32, (ay - ny).round() as i32),
    ];
    let mut poly = quad.to_vec();
    poly.dedup();
    if poly.len() >= 3 && poly.first() != poly.last() {
        draw_polygon_mut(img, &poly, colour);
    } else {
        draw_line_segment_mut(img, (ax, ay), (bx, by), colour);
    }
}

/// Draw the closed outline through `points`.
fn outline(img: &mut RgbImage, points: &[IPoint<i32>], thickness: u32, colour: Rgb<u8>) {
    let Some(&first) = points.first() else {
        return;
    };
    let mut prev = first;
    for &p in points.iter().skip(1).chain(std::iter::once(&first)) {
        thick_segment(img, prev, p, thickness, colour);
        prev = p;
    }
}

/// Contour points moved from the estimate's pixel grid onto `dims`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
fn rescale(points: &[IPoint<i32>], from: Dimensions, to: Dimensions) -> Vec<IPoint<i32>> {
    if from == to || from.is_empty() {
        return points.to_vec();
    }
    let sx = f64::from(to.width) / f64::from(from.width);
    let sy = f64::from(to.height) / f64::from(from.height);
    points
        .iter()
        .map(|p| {
            IPoint::new(
                (f64::from(p.x) * sx).round() as i32,
                (f64::from(p.y) * sy).round() as i32,
            )
        })
        .collect()
}

/// Render the detection overlay for `raw`, in sensor orientation.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn render(raw: &Rgb16Image, geometry: &Geometry, crop: &CropSpec) -> RgbImage {
    let dims = Dimensions::of(raw);
    let scale = ResolutionScale::new(dims);
    let mut img = crate::grayscale::to_rgb8(raw);
    if dims.is_empty() {
        return img;
    }
    tint_threshold(&mut img, &mask_at(geometry, dims), scale.zebra_width());

    let (Some(rect), Some(boxes)) = (crop.rect, crop.boxes(dims)) else {
        return img;
    };
    shade_ignore_zone(&mut img, &boxes.crop, &boxes.sample);

    let line = scale.line_width();
    let thin = ((f64::from(line) * 0.75) as u32).max(1);
    outline(&mut img, &rect.to_pixels(dims).box_points(), thin, DETECTED);
    if let Some(contour) = &geometry.contour {
        outline(&mut img, &rescale(contour, geometry.dimensions, dims), thin, DETECTED);
    }
    outline(&mut img, &boxes.crop, line, CROP);
    img
}
