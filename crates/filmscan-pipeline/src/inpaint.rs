//! Fast-marching inpainting of masked pixels.
//!
//! Masked pixels are filled in order of their distance from the unmasked
//! boundary. Each one becomes a weighted mean of already known pixels
//! within [`RADIUS`], weighting near neighbours and neighbours at a
//! similar distance from the boundary more. The weights depend only on
//! geometry, so every channel is filled with the same stencil.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use image::{GrayImage, ImageBuffer, Pixel};

/// Neighbourhood radius in pixels.
pub const RADIUS: i64 = 3;

const NEIGHBOURS: [(i64, i64, f64); 8] = [
    (-1, 0, 1.0),
    (1, 0, 1.0),
    (0, -1, 1.0),
    (0, 1, 1.0),
    (-1, -1, std::f64::consts::SQRT_2),
    (1, -1, std::f64::consts::SQRT_2),
    (-1, 1, std::f64::consts::SQRT_2),
    (1, 1, std::f64::consts::SQRT_2),
];

/// Arrival distance of every pixel from the nearest unmasked pixel.
///
/// Unmasked pixels are at zero. Masked pixels unreachable from any
/// unmasked pixel stay at infinity.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn arrival_distances(mask: &GrayImage) -> Vec<f64> {
    let (w, h) = (i64::from(mask.width()), i64::from(mask.height()));
    let mut dist = vec![f64::INFINITY; mask.as_raw().len()];
    // Non-negative floats order like their bit patterns.
    let mut heap = BinaryHeap::new();
    for (i, &m) in mask.as_raw().iter().enumerate() {
        if m == 0 {
            dist[i] = 0.0;
            heap.push(Reverse((0_u64, i)));
        }
    }
    while let Some(Reverse((bits, i))) = heap.pop() {
        let d = f64::from_bits(bits);
        if d > dist[i] {
            continue;
        }
        let (x, y) = (i as i64 % w, i as i64 / w);
        for (dx, dy, step) in NEIGHBOURS {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let j = (ny * w + nx) as usize;
            let nd = d + step;
            if nd < dist[j] {
                dist[j] = nd;
                heap.push(Reverse((nd.to_bits(), j)));
            }
        }
    }
    dist
}

/// Fill the pixels of `image` where `mask` is non-zero from their
/// surroundings. Pixels outside the mask are returned unchanged.
///
/// A mask of a different size leaves the image untouched.
#[must_use = "returns the inpainted image"]
#[allow(
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
pub fn inpaint<P>(image: &ImageBuffer<P, Vec<u16>>, mask: &GrayImage) -> ImageBuffer<P, Vec<u16>>
where
    P: Pixel<Subpixel = u16>,
{
    let mut out = image.clone();
    if image.dimensions() != mask.dimensions() {
        tracing::warn!(
            image = ?image.dimensions(),
            mask = ?mask.dimensions(),
            "dust mask size mismatch; skipping inpainting"
        );
        return out;
    }
    let dist = arrival_distances(mask);
    let mut order: Vec<usize> = (0..dist.len())
        .filter(|&i| mask.as_raw()[i] != 0 && dist[i].is_finite())
        .collect();
    order.sort_by(|&a, &b| dist[a].total_cmp(&dist[b]).then(a.cmp(&b)));

    let channels = usize::from(P::CHANNEL_COUNT);
    let (w, h) = (i64::from(image.width()), i64::from(image.height()));
    let mut known: Vec<bool> = mask.as_raw().iter().map(|&m| m == 0).collect();
    let mut acc = vec![0.0_f64; channels];

    for i in order {
        let (x, y) = (i as i64 % w, i as i64 / w);
        acc.iter_mut().for_each(|a| *a = 0.0);
        let mut total = 0.0;
        for dy in -RADIUS..=RADIUS {
            for dx in -RADIUS..=RADIUS {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let d2 = (dx * dx + dy * dy) as f64;
                if d2 == 0.0 || d2 > (RADIUS * RADIUS) as f64 {
                    continue;
                }
                let j = (ny * w + nx) as usize;
                if !known[j] {
                    continue;
                }
                let level = 1.0 / (1.0 + (dist[j] - dist[i]).abs());
                let weight = level / d2;
                let base = j * channels;
                for (a, &v) in acc.iter_mut().zip(&out.as_raw()[base..base + channels]) {
                    *a += weight * f64::from(v);
                }
                total += weight;
            }
        }
        if total > 0.0 {
            let base = i * channels;
            let filled = acc.iter().map(|a| (a / total).round().clamp(0.0, 65535.0) as u16);
            for (dst, v) in (*out).iter_mut().skip(base).take(channels).zip(filled) {
                *dst = v;
            }
        }
        known[i] = true;
    }
    out
}
