//! Saturation scaling in HSV space.

use image::Rgb32FImage;

use crate::types::MAX_VALUE;

/// Saturation slider value that leaves the image untouched.
pub const NEUTRAL: f32 = 100.0;

/// Hue, saturation, value. Hue is a fraction of a full turn in [0, 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

/// Convert normalized RGB to HSV.
#[must_use]
pub fn rgb_to_hsv([r, g, b]: [f32; 3]) -> Hsv {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if max <= 0.0 || delta <= 0.0 {
        return Hsv { h: 0.0, s: 0.0, v: max };
    }
    let s = delta / max;
    let sector = if r >= max {
        (g - b) / delta
    } else if g >= max {
        2.0 + (b - r) / delta
    } else {
        4.0 + (r - g) / delta
    };
    Hsv {
        h: (sector / 6.0).rem_euclid(1.0),
        s,
        v: max,
    }
}

/// Convert HSV back to normalized RGB.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hsv_to_rgb(Hsv { h, s, v }: Hsv) -> [f32; 3] {
    if s <= 0.0 {
        return [v; 3];
    }
    let h6 = h.rem_euclid(1.0) * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * s.mul_add(-f, 1.0);
    let t = v * s.mul_add(-(1.0 - f), 1.0);
    match sector as u8 % 6 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Scale saturation by `saturation / 100`, clamping to [0, 1].
///
/// At [`NEUTRAL`] the buffer is not touched at all. Otherwise values are
/// clipped to the 16-bit range on the way into HSV.
pub fn apply(image: &mut Rgb32FImage, saturation: f32) {
    if saturation == NEUTRAL {
        return;
    }
    let factor = saturation / 100.0;
    for px in image.pixels_mut() {
        let mut hsv = rgb_to_hsv(px.0.map(|c| (c / MAX_VALUE).clamp(0.0, 1.0)));
        hsv.s = (hsv.s * factor).clamp(0.0, 1.0);
        px.0 = hsv_to_rgb(hsv).map(|c| c * MAX_VALUE);
    }
}
