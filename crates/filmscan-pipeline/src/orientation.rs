//! Display orientation: quarter turns followed by an optional mirror.

use image::{ImageBuffer, Pixel, imageops};
use serde::{Deserialize, Serialize};

use crate::types::Dimensions;

/// Clockwise quarter turns and horizontal mirror applied for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Orientation {
    /// Quarter turns, reduced modulo 4.
    pub rotation: i32,
    /// Mirror left-right after rotating.
    pub flip: bool,
}

impl Orientation {
    /// Create an orientation. Any integer rotation is accepted.
    #[must_use]
    pub const fn new(rotation: i32, flip: bool) -> Self {
        Self { rotation, flip }
    }

    /// Quarter turns in 0..4.
    #[must_use]
    pub const fn quarter_turns(self) -> i32 {
        self.rotation.rem_euclid(4)
    }

    /// Whether this is the identity.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        self.quarter_turns() == 0 && !self.flip
    }

    /// Dimensions of a sensor-oriented image of `dims` after [`apply`](Self::apply).
    #[must_use]
    pub const fn display_dimensions(self, dims: Dimensions) -> Dimensions {
        if self.quarter_turns() % 2 == 1 {
            dims.transposed()
        } else {
            dims
        }
    }

    /// Rotate then mirror into display orientation.
    #[must_use = "returns the reoriented image"]
    pub fn apply<P>(self, image: &ImageBuffer<P, Vec<P::Subpixel>>) -> ImageBuffer<P, Vec<P::Subpixel>>
    where
        P: Pixel + 'static,
    {
        let mut out = match self.quarter_turns() {
            1 => imageops::rotate90(image),
            2 => imageops::rotate180(image),
            3 => imageops::rotate270(image),
            _ => image.clone(),
        };
        if self.flip {
            imageops::flip_horizontal_in_place(&mut out);
        }
        out
    }

    /// Exact inverse of [`apply`](Self::apply): mirror, then turn back.
    #[must_use = "returns the reoriented image"]
    pub fn undo<P>(self, image: &ImageBuffer<P, Vec<P::Subpixel>>) -> ImageBuffer<P, Vec<P::Subpixel>>
    where
        P: Pixel + 'static,
    {
        let mirrored;
        let source = if self.flip {
            mirrored = imageops::flip_horizontal(image);
            &mirrored
        } else {
            image
        };
        match self.quarter_turns() {
            1 => imageops::rotate270(source),
            2 => imageops::rotate180(source),
            3 => imageops::rotate90(source),
            _ => source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgb16Image;
    use image::{GrayImage, Luma, Rgb};

    fn asymmetric() -> Rgb16Image {
        Rgb16Image::from_fn(5, 3, |x, y| Rgb([x as u16, y as u16, (x * 10 + y) as u16]))
    }

    #[test]
    fn undo_restores_every_state() {
        let img = asymmetric();
        for rotation in -4..8 {
            for flip in [false, true] {
                let o = Orientation::new(rotation, flip);
                let shown = o.apply(&img);
                assert_eq!(
                    Dimensions::of(&shown),
                    o.display_dimensions(Dimensions::of(&img))
                );
                assert_eq!(o.undo(&shown), img, "rotation {rotation} flip {flip}");
            }
        }
    }

    #[test]
    fn one_turn_is_clockwise() {
        // Top-left marker ends up top-right after a clockwise turn.
        let mut img = GrayImage::new(4, 2);
        img.put_pixel(0, 0, Luma([255]));
        let out = Orientation::new(1, false).apply(&img);
        assert_eq!(out.dimensions(), (2, 4));
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn flip_happens_after_rotation() {
        let mut img = GrayImage::new(4, 2);
        img.put_pixel(0, 0, Luma([255]));
        let out = Orientation::new(1, true).apply(&img);
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn negative_rotation_wraps() {
        assert_eq!(Orientation::new(-1, false).quarter_turns(), 3);
        assert_eq!(Orientation::new(6, false).quarter_turns(), 2);
        assert!(Orientation::new(4, false).is_identity());
    }
}
