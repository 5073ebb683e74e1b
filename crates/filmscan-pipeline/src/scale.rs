//! Resolution scaling policy.
//!
//! Every size-dependent constant (dust kernel and area, overlay line and
//! stripe widths) is derived from one factor: the mean of width and
//! height divided by [`REFERENCE_SIZE`]. Parameters tuned at the
//! reference size therefore behave the same on a proxy and on the full
//! decode.

use crate::types::Dimensions;

/// Mean side length at which the factor is 1.
pub const REFERENCE_SIZE: f64 = 800.0;

/// Resolution normalization factor for one image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionScale {
    factor: f64,
}

impl ResolutionScale {
    /// Scale for an image of `dims`.
    #[must_use]
    pub fn new(dims: Dimensions) -> Self {
        let mean = (f64::from(dims.width) + f64::from(dims.height)) / 2.0;
        Self {
            factor: mean / REFERENCE_SIZE,
        }
    }

    /// The raw factor.
    #[must_use]
    pub const fn factor(self) -> f64 {
        self.factor
    }

    /// Largest dust component area, in pixels, for a reference-size limit.
    #[must_use]
    pub fn dust_area_limit(self, max_dust_area: f64) -> f64 {
        self.factor * self.factor * max_dust_area
    }

    /// Radius of the square dust structuring element (size `2r + 1`).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn dust_kernel_radius(self) -> u8 {
        self.factor.round().clamp(0.0, f64::from(u8::MAX)) as u8
    }

    /// Outline thickness for overlay drawings.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn line_width(self) -> u32 {
        (2.0 * self.factor).ceil().max(1.0) as u32
    }

    /// Width of one zebra stripe in the threshold overlay.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn zebra_width(self) -> u32 {
        (8.0 * self.factor).round().max(1.0) as u32
    }
}
