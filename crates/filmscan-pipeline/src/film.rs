//! Film-type dispatch: the tonal path each kind of film takes from raw
//! scan to clipped positive.
//!
//! | film           | path                                                   |
//! |----------------|--------------------------------------------------------|
//! | B&W negative   | luma, invert, levels, exposure, clip                   |
//! | colour negative| invert, then the slide path                            |
//! | slide          | levels, white balance, exposure, saturation, clip      |
//! | crop only      | unchanged                                              |
//!
//! The result is still uncropped; the caller crops it with the same
//! [`CropSpec`] that selected the statistics sample.

use image::{ImageBuffer, Luma, Pixel, Rgb};

use crate::config::{BaseColor, ColorParams, FilmProcess, ToneParams};
use crate::crop::{CropRegion, CropSpec};
use crate::exposure;
use crate::grayscale::{invert, to_gray16};
use crate::saturation;
use crate::tone::{self, Percentiles, ToneStats};
use crate::types::{Positive, Rgb16Image, Rgb32FImage, clip_to_u16, map_subpixels};
use crate::white_balance::WhiteBalance;

/// Where tone statistics are sampled from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    /// Crop geometry; its sample region feeds the statistics.
    pub crop: CropSpec,
    /// Black and white point percentiles.
    pub percentiles: Percentiles,
}

/// A developed positive and the levels used to make it.
#[derive(Debug, Clone, PartialEq)]
pub struct Development {
    /// Clipped positive, not yet cropped.
    pub positive: Positive,
    /// Levels, absent for crop-only.
    pub tone: Option<ToneStats>,
}

/// Clip an unclipped buffer into the 16-bit range.
#[must_use]
pub fn clip<P, Q>(image: &ImageBuffer<P, Vec<f32>>) -> ImageBuffer<Q, Vec<u16>>
where
    P: Pixel<Subpixel = f32>,
    Q: Pixel<Subpixel = u16>,
{
    map_subpixels(image, clip_to_u16)
}

fn equalize_sampled<P, Q>(
    image: &ImageBuffer<P, Vec<u16>>,
    tone: &ToneParams,
    sampling: &Sampling,
    base_black: Option<&[f32]>,
) -> (ImageBuffer<Q, Vec<f32>>, ToneStats)
where
    P: Pixel<Subpixel = u16> + Send + Sync + 'static,
    Q: Pixel<Subpixel = f32>,
{
    let sample = sampling.crop.apply(image, CropRegion::Sample);
    tone::equalize(image, &sample, tone, sampling.percentiles, base_black)
}

/// Levels stage of the colour paths: invert negatives, then equalize.
///
/// White-balance calibration samples this buffer.
#[must_use]
pub fn equalize_color(
    image: &Rgb16Image,
    negative: bool,
    tone: &ToneParams,
    base: Option<BaseColor>,
    sampling: &Sampling,
) -> (Rgb32FImage, ToneStats) {
    let base_black = base.map(|b| tone::base_black_point(b, negative));
    if negative {
        let mut inverted = image.clone();
        invert(&mut inverted);
        equalize_sampled::<Rgb<u16>, Rgb<f32>>(&inverted, tone, sampling, base_black.as_deref())
    } else {
        equalize_sampled::<Rgb<u16>, Rgb<f32>>(image, tone, sampling, base_black.as_deref())
    }
}

fn develop_color(
    image: &Rgb16Image,
    negative: bool,
    tone: &ToneParams,
    color: &ColorParams,
    base: Option<BaseColor>,
    sampling: &Sampling,
) -> Development {
    let (mut working, stats) = equalize_color(image, negative, tone, base, sampling);
    WhiteBalance::from_color(color).apply(&mut working);
    exposure::apply(&mut working, tone);
    saturation::apply(&mut working, color.saturation);
    Development {
        positive: Positive::Color(clip(&working)),
        tone: Some(stats),
    }
}

fn develop_bw(image: &Rgb16Image, tone: &ToneParams, sampling: &Sampling) -> Development {
    let mut gray = to_gray16(image);
    invert(&mut gray);
    let (mut working, stats) =
        equalize_sampled::<Luma<u16>, Luma<f32>>(&gray, tone, sampling, None);
    exposure::apply(&mut working, tone);
    Development {
        positive: Positive::Mono(clip(&working)),
        tone: Some(stats),
    }
}

/// Develop `image` along the path selected by `process`.
#[must_use]
pub fn develop(image: &Rgb16Image, process: &FilmProcess, sampling: &Sampling) -> Development {
    tracing::debug!(film = %process.film_type(), "developing");
    match process {
        FilmProcess::BwNegative { tone } => develop_bw(image, tone, sampling),
        FilmProcess::ColorNegative { tone, color, base } => {
            develop_color(image, true, tone, color, *base, sampling)
        }
        FilmProcess::Slide { tone, color, base } => {
            develop_color(image, false, tone, color, *base, sampling)
        }
        FilmProcess::CropOnly => Development {
            positive: Positive::Color(image.clone()),
            tone: None,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{AxisPercent, WhiteBalanceMode};
    use crate::crop::IgnoreZone;

    fn no_crop() -> Sampling {
        Sampling {
            crop: CropSpec {
                rect: None,
                border_crop: 0.0,
                ignore: IgnoreZone {
                    border: AxisPercent::new(0.0, 0.0),
                    ignore_negative_border: true,
                },
            },
            percentiles: Percentiles {
                black: 0.0,
                white: 100.0,
            },
        }
    }

    /// Horizontal ramp from dark to light in every channel.
    fn ramp() -> Rgb16Image {
        Rgb16Image::from_fn(64, 4, |x, _| {
            let v = 8000 + x as u16 * 800;
            Rgb([v, v, v])
        })
    }

    fn color() -> ColorParams {
        ColorParams {
            temp: 0.0,
            tint: 0.0,
            saturation: 100.0,
            mode: WhiteBalanceMode::Coefficient,
        }
    }

    #[test]
    fn crop_only_is_identity() {
        let img = ramp();
        let dev = develop(&img, &FilmProcess::CropOnly, &no_crop());
        assert_eq!(dev.positive, Positive::Color(img));
        assert!(dev.tone.is_none());
    }

    #[test]
    fn slide_stretches_to_full_range() {
        let dev = develop(
            &ramp(),
            &FilmProcess::Slide {
                tone: ToneParams::default(),
                color: color(),
                base: None,
            },
            &no_crop(),
        );
        let out = dev.positive.as_color().unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
        assert!(out.get_pixel(63, 0).0.iter().all(|&v| v >= 65534));
    }

    #[test]
    fn colour_negative_inverts() {
        let dev = develop(
            &ramp(),
            &FilmProcess::ColorNegative {
                tone: ToneParams::default(),
                color: color(),
                base: None,
            },
            &no_crop(),
        );
        let out = dev.positive.as_color().unwrap();
        // The darkest negative pixel is the brightest positive one.
        assert!(out.get_pixel(0, 0).0.iter().all(|&v| v >= 65534));
        assert_eq!(out.get_pixel(63, 0).0, [0, 0, 0]);
    }

    #[test]
    fn bw_negative_is_mono_and_inverted() {
        let dev = develop(
            &ramp(),
            &FilmProcess::BwNegative {
                tone: ToneParams::default(),
            },
            &no_crop(),
        );
        let out = dev.positive.as_mono().unwrap();
        assert_eq!(out.dimensions(), (64, 4));
        assert!(out.get_pixel(0, 0).0[0] >= 65534);
        assert_eq!(out.get_pixel(63, 0).0[0], 0);
        let stats = dev.tone.unwrap();
        assert_eq!(stats.black_point.len(), 1);
    }

    #[test]
    fn clip_saturates_out_of_range_values() {
        let img = Rgb32FImage::from_pixel(1, 1, Rgb([-20.0, 70_000.0, 123.9]));
        let out: Rgb16Image = clip(&img);
        assert_eq!(out.get_pixel(0, 0).0, [0, 65535, 123]);
    }
}
