//! Two-tier configuration: immutable global settings plus per-photo
//! overrides, merged once into a resolved [`PhotoSettings`].
//!
//! Every value is a relative adjustment layered on top of statistics
//! computed from the image. None of them is an absolute pixel value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::downsample::DownsampleFilter;
use crate::types::PipelineError;

/// Which kind of film the scan holds. Selects the development path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilmType {
    /// Black-and-white negative: mono, inverted.
    BwNegative,
    /// Colour negative: inverted, then developed like a slide.
    #[default]
    ColorNegative,
    /// Positive transparency.
    Slide,
    /// No tonal processing, geometry only.
    CropOnly,
}

impl fmt::Display for FilmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BwNegative => f.write_str("BwNegative"),
            Self::ColorNegative => f.write_str("ColorNegative"),
            Self::Slide => f.write_str("Slide"),
            Self::CropOnly => f.write_str("CropOnly"),
        }
    }
}

/// White-balance correction strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhiteBalanceMode {
    /// Signed per-channel offsets.
    Additive,
    /// Per-channel multipliers; black stays black.
    #[default]
    Coefficient,
    /// Per-channel power curves on the normalized buffer; black and white
    /// are both fixed points.
    Gamma,
}

impl fmt::Display for WhiteBalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Additive => f.write_str("Additive"),
            Self::Coefficient => f.write_str("Coefficient"),
            Self::Gamma => f.write_str("Gamma"),
        }
    }
}

/// Sampled colour of the unexposed film base, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseColor {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
}

impl BaseColor {
    /// Create a base colour.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels in working order (RGB).
    #[must_use]
    pub const fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl Default for BaseColor {
    fn default() -> Self {
        Self::new(255, 255, 255)
    }
}

/// Per-axis percentages, used for the statistics ignore border.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisPercent {
    /// Percentage along the horizontal axis.
    pub x: f64,
    /// Percentage along the vertical axis.
    pub y: f64,
}

impl AxisPercent {
    /// Create a pair of percentages.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Target aspect ratio for the output frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FitAspectRatio {
    /// Keep the cropped image's own shape.
    #[default]
    KeepOriginal,
    /// Pad with white to the given ratio, oriented to match the image.
    Ratio {
        /// Long or short side, as written.
        width: u32,
        /// The other side, as written.
        height: u32,
    },
}

impl FromStr for FitAspectRatio {
    type Err = PipelineError;

    /// Parse `"Keep Original"` or `"W:H"` with optional trailing text such
    /// as `"4:5 (8x10)"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("keep original") {
            return Ok(Self::KeepOriginal);
        }
        let ratio = trimmed
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default();
        let invalid = || PipelineError::InvalidConfig(format!("invalid aspect ratio: {s:?}"));
        let (w, h) = ratio.split_once(':').ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self::Ratio { width, height })
    }
}

impl TryFrom<String> for FitAspectRatio {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FitAspectRatio> for String {
    fn from(value: FitAspectRatio) -> Self {
        value.to_string()
    }
}

impl fmt::Display for FitAspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepOriginal => f.write_str("Keep Original"),
            Self::Ratio { width, height } => write!(f, "{width}:{height}"),
        }
    }
}

/// Output file format for the export collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// 8-bit JPEG.
    #[default]
    Jpeg,
    /// 16-bit TIFF.
    Tiff,
    /// 16-bit PNG.
    Png,
}

impl OutputFormat {
    /// Conventional file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Tiff => "tiff",
            Self::Png => "png",
        }
    }
}

/// Settings consumed by the export stage, carried here so one settings
/// file covers everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Output format.
    pub format: OutputFormat,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            jpeg_quality: 90,
        }
    }
}

/// Advanced parameters shared by every photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// A proxy is derived when `width + height` exceeds this bound.
    pub max_proxy_size: u32,
    /// Resampling filter for the proxy.
    pub proxy_filter: DownsampleFilter,
    /// Histogram plot height in pixels.
    pub histogram_height: u32,
    /// Histogram plot width in pixels.
    pub histogram_width: u32,
    /// Histogram background colour (RGB).
    pub histogram_background: [u8; 3],
    /// White frame thickness as a percentage of the short side.
    pub frame: f64,
    /// Aspect ratio the framed output is padded to.
    pub fit_aspect_ratio: FitAspectRatio,
    /// Percentile used for the automatic black point.
    pub black_point_percentile: f64,
    /// Percentile used for the automatic white point.
    pub white_point_percentile: f64,
    /// Extra border excluded from tone statistics.
    pub ignore_border: AxisPercent,
    /// When the crop margin is negative, keep the extra margin out of the
    /// statistics sample.
    pub ignore_negative_border: bool,
    /// Dust threshold as a percentage of the black-to-white range.
    pub dust_threshold: f64,
    /// Largest dust component, in pixels at the reference resolution.
    pub max_dust_area: f64,
    /// Iterations of the closing applied to the dust threshold.
    pub dust_iterations: u8,
    /// Picker disc radius as a percentage of the short side.
    pub picker_radius: f64,
    /// White-balance strategy.
    pub white_balance_mode: WhiteBalanceMode,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            max_proxy_size: 2000,
            proxy_filter: DownsampleFilter::default(),
            histogram_height: 1600,
            histogram_width: 2400,
            histogram_background: [25, 25, 25],
            frame: 0.0,
            fit_aspect_ratio: FitAspectRatio::KeepOriginal,
            black_point_percentile: 0.5,
            white_point_percentile: 99.0,
            ignore_border: AxisPercent::new(1.0, 1.0),
            ignore_negative_border: true,
            dust_threshold: 10.0,
            max_dust_area: 15.0,
            dust_iterations: 5,
            picker_radius: 0.5,
            white_balance_mode: WhiteBalanceMode::Coefficient,
        }
    }
}

/// The per-photo parameter vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoSettings {
    /// Pixels darker than this percentage count as background.
    pub dark_threshold: f64,
    /// Pixels lighter than this percentage count as background.
    pub light_threshold: f64,
    /// Crop margin in percent. Negative values include extra border.
    pub border_crop: f64,
    /// Mirror horizontally for display.
    pub flip: bool,
    /// Clockwise quarter turns for display.
    pub rotation: i32,
    /// Development path.
    pub film_type: FilmType,
    /// White point slider, -100..100.
    pub white_point: f32,
    /// Black point slider, -100..100.
    pub black_point: f32,
    /// Gamma slider, -100..100. Positive brightens.
    pub gamma: f32,
    /// Shadow slider, -100..100.
    pub shadows: f32,
    /// Highlight slider, -100..100.
    pub highlights: f32,
    /// Temperature, -100..100.
    pub temp: f32,
    /// Tint, -100..100.
    pub tint: f32,
    /// Saturation, 0..200 with 100 neutral.
    pub saturation: f32,
    /// Excluded from export.
    pub reject: bool,
    /// Use `base_rgb` instead of percentile statistics for the black point.
    pub base_detect: bool,
    /// Sampled film base colour.
    pub base_rgb: BaseColor,
    /// Inpaint detected dust when rendering.
    pub remove_dust: bool,
}

impl Default for PhotoSettings {
    fn default() -> Self {
        Self {
            dark_threshold: 25.0,
            light_threshold: 100.0,
            border_crop: 1.0,
            flip: false,
            rotation: 0,
            film_type: FilmType::ColorNegative,
            white_point: 0.0,
            black_point: 0.0,
            gamma: 0.0,
            shadows: 0.0,
            highlights: 0.0,
            temp: 0.0,
            tint: 0.0,
            saturation: 100.0,
            reject: false,
            base_detect: false,
            base_rgb: BaseColor::default(),
            remove_dust: false,
        }
    }
}

/// Per-photo values that differ from the global defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoOverrides {
    pub dark_threshold: Option<f64>,
    pub light_threshold: Option<f64>,
    pub border_crop: Option<f64>,
    pub flip: Option<bool>,
    pub rotation: Option<i32>,
    pub film_type: Option<FilmType>,
    pub white_point: Option<f32>,
    pub black_point: Option<f32>,
    pub gamma: Option<f32>,
    pub shadows: Option<f32>,
    pub highlights: Option<f32>,
    pub temp: Option<f32>,
    pub tint: Option<f32>,
    pub saturation: Option<f32>,
    pub reject: Option<bool>,
    pub base_detect: Option<bool>,
    pub base_rgb: Option<BaseColor>,
    pub remove_dust: Option<bool>,
}

impl PhotoSettings {
    /// Merge `overrides` onto `defaults`.
    #[must_use]
    pub fn resolve(defaults: &Self, overrides: &PhotoOverrides) -> Self {
        Self {
            dark_threshold: overrides.dark_threshold.unwrap_or(defaults.dark_threshold),
            light_threshold: overrides.light_threshold.unwrap_or(defaults.light_threshold),
            border_crop: overrides.border_crop.unwrap_or(defaults.border_crop),
            flip: overrides.flip.unwrap_or(defaults.flip),
            rotation: overrides.rotation.unwrap_or(defaults.rotation),
            film_type: overrides.film_type.unwrap_or(defaults.film_type),
            white_point: overrides.white_point.unwrap_or(defaults.white_point),
            black_point: overrides.black_point.unwrap_or(defaults.black_point),
            gamma: overrides.gamma.unwrap_or(defaults.gamma),
            shadows: overrides.shadows.unwrap_or(defaults.shadows),
            highlights: overrides.highlights.unwrap_or(defaults.highlights),
            temp: overrides.temp.unwrap_or(defaults.temp),
            tint: overrides.tint.unwrap_or(defaults.tint),
            saturation: overrides.saturation.unwrap_or(defaults.saturation),
            reject: overrides.reject.unwrap_or(defaults.reject),
            base_detect: overrides.base_detect.unwrap_or(defaults.base_detect),
            base_rgb: overrides.base_rgb.unwrap_or(defaults.base_rgb),
            remove_dust: overrides.remove_dust.unwrap_or(defaults.remove_dust),
        }
    }

    /// Tone sliders shared by every developing film type.
    #[must_use]
    pub const fn tone(&self) -> ToneParams {
        ToneParams {
            black_point: self.black_point,
            white_point: self.white_point,
            gamma: self.gamma,
            shadows: self.shadows,
            highlights: self.highlights,
        }
    }

    /// Build the development variant for this photo.
    #[must_use]
    pub const fn film_process(&self, mode: WhiteBalanceMode) -> FilmProcess {
        let color = ColorParams {
            temp: self.temp,
            tint: self.tint,
            saturation: self.saturation,
            mode,
        };
        let base = if self.base_detect {
            Some(self.base_rgb)
        } else {
            None
        };
        match self.film_type {
            FilmType::BwNegative => FilmProcess::BwNegative { tone: self.tone() },
            FilmType::ColorNegative => FilmProcess::ColorNegative {
                tone: self.tone(),
                color,
                base,
            },
            FilmType::Slide => FilmProcess::Slide {
                tone: self.tone(),
                color,
                base,
            },
            FilmType::CropOnly => FilmProcess::CropOnly,
        }
    }
}

/// Black/white point and exposure sliders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToneParams {
    /// Black point slider.
    pub black_point: f32,
    /// White point slider.
    pub white_point: f32,
    /// Gamma slider.
    pub gamma: f32,
    /// Shadow slider.
    pub shadows: f32,
    /// Highlight slider.
    pub highlights: f32,
}

/// White-balance and saturation parameters of the colour paths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorParams {
    /// Temperature.
    pub temp: f32,
    /// Tint.
    pub tint: f32,
    /// Saturation, 100 neutral.
    pub saturation: f32,
    /// Strategy used to apply temp/tint.
    pub mode: WhiteBalanceMode,
}

impl Default for ColorParams {
    fn default() -> Self {
        Self {
            temp: 0.0,
            tint: 0.0,
            saturation: 100.0,
            mode: WhiteBalanceMode::Coefficient,
        }
    }
}

/// A development path with exactly the parameters it uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilmProcess {
    /// Mono, inverted.
    BwNegative {
        /// Tone sliders.
        tone: ToneParams,
    },
    /// Inverted, then the slide path.
    ColorNegative {
        /// Tone sliders.
        tone: ToneParams,
        /// Colour sliders.
        color: ColorParams,
        /// Film base replacing the percentile black point.
        base: Option<BaseColor>,
    },
    /// Positive transparency.
    Slide {
        /// Tone sliders.
        tone: ToneParams,
        /// Colour sliders.
        color: ColorParams,
        /// Film base replacing the percentile black point.
        base: Option<BaseColor>,
    },
    /// Geometry only.
    CropOnly,
}

impl FilmProcess {
    /// The film type this variant develops.
    #[must_use]
    pub const fn film_type(&self) -> FilmType {
        match self {
            Self::BwNegative { .. } => FilmType::BwNegative,
            Self::ColorNegative { .. } => FilmType::ColorNegative,
            Self::Slide { .. } => FilmType::Slide,
            Self::CropOnly => FilmType::CropOnly,
        }
    }
}

/// Global settings: advanced parameters, export settings, and the
/// defaults every photo starts from. Shared immutably between photos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// Advanced parameters.
    pub advanced: AdvancedSettings,
    /// Export stage parameters.
    pub export: ExportSettings,
    /// Per-photo defaults.
    pub defaults: PhotoSettings,
}

impl GlobalSettings {
    /// Resolve the settings of one photo.
    #[must_use]
    pub fn resolve(&self, overrides: &PhotoOverrides) -> PhotoSettings {
        PhotoSettings::resolve(&self.defaults, overrides)
    }

    /// Check value ranges, returning the settings unchanged when valid.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad value.
    pub fn validated(self) -> Result<Self, PipelineError> {
        let a = &self.advanced;
        let finite = [
            ("frame", a.frame),
            ("black_point_percentile", a.black_point_percentile),
            ("white_point_percentile", a.white_point_percentile),
            ("ignore_border.x", a.ignore_border.x),
            ("ignore_border.y", a.ignore_border.y),
            ("dust_threshold", a.dust_threshold),
            ("max_dust_area", a.max_dust_area),
            ("picker_radius", a.picker_radius),
            ("defaults.border_crop", self.defaults.border_crop),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!("{name} must be finite")));
        }
        for (name, p) in [
            ("black_point_percentile", a.black_point_percentile),
            ("white_point_percentile", a.white_point_percentile),
        ] {
            if !(0.0..=100.0).contains(&p) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be within 0..=100, got {p}"
                )));
            }
        }
        if a.black_point_percentile >= a.white_point_percentile {
            return Err(PipelineError::InvalidConfig(
                "black_point_percentile must be below white_point_percentile".to_string(),
            ));
        }
        if a.frame < 0.0 || a.max_dust_area < 0.0 || a.picker_radius < 0.0 {
            return Err(PipelineError::InvalidConfig(
                "frame, max_dust_area and picker_radius must not be negative".to_string(),
            ));
        }
        if a.histogram_width == 0 || a.histogram_height <= 10 {
            return Err(PipelineError::InvalidConfig(
                "histogram must be at least 1 pixel wide and 11 pixels tall".to_string(),
            ));
        }
        if !(1..=100).contains(&self.export.jpeg_quality) {
            return Err(PipelineError::InvalidConfig(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.export.jpeg_quality
            )));
        }
        Ok(self)
    }
}
