//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use filmscan_pipeline::{Pipeline, RunConfig, Rgb16Image};
//! # fn run(scan: Arc<Rgb16Image>) {
//! let result = Pipeline::new(scan, RunConfig::default())
//!     .locate()
//!     .detect_dust()
//!     .develop()
//!     .crop()
//!     .into_result();
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state,
//! carrying every previously computed intermediate. None of the stages
//! can fail: a missing frame falls back to the uncropped image and dust
//! detection degrades to an empty mask.
//!
//! # Memory
//!
//! The working image is shared through an [`Arc`] and never copied. From
//! [`Developed`] onward the stages also hold the uncropped positive, which
//! is the same size as the working image; [`Cropped::into_result`] drops
//! it.

use std::sync::Arc;

use image::GrayImage;

use crate::config::{AdvancedSettings, FilmProcess, FilmType, PhotoSettings};
use crate::crop::{CropRegion, CropSpec, IgnoreZone};
use crate::diagnostics::StageMetrics;
use crate::dust::{self, DustParams, DustReport};
use crate::film::{self, Development, Sampling};
use crate::geometry::{self, Geometry};
use crate::scale::ResolutionScale;
use crate::tone::{Percentiles, ToneStats};
use crate::types::{Dimensions, Positive, Rgb16Image};

/// Settings for one run: the resolved photo parameters and the global
/// advanced parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    /// Resolved per-photo parameters.
    pub photo: PhotoSettings,
    /// Global advanced parameters.
    pub advanced: AdvancedSettings,
}

impl RunConfig {
    /// Crop geometry for a frame rectangle found (or not) on this run.
    #[must_use]
    pub const fn crop_spec(&self, geometry: &Geometry) -> CropSpec {
        CropSpec {
            rect: geometry.rect,
            border_crop: self.photo.border_crop,
            ignore: IgnoreZone {
                border: self.advanced.ignore_border,
                ignore_negative_border: self.advanced.ignore_negative_border,
            },
        }
    }

    /// Where tone statistics are sampled for `geometry`.
    #[must_use]
    pub const fn sampling(&self, geometry: &Geometry) -> Sampling {
        Sampling {
            crop: self.crop_spec(geometry),
            percentiles: Percentiles {
                black: self.advanced.black_point_percentile,
                white: self.advanced.white_point_percentile,
            },
        }
    }

    /// The tonal path selected by the photo parameters.
    #[must_use]
    pub const fn film_process(&self) -> FilmProcess {
        self.photo.film_process(self.advanced.white_balance_mode)
    }
}

/// Dust found on the cropped raw image.
#[derive(Debug, Clone, PartialEq)]
pub struct DustScan {
    /// Mask in the geometry of the cropped output (255 = dust).
    pub mask: GrayImage,
    /// Detection counts.
    pub report: DustReport,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Size of the working image the run started from.
    pub input_dimensions: Dimensions,
    /// Frame location used for the crop.
    pub geometry: Arc<Geometry>,
    /// Whether the geometry came from an earlier run.
    pub geometry_reused: bool,
    /// Dust detection, when requested.
    pub dust: Option<DustScan>,
    /// Tonal path taken.
    pub film_type: FilmType,
    /// Levels used, absent for crop-only.
    pub tone: Option<ToneStats>,
    /// Cropped, clipped positive in sensor orientation.
    pub positive: Positive,
}

impl PipelineResult {
    /// Bytes held by the positive, the dust mask and the geometry.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.positive.byte_len()
            + self.dust.as_ref().map_or(0, |d| d.mask.as_raw().len())
            + self.geometry.byte_len()
    }
}

fn crop_positive(positive: &Positive, spec: &CropSpec) -> Positive {
    match positive {
        Positive::Color(img) => Positive::Color(spec.apply(img, CropRegion::Output)),
        Positive::Mono(img) => Positive::Mono(spec.apply(img, CropRegion::Output)),
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`locate`](Self::locate) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .locate() to continue"]
pub struct Pending {
    config: RunConfig,
    image: Arc<Rgb16Image>,
    geometry: Option<Arc<Geometry>>,
}

impl Pending {
    /// The working image.
    #[must_use]
    pub fn image(&self) -> &Rgb16Image {
        &self.image
    }

    /// Locate the film frame and advance to the [`Located`] stage.
    ///
    /// Geometry handed to [`Pipeline::with_geometry`] is used as is.
    pub fn locate(self) -> Located {
        let (geometry, reused) = match self.geometry {
            Some(g) => (g, true),
            None => (
                Arc::new(geometry::estimate(
                    &self.image,
                    self.config.photo.dark_threshold,
                    self.config.photo.light_threshold,
                )),
                false,
            ),
        };
        let crop = self.config.crop_spec(&geometry);
        Located {
            config: self.config,
            image: self.image,
            geometry,
            reused,
            crop,
        }
    }
}

// ───────────────────────── Stage 1: Located ──────────────────────────

/// Pipeline state after locating the frame.
///
/// Call [`detect_dust`](Self::detect_dust) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .detect_dust() to continue"]
pub struct Located {
    config: RunConfig,
    image: Arc<Rgb16Image>,
    geometry: Arc<Geometry>,
    reused: bool,
    crop: CropSpec,
}

impl Located {
    /// The frame location.
    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Crop parameters derived from the geometry.
    #[must_use]
    pub const fn crop_spec(&self) -> &CropSpec {
        &self.crop
    }

    /// Metrics of the frame location.
    #[must_use]
    pub fn geometry_metrics(&self) -> StageMetrics {
        StageMetrics::Geometry {
            width: self.geometry.dimensions.width,
            height: self.geometry.dimensions.height,
            threshold_pixels: self.geometry.threshold.iter().filter(|&&v| v > 0).count() as u64,
            contour_points: self.geometry.contour.as_ref().map_or(0, Vec::len),
            frame_found: self.geometry.rect.is_some(),
            reused: self.reused,
        }
    }

    /// Detect dust on the cropped raw image when dust removal is enabled,
    /// then advance to the [`DustScanned`] stage.
    pub fn detect_dust(self) -> DustScanned {
        let dust = self.config.photo.remove_dust.then(|| {
            let cropped = self.crop.apply(&self.image, CropRegion::Output);
            let scale = ResolutionScale::new(Dimensions::of(&cropped));
            let params = DustParams::from_settings(&self.config.advanced);
            let (mask, report) = dust::detect(&cropped, &params, scale);
            DustScan { mask, report }
        });
        DustScanned {
            config: self.config,
            image: self.image,
            geometry: self.geometry,
            reused: self.reused,
            crop: self.crop,
            dust,
        }
    }
}

// ───────────────────────── Stage 2: DustScanned ──────────────────────

/// Pipeline state after the optional dust scan.
///
/// Call [`develop`](Self::develop) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .develop() to continue"]
pub struct DustScanned {
    config: RunConfig,
    image: Arc<Rgb16Image>,
    geometry: Arc<Geometry>,
    reused: bool,
    crop: CropSpec,
    dust: Option<DustScan>,
}

impl DustScanned {
    /// The dust scan, or `None` if dust removal is disabled.
    #[must_use]
    pub const fn dust(&self) -> Option<&DustScan> {
        self.dust.as_ref()
    }

    /// Metrics of the dust scan, if one ran.
    #[must_use]
    pub fn dust_metrics(&self) -> Option<StageMetrics> {
        self.dust.as_ref().map(|d| StageMetrics::Dust(d.report))
    }

    /// Develop the working image along its film type's path and advance
    /// to the [`Developed`] stage.
    pub fn develop(self) -> Developed {
        let process = self.config.film_process();
        let sampling = self.config.sampling(&self.geometry);
        let development = film::develop(&self.image, &process, &sampling);
        Developed {
            input_dimensions: Dimensions::of(&self.image),
            geometry: self.geometry,
            reused: self.reused,
            crop: self.crop,
            dust: self.dust,
            film_type: process.film_type(),
            development,
        }
    }
}

// ───────────────────────── Stage 3: Developed ────────────────────────

/// Pipeline state after development; the positive is still uncropped.
///
/// The working image is released here. Call [`crop`](Self::crop) to
/// advance to the final stage.
#[must_use = "pipeline stages are consumed by advancing — call .crop() to continue"]
pub struct Developed {
    input_dimensions: Dimensions,
    geometry: Arc<Geometry>,
    reused: bool,
    crop: CropSpec,
    dust: Option<DustScan>,
    film_type: FilmType,
    development: Development,
}

impl Developed {
    /// The uncropped positive.
    #[must_use]
    pub const fn positive(&self) -> &Positive {
        &self.development.positive
    }

    /// Levels used, absent for crop-only.
    #[must_use]
    pub const fn tone(&self) -> Option<&ToneStats> {
        self.development.tone.as_ref()
    }

    /// Metrics of the development.
    #[must_use]
    pub fn develop_metrics(&self) -> StageMetrics {
        StageMetrics::Develop {
            film_type: self.film_type,
            levels: self.development.tone.clone(),
        }
    }

    /// Crop the positive and advance to the [`Cropped`] stage.
    pub fn crop(self) -> Cropped {
        let uncropped = self.development.positive.dimensions();
        let positive = crop_positive(&self.development.positive, &self.crop);
        Cropped {
            uncropped,
            result: PipelineResult {
                input_dimensions: self.input_dimensions,
                geometry: self.geometry,
                geometry_reused: self.reused,
                dust: self.dust,
                film_type: self.film_type,
                tone: self.development.tone,
                positive,
            },
        }
    }
}

// ───────────────────────── Stage 4: Cropped ──────────────────────────

/// Pipeline state after cropping, the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`PipelineResult`].
#[must_use = "call .into_result() to extract the PipelineResult"]
pub struct Cropped {
    uncropped: Dimensions,
    result: PipelineResult,
}

impl Cropped {
    /// The cropped positive.
    #[must_use]
    pub const fn positive(&self) -> &Positive {
        &self.result.positive
    }

    /// Metrics of the crop.
    #[must_use]
    pub fn crop_metrics(&self) -> StageMetrics {
        let out = self.result.positive.dimensions();
        StageMetrics::Crop {
            input_width: self.uncropped.width,
            input_height: self.uncropped.height,
            output_width: out.width,
            output_height: out.height,
        }
    }

    /// Consume the pipeline and return the [`PipelineResult`].
    #[must_use]
    pub fn into_result(self) -> PipelineResult {
        self.result
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 5;

/// Trait implemented by every pipeline stage, enabling uniform iteration.
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage.
    const NAME: &str;

    /// Zero-based index of this stage.
    const INDEX: usize;

    /// Metrics describing the work done to reach this state. `None` for
    /// [`Pending`] and for a dust stage that did not run.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage, or `None` at the final stage.
    fn next(self) -> Option<Stage>;

    /// Run all remaining stages and return the result.
    fn complete(self) -> PipelineResult;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Option<Stage> {
        Some(Stage::Located(self.locate()))
    }

    fn complete(self) -> PipelineResult {
        self.locate().complete()
    }
}

impl PipelineStage for Located {
    const NAME: &str = "locate";
    const INDEX: usize = 1;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.geometry_metrics())
    }

    fn next(self) -> Option<Stage> {
        Some(Stage::DustScanned(self.detect_dust()))
    }

    fn complete(self) -> PipelineResult {
        self.detect_dust().complete()
    }
}

impl PipelineStage for DustScanned {
    const NAME: &str = "dust";
    const INDEX: usize = 2;

    fn metrics(&self) -> Option<StageMetrics> {
        self.dust_metrics()
    }

    fn next(self) -> Option<Stage> {
        Some(Stage::Developed(self.develop()))
    }

    fn complete(self) -> PipelineResult {
        self.develop().complete()
    }
}

impl PipelineStage for Developed {
    const NAME: &str = "develop";
    const INDEX: usize = 3;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.develop_metrics())
    }

    fn next(self) -> Option<Stage> {
        Some(Stage::Cropped(self.crop()))
    }

    fn complete(self) -> PipelineResult {
        self.crop().complete()
    }
}

impl PipelineStage for Cropped {
    const NAME: &str = "crop";
    const INDEX: usize = 4;

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.crop_metrics())
    }

    fn next(self) -> Option<Stage> {
        None
    }

    fn complete(self) -> PipelineResult {
        self.into_result()
    }
}

/// Type-erased pipeline state.
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Located`].
    Located(Located),
    /// See [`DustScanned`].
    DustScanned(DustScanned),
    /// See [`Developed`].
    Developed(Developed),
    /// See [`Cropped`].
    Cropped(Cropped),
}

/// Compile-time guard: if a [`Stage`] variant is added, this match becomes
/// non-exhaustive and the build fails, reminding you to bump [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Located(_)
        | Stage::DustScanned(_)
        | Stage::Developed(_)
        | Stage::Cropped(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(Stage),
    /// The pipeline was already at the final stage and is returned unchanged.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Located(s) => s.$method($($arg),*),
            Self::DustScanned(s) => s.$method($($arg),*),
            Self::Developed(s) => s.$method($($arg),*),
            Self::Cropped(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Human-readable name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// Stage-specific metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Cropped(_))
    }

    /// Advance to the next stage, returning `self` unchanged if already
    /// complete.
    pub fn advance(self) -> Advance {
        match self {
            Self::Pending(s) => Advance::Next(Self::Located(s.locate())),
            Self::Located(s) => Advance::Next(Self::DustScanned(s.detect_dust())),
            Self::DustScanned(s) => Advance::Next(Self::Developed(s.develop())),
            Self::Developed(s) => Advance::Next(Self::Cropped(s.crop())),
            done @ Self::Cropped(_) => Advance::Complete(done),
        }
    }

    /// Run all remaining stages to completion.
    #[must_use]
    pub fn complete(self) -> PipelineResult {
        delegate!(self, complete)
    }
}

// `PipelineStage`'s associated constants are not callable through
// `self`, so the macro goes through this helper.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl From<Pending> for Stage {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

/// Entry point for the incremental pipeline API.
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline on `image` that estimates its own geometry.
    pub const fn new(image: Arc<Rgb16Image>, config: RunConfig) -> Pending {
        Pending {
            config,
            image,
            geometry: None,
        }
    }

    /// Start a pipeline that reuses `geometry` from an earlier run,
    /// typically one made on the proxy. The normalized rectangle is
    /// rescaled to `image`.
    pub const fn with_geometry(
        image: Arc<Rgb16Image>,
        config: RunConfig,
        geometry: Arc<Geometry>,
    ) -> Pending {
        Pending {
            config,
            image,
            geometry: Some(geometry),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rect::RotatedRect;
    use crate::types::Point;
    use image::Rgb;
    use imageproc::point::Point as IPoint;

    /// A 600x400 scan: dark bed with a tilted mid-grey frame holding a
    /// horizontal gradient.
    fn scan() -> Rgb16Image {
        let frame = RotatedRect {
            center: Point::new(300.0, 200.0),
            width: 480.0,
            height: 300.0,
            angle: 5.0,
        };
        let corners: Vec<IPoint<i32>> = frame
            .corners()
            .iter()
            .map(|p| IPoint::new(p.x.round() as i32, p.y.round() as i32))
            .collect();
        let mut mask = GrayImage::new(600, 400);
        imageproc::drawing::draw_polygon_mut(&mut mask, &corners, image::Luma([255]));
        Rgb16Image::from_fn(600, 400, |x, y| {
            if mask.get_pixel(x, y).0[0] == 0 {
                Rgb([1000, 1000, 1000])
            } else {
                let v = 20_000 + (x as u16) * 50;
                Rgb([v, v - 2000, v - 4000])
            }
        })
    }

    fn config(film_type: FilmType) -> RunConfig {
        RunConfig {
            photo: PhotoSettings {
                film_type,
                ..PhotoSettings::default()
            },
            advanced: AdvancedSettings::default(),
        }
    }

    #[test]
    fn pending_exposes_the_working_image() {
        let img = Arc::new(Rgb16Image::new(8, 6));
        let pending = Pipeline::new(Arc::clone(&img), RunConfig::default());
        assert_eq!(pending.image().dimensions(), (8, 6));
    }

    #[test]
    fn located_finds_the_tilted_frame() {
        let located = Pipeline::new(Arc::new(scan()), config(FilmType::Slide)).locate();
        let rect = located.geometry().rect.unwrap();
        assert!((rect.center_x - 0.5).abs() < 0.01);
        assert!((rect.center_y - 0.5).abs() < 0.01);
        assert!(matches!(
            located.geometry_metrics(),
            StageMetrics::Geometry {
                frame_found: true,
                reused: false,
                ..
            }
        ));
    }

    #[test]
    fn dust_stage_is_skipped_unless_requested() {
        let scanned = Pipeline::new(Arc::new(scan()), config(FilmType::Slide))
            .locate()
            .detect_dust();
        assert!(scanned.dust().is_none());
        assert!(scanned.dust_metrics().is_none());
    }

    #[test]
    fn dust_mask_matches_the_cropped_output() {
        let mut cfg = config(FilmType::Slide);
        cfg.photo.remove_dust = true;
        let result = Pipeline::new(Arc::new(scan()), cfg)
            .locate()
            .detect_dust()
            .develop()
            .crop()
            .into_result();
        let dust = result.dust.unwrap();
        let dims = result.positive.dimensions();
        assert_eq!(dust.mask.dimensions(), (dims.width, dims.height));
    }

    #[test]
    fn crop_removes_the_scanner_bed() {
        let result = Pipeline::new(Arc::new(scan()), config(FilmType::Slide))
            .locate()
            .detect_dust()
            .develop()
            .crop()
            .into_result();
        let dims = result.positive.dimensions();
        assert!(dims.width < 480 && dims.width > 400, "{dims:?}");
        assert!(dims.height < 300 && dims.height > 240, "{dims:?}");
        assert!(result.tone.is_some());
        assert_eq!(result.film_type, FilmType::Slide);
        assert_eq!(result.input_dimensions, Dimensions::new(600, 400));
    }

    #[test]
    fn bw_negative_produces_mono_positive() {
        let result = Pipeline::new(Arc::new(scan()), config(FilmType::BwNegative))
            .locate()
            .detect_dust()
            .develop()
            .crop()
            .into_result();
        assert!(result.positive.as_mono().is_some());
    }

    #[test]
    fn reused_geometry_is_rescaled_to_a_larger_image() {
        let proxy = scan();
        let geometry = Arc::new(geometry::estimate(&proxy, 25.0, 100.0));
        let full = image::imageops::resize(&proxy, 1200, 800, image::imageops::FilterType::Nearest);
        let from_proxy = Pipeline::with_geometry(
            Arc::new(full),
            config(FilmType::CropOnly),
            Arc::clone(&geometry),
        )
        .locate();
        assert!(matches!(
            from_proxy.geometry_metrics(),
            StageMetrics::Geometry { reused: true, .. }
        ));
        let a = from_proxy.detect_dust().develop().crop().into_result();
        assert!(Arc::ptr_eq(&a.geometry, &geometry));

        // Same normalized rectangle at twice the resolution: the crop
        // doubles up to integer rounding of the corners.
        let b = Pipeline::new(Arc::new(proxy), config(FilmType::CropOnly)).complete();
        assert_eq!(a.geometry.rect, b.geometry.rect);
        let (da, db) = (a.positive.dimensions(), b.positive.dimensions());
        assert!(da.width.abs_diff(db.width * 2) <= 4, "{da:?} vs 2 x {db:?}");
        assert!(da.height.abs_diff(db.height * 2) <= 4, "{da:?} vs 2 x {db:?}");
    }

    #[test]
    fn no_frame_leaves_the_image_uncropped() {
        let img = Rgb16Image::from_pixel(64, 48, Rgb([500, 500, 500]));
        let result = Pipeline::new(Arc::new(img.clone()), config(FilmType::CropOnly)).complete();
        assert!(result.geometry.rect.is_none());
        assert_eq!(result.positive, Positive::Color(img));
    }

    #[test]
    fn stage_loop_reaches_the_same_result_as_chaining() {
        let image = Arc::new(scan());
        let mut stage: Stage = Pipeline::new(Arc::clone(&image), config(FilmType::Slide)).into();
        let mut seen = vec![(stage.index(), stage.name())];
        loop {
            match stage.advance() {
                Advance::Next(next) => {
                    stage = next;
                    seen.push((stage.index(), stage.name()));
                }
                Advance::Complete(done) => {
                    stage = done;
                    break;
                }
            }
        }
        assert!(stage.is_complete());
        assert_eq!(seen.len(), STAGE_COUNT);
        assert_eq!(
            seen,
            vec![
                (0, "source"),
                (1, "locate"),
                (2, "dust"),
                (3, "develop"),
                (4, "crop"),
            ]
        );
        let looped = stage.complete();
        let chained = Pipeline::new(image, config(FilmType::Slide)).complete();
        assert_eq!(looped.positive, chained.positive);
    }

    #[test]
    fn pending_has_no_metrics() {
        let stage: Stage = Pipeline::new(Arc::new(scan()), RunConfig::default()).into();
        assert!(stage.metrics().is_none());
        assert!(!stage.is_complete());
    }
}
