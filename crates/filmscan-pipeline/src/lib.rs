//! filmscan-pipeline: Pure film negative and slide conversion (sans-IO).
//!
//! Turns a decoded 16-bit scan into a corrected positive through:
//! frame location -> optional dust detection -> film-type development
//! (levels, white balance, exposure, saturation) -> perspective crop.
//! Display helpers add dust inpainting, a white frame, orientation, a
//! histogram and a detection overlay on top of a result.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! pixel buffers and returns structured data. Decoding raw sensor files
//! and encoding exports belong to callers such as `filmscan-bench`.

pub mod box_adjust;
pub mod config;
pub mod crop;
pub mod diagnostics;
pub mod downsample;
pub mod dust;
pub mod exposure;
pub mod film;
pub mod frame;
pub mod geometry;
pub mod grayscale;
pub mod histogram;
pub mod inpaint;
pub mod orientation;
pub mod overlay;
pub mod photo;
pub mod picker;
pub mod pipeline;
pub mod rect;
pub mod saturation;
pub mod scale;
pub mod source;
pub mod stats;
pub mod tone;
pub mod types;
pub mod white_balance;

use std::sync::Arc;

pub use config::{
    AdvancedSettings, BaseColor, ExportSettings, FilmProcess, FilmType, FitAspectRatio,
    GlobalSettings, OutputFormat, PhotoOverrides, PhotoSettings, WhiteBalanceMode,
};
pub use diagnostics::{
    Clock, PipelineDiagnostics, StageDiagnostics, StageMetrics, SystemClock, run_with_diagnostics,
};
pub use downsample::DownsampleFilter;
pub use orientation::Orientation;
pub use photo::{Photo, ProcessRequest, RenderKind, RunOutcome, RunTracker};
pub use picker::PickPoint;
pub use pipeline::{Pipeline, PipelineResult, PipelineStage, RunConfig, Stage};
pub use rect::NormalizedRect;
pub use source::{EncodedSource, ImageSource, MemorySource};
pub use types::{DecodedImage, Dimensions, PipelineError, Positive, Rgb16Image};
pub use white_balance::WhiteBalanceCalibration;

/// Run the full conversion on one working image.
///
/// # Pipeline steps
///
/// 1. Locate the frame (threshold, largest contour, minimum-area rectangle)
/// 2. Detect dust on the cropped scan when `remove_dust` is set
/// 3. Develop along the film type's path
/// 4. Crop the positive to the frame
///
/// Nothing here fails: a scan without a detectable frame is developed
/// and returned uncropped.
#[must_use]
pub fn process(image: Arc<Rgb16Image>, config: RunConfig) -> PipelineResult {
    Pipeline::new(image, config).complete()
}
