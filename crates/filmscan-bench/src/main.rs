//! filmscan-bench: CLI tool for scan conversion and pipeline diagnostics.
//!
//! Converts one scanned negative or slide with configurable parameters,
//! printing detailed per-stage diagnostics. Useful for:
//!
//! - Tuning frame thresholds, crop margins and percentiles on real scans
//! - Comparing film types and white-balance modes
//! - Measuring per-stage durations at proxy and full resolution
//! - Writing the positive and its visualizations for inspection
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin filmscan-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use filmscan_pipeline::{
    EncodedSource, FilmType, GlobalSettings, OutputFormat, Photo, PhotoOverrides, PickPoint,
    PipelineDiagnostics, Positive, ProcessRequest, RenderKind, RunOutcome, WhiteBalanceMode,
};
use image::DynamicImage;
use tracing_subscriber::EnvFilter;

/// Scan conversion and diagnostics for filmscan.
///
/// Converts a scanned film frame with configurable parameters and prints
/// detailed per-stage timing and metric diagnostics.
#[derive(Parser)]
#[command(name = "filmscan-bench", version)]
struct Cli {
    /// Path to the input scan (PNG, JPEG, TIFF, BMP, WebP).
    image_path: PathBuf,

    /// Development path.
    #[arg(long, value_enum)]
    film_type: Option<Film>,

    /// Dark threshold for frame detection, percent.
    #[arg(long)]
    dark_threshold: Option<f64>,

    /// Light threshold for frame detection, percent.
    #[arg(long)]
    light_threshold: Option<f64>,

    /// Crop margin, percent. Negative values include extra border.
    #[arg(long, allow_hyphen_values = true)]
    border_crop: Option<f64>,

    /// Black point slider (-100..100).
    #[arg(long, allow_hyphen_values = true)]
    black_point: Option<f32>,

    /// White point slider (-100..100).
    #[arg(long, allow_hyphen_values = true)]
    white_point: Option<f32>,

    /// Gamma slider (-100..100).
    #[arg(long, allow_hyphen_values = true)]
    gamma: Option<f32>,

    /// Shadows slider (-100..100).
    #[arg(long, allow_hyphen_values = true)]
    shadows: Option<f32>,

    /// Highlights slider (-100..100).
    #[arg(long, allow_hyphen_values = true)]
    highlights: Option<f32>,

    /// Temperature (-100..100).
    #[arg(long, allow_hyphen_values = true)]
    temp: Option<f32>,

    /// Tint (-100..100).
    #[arg(long, allow_hyphen_values = true)]
    tint: Option<f32>,

    /// Saturation (0..200, 100 neutral).
    #[arg(long)]
    saturation: Option<f32>,

    /// Clockwise quarter turns for display.
    #[arg(long, value_parser = clap::builder::RangedI64ValueParser::<i32>::new().range(0..4))]
    rotation: Option<i32>,

    /// Mirror horizontally for display.
    #[arg(long)]
    flip: bool,

    /// Detect and inpaint dust.
    #[arg(long)]
    remove_dust: bool,

    /// White-balance strategy.
    #[arg(long, value_enum)]
    wb_mode: Option<WbMode>,

    /// Pick white balance at `X,Y` (fractions of the displayed image)
    /// before the measured runs.
    #[arg(long, value_parser = parse_point)]
    wb_pick: Option<PickPoint>,

    /// Pick the film base colour at `X,Y` (fractions of the displayed
    /// image) before the measured runs.
    #[arg(long, value_parser = parse_point)]
    base_pick: Option<PickPoint>,

    /// Process the full decode instead of the proxy.
    #[arg(long)]
    full_res: bool,

    /// Global settings as a JSON file (`GlobalSettings`).
    #[arg(long)]
    settings_json: Option<PathBuf>,

    /// Per-photo overrides as a JSON string (`PhotoOverrides`).
    ///
    /// Individual parameter flags are applied on top.
    #[arg(long)]
    photo_json: Option<String>,

    /// Write the display-oriented positive to file, in the configured
    /// export format.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the threshold mask to file.
    #[arg(long)]
    threshold_out: Option<PathBuf>,

    /// Write the detection overlay to file.
    #[arg(long)]
    overlay_out: Option<PathBuf>,

    /// Write the histogram to file.
    #[arg(long)]
    histogram_out: Option<PathBuf>,

    /// Write the dust mask to file.
    #[arg(long)]
    dust_mask_out: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,
}

/// Film type selection.
#[derive(Clone, Copy, ValueEnum)]
enum Film {
    /// Black-and-white negative.
    BwNegative,
    /// Colour negative.
    ColorNegative,
    /// Slide (positive transparency).
    Slide,
    /// Crop only, no tonal processing.
    CropOnly,
}

impl From<Film> for FilmType {
    fn from(f: Film) -> Self {
        match f {
            Film::BwNegative => Self::BwNegative,
            Film::ColorNegative => Self::ColorNegative,
            Film::Slide => Self::Slide,
            Film::CropOnly => Self::CropOnly,
        }
    }
}

/// White-balance strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum WbMode {
    /// Signed per-channel offsets.
    Additive,
    /// Per-channel multipliers.
    Coefficient,
    /// Per-channel power curves.
    Gamma,
}

impl From<WbMode> for WhiteBalanceMode {
    fn from(m: WbMode) -> Self {
        match m {
            WbMode::Additive => Self::Additive,
            WbMode::Coefficient => Self::Coefficient,
            WbMode::Gamma => Self::Gamma,
        }
    }
}

/// Parse `X,Y` into a [`PickPoint`].
fn parse_point(s: &str) -> Result<PickPoint, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate {v:?}: {e}"))
    };
    Ok(PickPoint::new(parse(x)?, parse(y)?))
}

/// Build the global settings from `--settings-json` and the flags that
/// override advanced values.
fn globals_from_cli(cli: &Cli) -> Result<GlobalSettings, String> {
    let mut globals = match cli.settings_json {
        Some(ref path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
            serde_json::from_str(&text).map_err(|e| format!("Error parsing --settings-json: {e}"))?
        }
        None => GlobalSettings::default(),
    };
    if let Some(mode) = cli.wb_mode {
        globals.advanced.white_balance_mode = mode.into();
    }
    globals.validated().map_err(|e| e.to_string())
}

/// Build the per-photo overrides from `--photo-json` and the individual
/// parameter flags.
fn overrides_from_cli(cli: &Cli) -> Result<PhotoOverrides, String> {
    let mut o: PhotoOverrides = match cli.photo_json {
        Some(ref json) => {
            serde_json::from_str(json).map_err(|e| format!("Error parsing --photo-json: {e}"))?
        }
        None => PhotoOverrides::default(),
    };
    if let Some(f) = cli.film_type {
        o.film_type = Some(f.into());
    }
    o.dark_threshold = cli.dark_threshold.or(o.dark_threshold);
    o.light_threshold = cli.light_threshold.or(o.light_threshold);
    o.border_crop = cli.border_crop.or(o.border_crop);
    o.black_point = cli.black_point.or(o.black_point);
    o.white_point = cli.white_point.or(o.white_point);
    o.gamma = cli.gamma.or(o.gamma);
    o.shadows = cli.shadows.or(o.shadows);
    o.highlights = cli.highlights.or(o.highlights);
    o.temp = cli.temp.or(o.temp);
    o.tint = cli.tint.or(o.tint);
    o.saturation = cli.saturation.or(o.saturation);
    o.rotation = cli.rotation.or(o.rotation);
    if cli.flip {
        o.flip = Some(true);
    }
    if cli.remove_dust {
        o.remove_dust = Some(true);
    }
    Ok(o)
}

/// Run once without reporting, so the pickers have a result to sample.
fn warm_up(photo: &Photo) -> Result<(), String> {
    match photo.process(ProcessRequest::default()) {
        RunOutcome::Committed(_) => Ok(()),
        RunOutcome::Discarded => Err("warm-up run was discarded".to_string()),
        RunOutcome::Unreadable => Err("image is unreadable".to_string()),
    }
}

fn apply_pickers(cli: &Cli, photo: &Photo) -> Result<(), String> {
    if let Some(point) = cli.base_pick {
        let base = photo
            .sample_base_color(point)
            .ok_or_else(|| format!("base pick at {point:?} sampled nothing"))?;
        eprintln!("Base colour: {base:?}");
        photo.apply_base_color(base);
    }
    if let Some(point) = cli.wb_pick {
        warm_up(photo)?;
        let calibration = photo
            .calibrate_white_balance(point)
            .ok_or_else(|| format!("white balance pick at {point:?} has no solution"))?;
        eprintln!(
            "White balance: temp={:.2} tint={:.2}",
            calibration.temp, calibration.tint
        );
        photo.apply_white_balance(calibration);
    }
    Ok(())
}

/// Encode the positive in the configured export format.
fn write_positive(
    path: &Path,
    positive: Positive,
    globals: &GlobalSettings,
) -> Result<(), image::ImageError> {
    let dynamic = positive.into_dynamic();
    match globals.export.format {
        OutputFormat::Jpeg => {
            let eight_bit = match dynamic {
                DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(dynamic.to_luma8()),
                other => DynamicImage::ImageRgb8(other.to_rgb8()),
            };
            let file = File::create(path).map_err(image::ImageError::IoError)?;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                BufWriter::new(file),
                globals.export.jpeg_quality,
            );
            eight_bit.write_with_encoder(encoder)
        }
        OutputFormat::Tiff => dynamic.save_with_format(path, image::ImageFormat::Tiff),
        OutputFormat::Png => dynamic.save_with_format(path, image::ImageFormat::Png),
    }
}

fn write_render(photo: &Photo, kind: RenderKind, path: Option<&PathBuf>) {
    let Some(path) = path else {
        return;
    };
    let Some(image) = photo.render(kind) else {
        eprintln!("Nothing to write for {kind:?}");
        return;
    };
    match image.save(path) {
        Ok(()) => eprintln!("{kind:?} written to {}", path.display()),
        Err(e) => eprintln!("Error writing {kind:?} to {}: {e}", path.display()),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = globals_from_cli(&cli).and_then(|g| overrides_from_cli(&cli).map(|o| (g, o)));
    let (globals, overrides) = match config {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );

    let globals = Arc::new(globals);
    let photo = Photo::with_overrides(
        Box::new(EncodedSource::new(image_bytes)),
        &overrides,
        Arc::clone(&globals),
    );
    if let Err(msg) = apply_pickers(&cli, &photo) {
        eprintln!("{msg}");
        return ExitCode::FAILURE;
    }

    eprintln!("Settings: {:#?}", photo.settings());
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let request = ProcessRequest {
        full_res: cli.full_res,
        ..ProcessRequest::default()
    };
    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let diagnostics = match photo.process(request) {
            RunOutcome::Committed(d) => *d,
            RunOutcome::Discarded => {
                eprintln!("Run was discarded");
                return ExitCode::FAILURE;
            }
            RunOutcome::Unreadable => {
                eprintln!("Pipeline error: image is unreadable");
                return ExitCode::FAILURE;
            }
        };

        if cli.json {
            match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", diagnostics.report());
        }
        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if let Some(ref path) = cli.output
        && let Some(positive) = photo.export_pixels()
    {
        match write_positive(path, positive, &globals) {
            Ok(()) => eprintln!(
                "Positive written to {} ({})",
                path.display(),
                globals.export.format.extension(),
            ),
            Err(e) => {
                eprintln!("Error writing positive to {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }
    write_render(&photo, RenderKind::Threshold, cli.threshold_out.as_ref());
    write_render(&photo, RenderKind::Overlay, cli.overlay_out.as_ref());
    write_render(&photo, RenderKind::Histogram, cli.histogram_out.as_ref());
    write_render(&photo, RenderKind::DustMask, cli.dust_mask_out.as_ref());

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PipelineDiagnostics) -> Option<std::time::Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Geometry", |d| Some(d.geometry.duration)),
        ("Dust", |d| d.dust.as_ref().map(|s| s.duration)),
        ("Develop", |d| Some(d.develop.duration)),
        ("Crop", |d| Some(d.crop.duration)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
