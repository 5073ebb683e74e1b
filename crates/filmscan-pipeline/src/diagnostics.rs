//! Pipeline diagnostics: timing and per-stage metrics.
//!
//! Every run through [`run_with_diagnostics`] collects a
//! [`PipelineDiagnostics`] alongside the staged result. These are
//! permanent instrumentation for tuning thresholds and percentiles on real
//! scans.
//!
//! Time is read through the [`Clock`] trait so the library never reaches
//! for a platform clock itself; [`SystemClock`] is the native default.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::FilmType;
use crate::dust::DustReport;
use crate::pipeline::{Developed, DustScanned, Located, Pending, PipelineResult};
use crate::tone::ToneStats;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of elapsed time for stage measurements.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// The dust stage is `None` when dust removal was not requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: frame location.
    pub geometry: StageDiagnostics,
    /// Stage 2: dust detection (only when dust removal is enabled).
    pub dust: Option<StageDiagnostics>,
    /// Stage 3: film-type development.
    pub develop: StageDiagnostics,
    /// Stage 4: perspective crop.
    pub crop: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Frame location metrics.
    Geometry {
        /// Width of the image the estimate was made on.
        width: u32,
        /// Height of the image the estimate was made on.
        height: u32,
        /// Pixels set in the eroded threshold mask.
        threshold_pixels: u64,
        /// Points in the largest contour.
        contour_points: usize,
        /// Whether a frame rectangle was found.
        frame_found: bool,
        /// Whether the geometry came from an earlier run.
        reused: bool,
    },
    /// Dust detection metrics.
    Dust(DustReport),
    /// Development metrics.
    Develop {
        /// Tonal path taken.
        film_type: FilmType,
        /// Levels, absent for crop-only.
        levels: Option<ToneStats>,
    },
    /// Crop metrics.
    Crop {
        /// Width before cropping.
        input_width: u32,
        /// Height before cropping.
        input_height: u32,
        /// Width after cropping.
        output_width: u32,
        /// Height after cropping.
        output_height: u32,
    },
}

/// High-level summary for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Working image width in pixels.
    pub image_width: u32,
    /// Working image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Tonal path taken.
    pub film_type: FilmType,
    /// Whether a frame rectangle was found.
    pub frame_found: bool,
    /// Cropped output width.
    pub output_width: u32,
    /// Cropped output height.
    pub output_height: u32,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels), film: {}",
            self.summary.image_width,
            self.summary.image_height,
            self.summary.pixel_count,
            self.summary.film_type,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let mut stages = vec![("Geometry", &self.geometry)];
        if let Some(ref dust) = self.dust {
            stages.push(("Dust", dust));
        }
        stages.push(("Develop", &self.develop));
        stages.push(("Crop", &self.crop));

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Frame: {}  |  Output: {}x{}",
            if self.summary.frame_found {
                "found"
            } else {
                "not found"
            },
            self.summary.output_width,
            self.summary.output_height,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_channels(values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.0}")).collect();
    format!("[{}]", parts.join(","))
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Geometry {
            width,
            height,
            threshold_pixels,
            contour_points,
            frame_found,
            reused,
        } => {
            let source = if *reused { " (reused)" } else { "" };
            format!(
                "{width}x{height} mask={threshold_pixels} contour={contour_points} pts frame={frame_found}{source}",
            )
        }
        StageMetrics::Dust(report) => format!(
            "thr={:.1} components={} kept={} mask={} px",
            report.threshold, report.components, report.kept, report.mask_pixels,
        ),
        StageMetrics::Develop { film_type, levels } => match levels {
            Some(stats) => format!(
                "{film_type} black={} white={}",
                format_channels(&stats.black_point),
                format_channels(&stats.white_point),
            ),
            None => film_type.to_string(),
        },
        StageMetrics::Crop {
            input_width,
            input_height,
            output_width,
            output_height,
        } => format!("{input_width}x{input_height} -> {output_width}x{output_height}"),
    }
}

fn timed<C, S, T>(clock: &C, stage: S, advance: impl FnOnce(S) -> T) -> (T, Duration)
where
    C: Clock,
{
    let start = clock.now();
    let next = advance(stage);
    (next, clock.elapsed(&start))
}

/// Drive `pending` to completion, timing every stage with `clock`.
#[must_use]
pub fn run_with_diagnostics<C: Clock>(
    pending: Pending,
    clock: &C,
) -> (PipelineResult, PipelineDiagnostics) {
    let start = clock.now();

    let (located, duration) = timed(clock, pending, Pending::locate);
    let geometry = StageDiagnostics {
        duration,
        metrics: located.geometry_metrics(),
    };

    let (scanned, duration) = timed(clock, located, Located::detect_dust);
    let dust = scanned
        .dust_metrics()
        .map(|metrics| StageDiagnostics { duration, metrics });

    let (developed, duration) = timed(clock, scanned, DustScanned::develop);
    let develop = StageDiagnostics {
        duration,
        metrics: developed.develop_metrics(),
    };

    let (cropped, duration) = timed(clock, developed, Developed::crop);
    let crop = StageDiagnostics {
        duration,
        metrics: cropped.crop_metrics(),
    };

    let result = cropped.into_result();
    let total_duration = clock.elapsed(&start);

    let input = result.input_dimensions;
    let output = result.positive.dimensions();
    let summary = PipelineSummary {
        image_width: input.width,
        image_height: input.height,
        pixel_count: input.pixel_count(),
        film_type: result.film_type,
        frame_found: result.geometry.rect.is_some(),
        output_width: output.width,
        output_height: output.height,
    };
    tracing::debug!(
        total_ms = duration_ms(total_duration),
        film = %result.film_type,
        "pipeline run finished"
    );
    (
        result,
        PipelineDiagnostics {
            geometry,
            dust,
            develop,
            crop,
            total_duration,
            summary,
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::sync::Arc;

    use super::*;
    use crate::config::{AdvancedSettings, PhotoSettings};
    use crate::pipeline::{Pipeline, RunConfig};
    use crate::types::Rgb16Image;
    use image::Rgb;

    /// Clock that advances one millisecond per reading.
    struct StepClock {
        ticks: Cell<u64>,
    }

    impl Clock for StepClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.ticks.get();
            self.ticks.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn sample_diagnostics() -> PipelineDiagnostics {
        PipelineDiagnostics {
            geometry: StageDiagnostics {
                duration: Duration::from_millis(12),
                metrics: StageMetrics::Geometry {
                    width: 1200,
                    height: 800,
                    threshold_pixels: 500_000,
                    contour_points: 1800,
                    frame_found: true,
                    reused: false,
                },
            },
            dust: None,
            develop: StageDiagnostics {
                duration: Duration::from_millis(30),
                metrics: StageMetrics::Develop {
                    film_type: FilmType::ColorNegative,
                    levels: Some(ToneStats {
                        black_point: vec![1000.0, 2000.0, 3000.0],
                        black_offset: vec![-1000.0, -2000.0, -3000.0],
                        white_point: vec![50_000.0, 51_000.0, 52_000.0],
                        multiplier: vec![1.3, 1.28, 1.26],
                    }),
                },
            },
            crop: StageDiagnostics {
                duration: Duration::from_millis(8),
                metrics: StageMetrics::Crop {
                    input_width: 1200,
                    input_height: 800,
                    output_width: 900,
                    output_height: 600,
                },
            },
            total_duration: Duration::from_millis(50),
            summary: PipelineSummary {
                image_width: 1200,
                image_height: 800,
                pixel_count: 960_000,
                film_type: FilmType::ColorNegative,
                frame_found: true,
                output_width: 900,
                output_height: 600,
            },
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn report_lists_every_run_stage() {
        let report = sample_diagnostics().report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        assert!(report.contains("Geometry"));
        assert!(report.contains("Develop"));
        assert!(report.contains("black=[1000,2000,3000]"));
        assert!(report.contains("1200x800 -> 900x600"));
        assert!(!report.contains("Dust"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let json = serde_json::to_value(sample_diagnostics()).unwrap();
        assert!((json["total_duration"].as_f64().unwrap() - 0.05).abs() < 1e-12);
        let back: PipelineDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.crop.duration, Duration::from_millis(8));
        assert!(back.dust.is_none());
    }

    #[test]
    fn negative_duration_is_rejected() {
        let mut json = serde_json::to_value(sample_diagnostics()).unwrap();
        json["total_duration"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<PipelineDiagnostics>(json).is_err());
    }

    #[test]
    fn run_times_each_stage_with_the_given_clock() {
        let image = Arc::new(Rgb16Image::from_pixel(40, 30, Rgb([20_000, 30_000, 40_000])));
        let config = RunConfig {
            photo: PhotoSettings {
                remove_dust: true,
                ..PhotoSettings::default()
            },
            advanced: AdvancedSettings::default(),
        };
        let clock = StepClock {
            ticks: Cell::new(0),
        };
        let (result, diag) = run_with_diagnostics(Pipeline::new(image, config), &clock);
        assert_eq!(result.positive.dimensions().width, diag.summary.output_width);
        for stage in [&diag.geometry, &diag.develop, &diag.crop] {
            assert_eq!(stage.duration, Duration::from_millis(1));
        }
        assert!(diag.dust.is_some());
        assert!(diag.total_duration >= Duration::from_millis(8));
        assert!(matches!(
            diag.geometry.metrics,
            StageMetrics::Geometry { reused: false, .. }
        ));
    }
}
