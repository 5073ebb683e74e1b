//! One scanned photo: its buffers, settings and processing runs.
//!
//! A [`Photo`] owns the raw decode, an optional proxy, the geometry found
//! on the proxy and the last committed result. Processing runs may
//! overlap; each is tagged with a generation by a [`RunTracker`] and its
//! result replaces the visible one in a single step, or not at all.
//!
//! Lock order is always state before tracker, so the latest-only check
//! and the write of its result happen under one critical section.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{DynamicImage, GrayImage};

use crate::config::{BaseColor, FilmProcess, GlobalSettings, PhotoOverrides, PhotoSettings};
use crate::crop::CropRegion;
use crate::diagnostics::{PipelineDiagnostics, SystemClock, run_with_diagnostics};
use crate::downsample::make_proxy;
use crate::film;
use crate::frame::frame_positive;
use crate::geometry::{self, Geometry};
use crate::grayscale::to_rgb8;
use crate::histogram::{self, HistogramStyle};
use crate::inpaint::inpaint;
use crate::orientation::Orientation;
use crate::overlay;
use crate::picker::{PickPoint, sample_mean};
use crate::pipeline::{Pipeline, PipelineResult, RunConfig};
use crate::source::ImageSource;
use crate::types::{Positive, Rgb16Image};
use crate::white_balance::{self, WhiteBalanceCalibration};

/// How a processing run should be carried out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Run on the full decode instead of the proxy.
    pub full_res: bool,
    /// Commit only if no newer run is in flight or already committed.
    pub latest_only: bool,
    /// Reuse the last committed geometry; only tonal settings changed.
    pub skip_crop: bool,
}

/// What became of a processing run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The result is now the photo's visible result.
    Committed(Box<PipelineDiagnostics>),
    /// A newer run superseded this one, or the buffers were reclaimed
    /// while it ran.
    Discarded,
    /// The source could not be decoded.
    Unreadable,
}

impl RunOutcome {
    /// Diagnostics of a committed run.
    #[must_use]
    pub fn into_diagnostics(self) -> Option<PipelineDiagnostics> {
        match self {
            Self::Committed(d) => Some(*d),
            Self::Discarded | Self::Unreadable => None,
        }
    }
}

/// Display buffers a photo can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    /// The developed image, dust removed when enabled, framed.
    Preview,
    /// The working scan as 8-bit RGB.
    Raw,
    /// The frame-detection threshold mask.
    Threshold,
    /// The scan annotated with detection and crop.
    Overlay,
    /// Histogram plot of the developed image. Not oriented.
    Histogram,
    /// The dust mask.
    DustMask,
}

/// Generation bookkeeping for overlapping runs on one photo.
#[derive(Debug, Default)]
pub struct RunTracker {
    next: u64,
    active: BTreeSet<u64>,
    committed: Option<u64>,
    floor: u64,
}

impl RunTracker {
    /// Register a new run and return its generation.
    pub fn begin(&mut self) -> u64 {
        let generation = self.next;
        self.next += 1;
        self.active.insert(generation);
        generation
    }

    /// Retire `generation` and decide whether its result may be committed.
    ///
    /// Runs started before the last [`invalidate`](Self::invalidate) are
    /// always discarded. A latest-only run is also discarded when a newer
    /// generation is still active or has already committed.
    pub fn finish(&mut self, generation: u64, latest_only: bool) -> bool {
        self.active.remove(&generation);
        if generation < self.floor {
            return false;
        }
        if latest_only {
            let newer_active = self.active.range(generation + 1..).next().is_some();
            let newer_committed = self.committed.is_some_and(|c| c > generation);
            if newer_active || newer_committed {
                return false;
            }
        }
        self.committed = Some(self.committed.map_or(generation, |c| c.max(generation)));
        true
    }

    /// Retire `generation` without committing.
    pub fn abandon(&mut self, generation: u64) {
        self.active.remove(&generation);
    }

    /// Discard every run started so far when it finishes.
    pub const fn invalidate(&mut self) {
        self.floor = self.next;
    }

    /// Number of runs in flight.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.len()
    }
}

/// An in-flight run. Dropping it unfinished retires the generation.
struct RunTicket<'a> {
    tracker: &'a Mutex<RunTracker>,
    generation: u64,
    finished: bool,
}

impl RunTicket<'_> {
    fn finish(mut self, latest_only: bool) -> bool {
        self.finished = true;
        lock(self.tracker).finish(self.generation, latest_only)
    }
}

impl Drop for RunTicket<'_> {
    fn drop(&mut self) {
        if !self.finished {
            lock(self.tracker).abandon(self.generation);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct Buffers {
    raw: Arc<Rgb16Image>,
    proxy: Option<Arc<Rgb16Image>>,
}

impl Buffers {
    fn byte_len(&self) -> usize {
        let bytes = |img: &Rgb16Image| img.as_raw().len() * 2;
        bytes(&self.raw) + self.proxy.as_deref().map_or(0, bytes)
    }
}

/// A committed run and what it was made from.
#[derive(Debug)]
struct Committed {
    generation: u64,
    result: PipelineResult,
    working: Arc<Rgb16Image>,
    config: RunConfig,
    diagnostics: PipelineDiagnostics,
}

#[derive(Debug)]
struct PhotoState {
    settings: PhotoSettings,
    unreadable: bool,
    colour_desc: Option<String>,
    buffers: Option<Buffers>,
    geometry: Option<Arc<Geometry>>,
    committed: Option<Arc<Committed>>,
}

/// A scanned photo.
pub struct Photo {
    source: Box<dyn ImageSource>,
    globals: Arc<GlobalSettings>,
    state: Mutex<PhotoState>,
    tracker: Mutex<RunTracker>,
}

impl std::fmt::Debug for Photo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("state", &self.state)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl Photo {
    /// A photo with fully resolved settings. Nothing is decoded until the
    /// first operation that needs pixels.
    #[must_use]
    pub fn new(source: Box<dyn ImageSource>, settings: PhotoSettings, globals: Arc<GlobalSettings>) -> Self {
        Self {
            source,
            globals,
            state: Mutex::new(PhotoState {
                settings,
                unreadable: false,
                colour_desc: None,
                buffers: None,
                geometry: None,
                committed: None,
            }),
            tracker: Mutex::new(RunTracker::default()),
        }
    }

    /// A photo whose settings are the global defaults merged with
    /// `overrides`.
    #[must_use]
    pub fn with_overrides(
        source: Box<dyn ImageSource>,
        overrides: &PhotoOverrides,
        globals: Arc<GlobalSettings>,
    ) -> Self {
        let settings = globals.resolve(overrides);
        Self::new(source, settings, globals)
    }

    /// Decode on first use. `None` once the source has failed.
    fn ensure_loaded(&self, state: &mut PhotoState) -> Option<Buffers> {
        if state.unreadable {
            return None;
        }
        if let Some(buffers) = &state.buffers {
            return Some(buffers.clone());
        }
        match self.source.load() {
            Ok(decoded) => {
                let advanced = &self.globals.advanced;
                let proxy = make_proxy(&decoded.pixels, advanced.max_proxy_size, advanced.proxy_filter);
                let buffers = Buffers {
                    raw: Arc::new(decoded.pixels),
                    proxy: proxy.map(Arc::new),
                };
                state.colour_desc = Some(decoded.colour_desc);
                state.buffers = Some(buffers.clone());
                Some(buffers)
            }
            Err(e) => {
                tracing::warn!(error = %e, "source unreadable; photo rejected");
                state.unreadable = true;
                state.settings.reject = true;
                None
            }
        }
    }

    fn begin_run(&self) -> RunTicket<'_> {
        RunTicket {
            tracker: &self.tracker,
            generation: lock(&self.tracker).begin(),
            finished: false,
        }
    }

    /// Run the pipeline and commit its result.
    ///
    /// Geometry is always found on the proxy when one exists, so a
    /// full-resolution run crops with the same normalized rectangle the
    /// preview showed.
    pub fn process(&self, request: ProcessRequest) -> RunOutcome {
        let mut state = lock(&self.state);
        let Some(buffers) = self.ensure_loaded(&mut state) else {
            return RunOutcome::Unreadable;
        };
        let config = RunConfig {
            photo: state.settings.clone(),
            advanced: self.globals.advanced.clone(),
        };
        let cached = if request.skip_crop {
            state.geometry.clone()
        } else {
            None
        };
        let ticket = self.begin_run();
        drop(state);

        let geometry_image = buffers.proxy.unwrap_or_else(|| Arc::clone(&buffers.raw));
        let working = if request.full_res {
            buffers.raw
        } else {
            Arc::clone(&geometry_image)
        };
        let pending = match cached {
            Some(g) => Pipeline::with_geometry(Arc::clone(&working), config.clone(), g),
            None if !Arc::ptr_eq(&working, &geometry_image) => {
                let g = geometry::estimate(
                    &geometry_image,
                    config.photo.dark_threshold,
                    config.photo.light_threshold,
                );
                Pipeline::with_geometry(Arc::clone(&working), config.clone(), Arc::new(g))
            }
            None => Pipeline::new(Arc::clone(&working), config.clone()),
        };
        let (result, diagnostics) = run_with_diagnostics(pending, &SystemClock);

        let mut state = lock(&self.state);
        let generation = ticket.generation;
        if !ticket.finish(request.latest_only) {
            tracing::info!(generation, "discarded superseded run");
            return RunOutcome::Discarded;
        }
        tracing::info!(
            generation,
            full_res = request.full_res,
            total_ms = diagnostics.total_duration.as_secs_f64() * 1e3,
            "committed run"
        );
        state.geometry = Some(Arc::clone(&result.geometry));
        state.committed = Some(Arc::new(Committed {
            generation,
            result,
            working,
            config,
            diagnostics: diagnostics.clone(),
        }));
        RunOutcome::Committed(Box::new(diagnostics))
    }

    /// Number of processing runs in flight.
    #[must_use]
    pub fn active_runs(&self) -> usize {
        lock(&self.tracker).active()
    }

    /// Generation of the run whose result is visible. Generations count
    /// up from zero in the order runs start.
    #[must_use]
    pub fn committed_generation(&self) -> Option<u64> {
        lock(&self.state).committed.as_ref().map(|c| c.generation)
    }

    /// Free every large buffer together. The next operation that needs
    /// pixels decodes again, and runs already in flight are discarded.
    pub fn reclaim(&self) {
        let mut state = lock(&self.state);
        state.buffers = None;
        state.geometry = None;
        state.committed = None;
        lock(&self.tracker).invalidate();
        tracing::debug!("reclaimed photo buffers");
    }

    /// Whether a result is available.
    #[must_use]
    pub fn is_processed(&self) -> bool {
        lock(&self.state).committed.is_some()
    }

    /// Whether the source failed to decode.
    #[must_use]
    pub fn is_unreadable(&self) -> bool {
        lock(&self.state).unreadable
    }

    /// The colour-plane descriptor reported by the source, once decoded.
    #[must_use]
    pub fn colour_desc(&self) -> Option<String> {
        lock(&self.state).colour_desc.clone()
    }

    /// Current per-photo settings.
    #[must_use]
    pub fn settings(&self) -> PhotoSettings {
        lock(&self.state).settings.clone()
    }

    /// Replace the per-photo settings. Takes effect on the next run.
    pub fn update_settings(&self, settings: PhotoSettings) {
        let mut state = lock(&self.state);
        if state.unreadable {
            return;
        }
        state.settings = settings;
    }

    /// Diagnostics of the visible result.
    #[must_use]
    pub fn diagnostics(&self) -> Option<PipelineDiagnostics> {
        lock(&self.state)
            .committed
            .as_ref()
            .map(|c| c.diagnostics.clone())
    }

    /// Bytes held by the decode, the proxy and the visible result.
    #[must_use]
    pub fn memory_footprint(&self) -> usize {
        let state = lock(&self.state);
        state.buffers.as_ref().map_or(0, Buffers::byte_len)
            + state
                .committed
                .as_ref()
                .map_or(0, |c| c.result.byte_len())
    }

    fn committed(&self) -> Option<Arc<Committed>> {
        let state = lock(&self.state);
        if state.unreadable {
            return None;
        }
        state.committed.clone()
    }

    /// The developed positive with dust inpainted when the run asked for
    /// it, still in sensor orientation and unframed.
    fn cleaned(committed: &Committed) -> Positive {
        let positive = &committed.result.positive;
        match (&committed.result.dust, committed.config.photo.remove_dust) {
            (Some(dust), true) => match positive {
                Positive::Color(img) => Positive::Color(inpaint(img, &dust.mask)),
                Positive::Mono(img) => Positive::Mono(inpaint(img, &dust.mask)),
            },
            _ => positive.clone(),
        }
    }

    fn display(committed: &Committed) -> Positive {
        let photo = &committed.config.photo;
        let advanced = &committed.config.advanced;
        let framed = frame_positive(&Self::cleaned(committed), advanced.frame, advanced.fit_aspect_ratio);
        let orientation = Orientation::new(photo.rotation, photo.flip);
        match framed {
            Positive::Color(img) => Positive::Color(orientation.apply(&img)),
            Positive::Mono(img) => Positive::Mono(orientation.apply(&img)),
        }
    }

    /// Display-oriented 16-bit pixels of the visible result, ready for an
    /// encoder.
    #[must_use]
    pub fn export_pixels(&self) -> Option<Positive> {
        self.committed().map(|c| Self::display(&c))
    }

    /// The dust mask of the visible result, in sensor orientation.
    #[must_use]
    pub fn dust_mask(&self) -> Option<GrayImage> {
        self.committed()
            .and_then(|c| c.result.dust.as_ref().map(|d| d.mask.clone()))
    }

    /// Render a display buffer from the visible result.
    #[must_use]
    pub fn render(&self, kind: RenderKind) -> Option<DynamicImage> {
        let committed = self.committed()?;
        let photo = &committed.config.photo;
        let orientation = Orientation::new(photo.rotation, photo.flip);
        let image = match kind {
            RenderKind::Preview => Self::display(&committed).into_dynamic(),
            RenderKind::Raw => DynamicImage::ImageRgb8(orientation.apply(&to_rgb8(&committed.working))),
            RenderKind::Threshold => {
                DynamicImage::ImageLuma8(orientation.apply(&committed.result.geometry.threshold))
            }
            RenderKind::Overlay => {
                let crop = committed.config.crop_spec(&committed.result.geometry);
                let annotated = overlay::render(&committed.working, &committed.result.geometry, &crop);
                DynamicImage::ImageRgb8(orientation.apply(&annotated))
            }
            RenderKind::Histogram => {
                let advanced = &committed.config.advanced;
                let style = HistogramStyle {
                    width: advanced.histogram_width,
                    height: advanced.histogram_height,
                    background: advanced.histogram_background,
                };
                DynamicImage::ImageRgb8(histogram::render(&Self::cleaned(&committed), &style))
            }
            RenderKind::DustMask => {
                let mask = committed.result.dust.as_ref()?;
                DynamicImage::ImageLuma8(orientation.apply(&mask.mask))
            }
        };
        Some(image)
    }

    /// Solve the temperature and tint that make the picked region of the
    /// displayed image neutral. Settings are not changed; pass the result
    /// to [`apply_white_balance`](Self::apply_white_balance).
    ///
    /// Only colour film types have a white balance. The region is sampled
    /// after levels, before clipping to 16 bits and before any white
    /// balance.
    #[must_use]
    pub fn calibrate_white_balance(&self, point: PickPoint) -> Option<WhiteBalanceCalibration> {
        let committed = self.committed()?;
        let settings = self.settings();
        let config = RunConfig {
            photo: settings,
            advanced: committed.config.advanced.clone(),
        };
        let (negative, tone, base) = match config.film_process() {
            FilmProcess::ColorNegative { tone, base, .. } => (true, tone, base),
            FilmProcess::Slide { tone, base, .. } => (false, tone, base),
            FilmProcess::BwNegative { .. } | FilmProcess::CropOnly => return None,
        };
        let geometry = &committed.result.geometry;
        let (levelled, _) =
            film::equalize_color(&committed.working, negative, &tone, base, &config.sampling(geometry));
        let cropped = config.crop_spec(geometry).apply(&levelled, CropRegion::Output);
        let orientation = Orientation::new(config.photo.rotation, config.photo.flip);
        let mean = sample_mean(&cropped, orientation, point, config.advanced.picker_radius)?;
        let [r, g, b] = <[f64; 3]>::try_from(mean).ok()?;
        white_balance::calibrate([r, g, b], config.advanced.white_balance_mode)
    }

    /// Store a white-balance calibration in the settings.
    pub fn apply_white_balance(&self, calibration: WhiteBalanceCalibration) {
        let mut state = lock(&self.state);
        if state.unreadable {
            return;
        }
        state.settings.temp = calibration.temp;
        state.settings.tint = calibration.tint;
    }

    /// Mean 8-bit colour of the picked region of the uncropped raw scan in
    /// display orientation. Settings are not changed; pass the result to
    /// [`apply_base_color`](Self::apply_base_color).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sample_base_color(&self, point: PickPoint) -> Option<BaseColor> {
        let (buffers, settings) = {
            let mut state = lock(&self.state);
            let buffers = self.ensure_loaded(&mut state)?;
            (buffers, state.settings.clone())
        };
        let raw8 = to_rgb8(&buffers.raw);
        let orientation = Orientation::new(settings.rotation, settings.flip);
        let mean = sample_mean(&raw8, orientation, point, self.globals.advanced.picker_radius)?;
        let channel = |i: usize| mean.get(i).map(|v| v.round().clamp(0.0, 255.0) as u8);
        let base = BaseColor::new(channel(0)?, channel(1)?, channel(2)?);
        tracing::debug!(?base, "sampled film base");
        Some(base)
    }

    /// Use `base` as the film base colour for levels.
    pub fn apply_base_color(&self, base: BaseColor) {
        let mut state = lock(&self.state);
        if state.unreadable {
            return;
        }
        state.settings.base_rgb = base;
        state.settings.base_detect = true;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{AdvancedSettings, FilmType, WhiteBalanceMode};
    use crate::diagnostics::StageMetrics;
    use crate::source::{EncodedSource, MemorySource};
    use crate::types::Dimensions;
    use image::Rgb;

    /// 300x200 scan: dark bed, a 240x160 frame holding a channel-skewed
    /// horizontal ramp, and a uniform patch in the middle.
    fn scan() -> Rgb16Image {
        Rgb16Image::from_fn(300, 200, |x, y| {
            let in_frame = (30..270).contains(&x) && (20..180).contains(&y);
            let in_patch = (120..180).contains(&x) && (80..120).contains(&y);
            if in_patch {
                Rgb([36_000, 30_000, 30_000])
            } else if in_frame {
                let x = x as u16;
                Rgb([20_000 + x * 120, 18_000 + x * 110, 16_000 + x * 100])
            } else {
                Rgb([500, 500, 500])
            }
        })
    }

    fn globals(max_proxy_size: u32) -> Arc<GlobalSettings> {
        Arc::new(GlobalSettings {
            advanced: AdvancedSettings {
                max_proxy_size,
                histogram_width: 64,
                histogram_height: 40,
                ..AdvancedSettings::default()
            },
            ..GlobalSettings::default()
        })
    }

    fn photo(film_type: FilmType) -> Photo {
        let settings = PhotoSettings {
            film_type,
            ..PhotoSettings::default()
        };
        Photo::new(Box::new(MemorySource::new(scan(), "RGB")), settings, globals(2000))
    }

    fn run(p: &Photo, request: ProcessRequest) -> PipelineDiagnostics {
        p.process(request).into_diagnostics().unwrap()
    }

    #[test]
    fn tracker_discards_latest_only_runs_overtaken_by_newer_work() {
        let mut t = RunTracker::default();
        let (a, b, c) = (t.begin(), t.begin(), t.begin());
        assert_eq!(t.active(), 3);
        // a finishes while b and c are still running.
        assert!(!t.finish(a, true));
        // c finishes first among the rest and wins.
        assert!(t.finish(c, true));
        // b finishes after c committed.
        assert!(!t.finish(b, true));
        assert_eq!(t.active(), 0);
    }

    #[test]
    fn tracker_commits_newest_when_runs_finish_in_order() {
        let mut t = RunTracker::default();
        let (a, b) = (t.begin(), t.begin());
        assert!(!t.finish(a, true));
        assert!(t.finish(b, true));
    }

    #[test]
    fn tracker_lets_plain_runs_commit_regardless_of_order() {
        let mut t = RunTracker::default();
        let (a, b) = (t.begin(), t.begin());
        assert!(t.finish(b, false));
        assert!(t.finish(a, false));
    }

    #[test]
    fn tracker_latest_only_ignores_older_plain_runs() {
        let mut t = RunTracker::default();
        let (a, b) = (t.begin(), t.begin());
        assert!(t.finish(b, true));
        assert!(t.finish(a, false));
        let c = t.begin();
        assert!(t.finish(c, true));
    }

    #[test]
    fn tracker_invalidate_discards_runs_in_flight() {
        let mut t = RunTracker::default();
        let a = t.begin();
        t.invalidate();
        let b = t.begin();
        assert!(!t.finish(a, false));
        assert!(t.finish(b, true));
    }

    #[test]
    fn dropped_ticket_retires_its_run() {
        let p = photo(FilmType::Slide);
        {
            let _ticket = p.begin_run();
            assert_eq!(p.active_runs(), 1);
        }
        assert_eq!(p.active_runs(), 0);
    }

    #[test]
    fn unreadable_source_rejects_the_photo() {
        let p = Photo::new(
            Box::new(EncodedSource::new(vec![])),
            PhotoSettings::default(),
            globals(2000),
        );
        assert!(matches!(p.process(ProcessRequest::default()), RunOutcome::Unreadable));
        assert!(p.is_unreadable());
        assert!(p.settings().reject);
        assert!(p.render(RenderKind::Preview).is_none());
        assert!(p.sample_base_color(PickPoint::new(0.5, 0.5)).is_none());
        assert_eq!(p.memory_footprint(), 0);
    }

    #[test]
    fn process_commits_and_crops_the_frame() {
        let p = photo(FilmType::Slide);
        assert!(!p.is_processed());
        let diag = run(&p, ProcessRequest::default());
        assert!(diag.summary.frame_found);
        assert!(p.is_processed());
        assert_eq!(p.colour_desc().as_deref(), Some("RGB"));
        let preview = p.render(RenderKind::Preview).unwrap();
        assert!(preview.width() < 240 && preview.width() > 200);
        assert!(preview.height() < 160 && preview.height() > 130);
        assert_eq!(p.active_runs(), 0);
    }

    #[test]
    fn every_render_kind_is_available_after_processing() {
        let p = photo(FilmType::ColorNegative);
        let mut settings = p.settings();
        settings.remove_dust = true;
        settings.rotation = 1;
        p.update_settings(settings);
        run(&p, ProcessRequest::default());
        let raw = p.render(RenderKind::Raw).unwrap();
        assert_eq!((raw.width(), raw.height()), (200, 300));
        let threshold = p.render(RenderKind::Threshold).unwrap();
        assert_eq!((threshold.width(), threshold.height()), (200, 300));
        let overlay = p.render(RenderKind::Overlay).unwrap();
        assert_eq!((overlay.width(), overlay.height()), (200, 300));
        let hist = p.render(RenderKind::Histogram).unwrap();
        assert_eq!((hist.width(), hist.height()), (64, 40));
        let preview = p.render(RenderKind::Preview).unwrap();
        let mask = p.render(RenderKind::DustMask).unwrap();
        assert_eq!(
            (mask.width(), mask.height()),
            (preview.width(), preview.height())
        );
        assert!(preview.height() > preview.width());
        let sensor = p.dust_mask().unwrap();
        assert_eq!((sensor.width(), sensor.height()), (mask.height(), mask.width()));
    }

    #[test]
    fn dust_mask_render_is_absent_without_dust_removal() {
        let p = photo(FilmType::Slide);
        run(&p, ProcessRequest::default());
        assert!(p.render(RenderKind::DustMask).is_none());
        assert!(p.dust_mask().is_none());
    }

    #[test]
    fn export_pixels_are_framed_and_oriented() {
        let p = Photo::new(
            Box::new(MemorySource::new(scan(), "RGB")),
            PhotoSettings {
                film_type: FilmType::BwNegative,
                rotation: 3,
                ..PhotoSettings::default()
            },
            Arc::new(GlobalSettings {
                advanced: AdvancedSettings {
                    frame: 5.0,
                    ..AdvancedSettings::default()
                },
                ..GlobalSettings::default()
            }),
        );
        run(&p, ProcessRequest::default());
        let cropped = p.diagnostics().unwrap().summary;
        let exported = p.export_pixels().unwrap();
        assert!(exported.as_mono().is_some());
        let border = crate::frame::frame_size(
            Dimensions::new(cropped.output_width, cropped.output_height),
            5.0,
        );
        assert_eq!(
            exported.dimensions(),
            Dimensions::new(cropped.output_height + 2 * border, cropped.output_width + 2 * border)
        );
    }

    #[test]
    fn proxy_serves_previews_and_full_res_reuses_its_rectangle() {
        let p = Photo::new(
            Box::new(MemorySource::new(scan(), "RGB")),
            PhotoSettings {
                film_type: FilmType::CropOnly,
                ..PhotoSettings::default()
            },
            globals(250),
        );
        let preview = run(&p, ProcessRequest::default()).summary;
        assert_eq!((preview.image_width, preview.image_height), (150, 100));
        let diag = run(
            &p,
            ProcessRequest {
                full_res: true,
                ..ProcessRequest::default()
            },
        );
        assert_eq!((diag.summary.image_width, diag.summary.image_height), (300, 200));
        assert!(matches!(
            diag.geometry.metrics,
            StageMetrics::Geometry { reused: true, width: 150, .. }
        ));
        assert!(diag.summary.output_width.abs_diff(preview.output_width * 2) <= 6);
        let footprint = p.memory_footprint();
        assert!(footprint >= 300 * 200 * 6 + 150 * 100 * 6);
    }

    #[test]
    fn skip_crop_keeps_the_previous_geometry() {
        let p = photo(FilmType::Slide);
        run(&p, ProcessRequest::default());
        let mut settings = p.settings();
        // Would find no frame at all.
        settings.dark_threshold = 99.0;
        p.update_settings(settings);
        let diag = run(
            &p,
            ProcessRequest {
                skip_crop: true,
                ..ProcessRequest::default()
            },
        );
        assert!(diag.summary.frame_found);
        assert!(matches!(
            diag.geometry.metrics,
            StageMetrics::Geometry { reused: true, .. }
        ));
        let fresh = run(&p, ProcessRequest::default());
        assert!(!fresh.summary.frame_found);
    }

    #[test]
    fn reclaim_frees_everything_and_reprocessing_recovers() {
        let p = photo(FilmType::Slide);
        run(&p, ProcessRequest::default());
        assert!(p.memory_footprint() > 0);
        p.reclaim();
        assert!(!p.is_processed());
        assert_eq!(p.committed_generation(), None);
        assert_eq!(p.memory_footprint(), 0);
        assert!(p.render(RenderKind::Preview).is_none());
        run(&p, ProcessRequest::default());
        assert!(p.render(RenderKind::Preview).is_some());
    }

    #[test]
    fn overlapping_latest_only_runs_leave_one_visible_result() {
        let p = Arc::new(photo(FilmType::Slide));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&p);
                std::thread::spawn(move || {
                    p.process(ProcessRequest {
                        latest_only: true,
                        ..ProcessRequest::default()
                    })
                })
            })
            .collect();
        let outcomes: Vec<RunOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let committed = outcomes
            .iter()
            .filter(|o| matches!(o, RunOutcome::Committed(_)))
            .count();
        let discarded = outcomes
            .iter()
            .filter(|o| matches!(o, RunOutcome::Discarded))
            .count();
        assert!(committed >= 1);
        assert_eq!(committed + discarded, 4);
        // The newest run can never be overtaken, and nothing older may
        // replace it once it lands.
        assert_eq!(p.committed_generation(), Some(3));
        assert_eq!(p.active_runs(), 0);
        assert!(p.is_processed());
    }

    #[test]
    fn white_balance_picker_is_a_pure_two_step_protocol() {
        let p = photo(FilmType::Slide);
        run(&p, ProcessRequest::default());
        let centre = PickPoint::new(0.5, 0.5);
        let before = p.export_pixels().unwrap();
        let cast = sample_mean(before.as_color().unwrap(), Orientation::default(), centre, 2.0).unwrap();
        assert!((cast[0] - cast[1]).abs() > 500.0, "{cast:?}");

        let calibration = p.calibrate_white_balance(centre).unwrap();
        assert_eq!(p.calibrate_white_balance(centre), Some(calibration));
        assert!(p.settings().temp.abs() < f32::EPSILON);

        p.apply_white_balance(calibration);
        assert!((p.settings().temp - calibration.temp).abs() < f32::EPSILON);
        run(
            &p,
            ProcessRequest {
                skip_crop: true,
                ..ProcessRequest::default()
            },
        );
        let after = p.export_pixels().unwrap();
        let neutral = sample_mean(after.as_color().unwrap(), Orientation::default(), centre, 2.0).unwrap();
        assert!((neutral[0] - neutral[1]).abs() < 300.0, "{neutral:?}");
        assert!((neutral[1] - neutral[2]).abs() < 300.0, "{neutral:?}");
    }

    #[test]
    fn white_balance_picker_sees_highlights_beyond_full_scale() {
        // Neutral ramp frame around a warm patch far above the white point.
        let img = Rgb16Image::from_fn(300, 200, |x, y| {
            let in_frame = (30..270).contains(&x) && (20..180).contains(&y);
            let in_patch = (130..170).contains(&x) && (85..115).contains(&y);
            if in_patch {
                Rgb([62_000, 48_000, 42_000])
            } else if in_frame {
                let v = 20_000 + x as u16 * 40;
                Rgb([v, v, v])
            } else {
                Rgb([500, 500, 500])
            }
        });
        let settings = PhotoSettings {
            film_type: FilmType::Slide,
            ..PhotoSettings::default()
        };
        let p = Photo::new(Box::new(MemorySource::new(img, "RGB")), settings, globals(2000));
        run(&p, ProcessRequest::default());

        // Clipped to 16 bits the patch would read as pure white.
        let mode = WhiteBalanceMode::Coefficient;
        let saturated = white_balance::calibrate([65_535.0; 3], mode).unwrap();
        assert!(saturated.temp.abs() < 1e-3 && saturated.tint.abs() < 1e-3);

        let calibration = p.calibrate_white_balance(PickPoint::new(0.5, 0.5)).unwrap();
        assert!(calibration.temp < -1.0, "{calibration:?}");
    }

    #[test]
    fn white_balance_picker_needs_a_colour_film_type() {
        let p = photo(FilmType::BwNegative);
        run(&p, ProcessRequest::default());
        assert!(p.calibrate_white_balance(PickPoint::new(0.5, 0.5)).is_none());
    }

    #[test]
    fn base_colour_picker_samples_the_raw_scan() {
        let raw = Rgb16Image::from_pixel(80, 60, Rgb([25_700, 12_850, 51_400]));
        let p = Photo::new(
            Box::new(MemorySource::new(raw, "RGB")),
            PhotoSettings::default(),
            globals(2000),
        );
        let base = p.sample_base_color(PickPoint::new(0.3, 0.6)).unwrap();
        assert_eq!(base, BaseColor::new(100, 50, 200));
        assert!(!p.settings().base_detect);
        p.apply_base_color(base);
        let settings = p.settings();
        assert!(settings.base_detect);
        assert_eq!(settings.base_rgb, base);
    }
}
