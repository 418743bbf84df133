use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use foto3x4_contracts::events::{EventKind, EventWriter};
use foto3x4_contracts::images::{BackgroundRequest, EncodedImage};
use foto3x4_contracts::runs::receipts::{build_receipt, write_receipt, GenerationReceipt};
use foto3x4_contracts::runs::summary::{write_summary, ColorArtifact, RunSummary};
use foto3x4_contracts::session::{SessionEvent, SessionState};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub mod codec;
pub mod config;
pub mod cropper;
pub mod error;
pub mod geometry;
pub mod lettering;
pub mod loader;
pub mod providers;
pub mod sheet;

pub use codec::{ImageCodec, RasterCodec};
pub use config::PipelineConfig;
pub use error::{GenerationError, PhotoError};
pub use providers::{BackgroundGenerator, GeneratorRegistry};

use crate::cropper::crop_to_ratio;
use crate::geometry::ID_PHOTO_RATIO;
use crate::lettering::SheetFont;
use crate::providers::default_generator_registry;
use crate::sheet::{compose, encode_sheet, PrintSheetEntry, SheetFormat, SheetGeometry};

/// One photo session: upload, two background generations, print sheet.
///
/// Every step appends to the run's event log; images and receipts are
/// written into `run_dir`.
pub struct Foto3x4Engine {
    run_dir: PathBuf,
    run_id: String,
    events: EventWriter,
    summary_path: PathBuf,
    started_at: String,
    config: PipelineConfig,
    codec: Box<dyn ImageCodec>,
    generators: GeneratorRegistry,
    state: SessionState,
    original_path: Option<PathBuf>,
    sheet_path: Option<PathBuf>,
}

struct ColorResult {
    image: EncodedImage,
    image_path: PathBuf,
    receipt_path: PathBuf,
    payload: Map<String, Value>,
}

impl Foto3x4Engine {
    pub fn new(
        run_dir: impl Into<PathBuf>,
        events_path: impl Into<PathBuf>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let run_dir = run_dir.into();
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create {}", run_dir.display()))?;
        let run_id = run_dir
            .file_name()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("run-{}", uuid::Uuid::new_v4()));
        let events = EventWriter::new(events_path.into(), run_id.clone());
        let generators = default_generator_registry(&config);
        let summary_path = run_dir.join("summary.json");
        let started_at = now_utc_iso();

        events.emit(
            EventKind::RunStarted,
            map_object(json!({
                "out_dir": run_dir.to_string_lossy().to_string(),
                "provider": config.provider,
                "model": config.model,
            })),
        )?;

        Ok(Self {
            run_dir,
            run_id,
            events,
            summary_path,
            started_at,
            config,
            codec: Box::new(RasterCodec::default()),
            generators,
            state: SessionState::new(),
            original_path: None,
            sheet_path: None,
        })
    }

    /// Register `generator` and make it the one used by `process`.
    pub fn with_generator<G: BackgroundGenerator + 'static>(mut self, generator: G) -> Self {
        self.config.provider = generator.name().to_string();
        self.generators.register(generator);
        self
    }

    pub fn with_codec<C: ImageCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn events_path(&self) -> &Path {
        self.events.path()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Load `path` as the session's original, replacing any previous one.
    pub fn select_file(&mut self, path: &Path) -> Result<Arc<EncodedImage>> {
        let loaded = match loader::load_file(
            self.codec.as_ref(),
            path,
            self.config.max_upload_width,
            self.config.upload_quality,
        ) {
            Ok(loaded) => loaded,
            Err(err) => {
                let message = err.user_message();
                self.state = self.state.clone().with_status(message.clone());
                self.events.status(&message)?;
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to load {}", path.display())));
            }
        };

        let original = Arc::new(loaded);
        self.state = self
            .state
            .clone()
            .transition(SessionEvent::FileSelected(Arc::clone(&original)))?;

        let original_path = self.run_dir.join("original.jpg");
        fs::write(&original_path, original.bytes())
            .with_context(|| format!("failed to write {}", original_path.display()))?;
        self.original_path = Some(original_path.clone());
        self.sheet_path = None;

        self.events.emit(
            EventKind::FileSelected,
            map_object(json!({
                "source_path": path.to_string_lossy().to_string(),
                "original_path": original_path.to_string_lossy().to_string(),
                "width": original.width(),
                "height": original.height(),
                "bytes": original.len(),
            })),
        )?;
        Ok(original)
    }

    /// Generate the white then the blue photo from the current original.
    ///
    /// Stops at the first failing colour; colours finished before it stay
    /// in the session. Calling again regenerates both.
    pub fn process(&mut self) -> Result<()> {
        let Some(original) = self.state.original().cloned() else {
            return Err(PhotoError::Input("no photo selected".to_string()).into());
        };
        let provider = self.config.provider.clone();
        let Some(generator) = self.generators.get(&provider) else {
            bail!(
                "unknown provider '{provider}' (available: {})",
                self.generators.names().join(", ")
            );
        };

        self.state = self
            .state
            .clone()
            .transition(SessionEvent::GenerationStarted)?
            .with_status("Generating ID photos...");
        self.sheet_path = None;
        for background in BackgroundRequest::ALL {
            remove_stale(&self.color_path(background))?;
        }
        self.events.emit(
            EventKind::GenerationStarted,
            map_object(json!({
                "provider": provider,
                "model": generator_model(&self.config, generator),
                "backgrounds": BackgroundRequest::ALL,
            })),
        )?;

        let source_sha256 = sha256_hex(original.bytes());
        for background in BackgroundRequest::ALL {
            match self.run_color(generator, &original, background, &source_sha256) {
                Ok(result) => {
                    self.state = self
                        .state
                        .clone()
                        .transition(SessionEvent::ColorReady(background, Arc::new(result.image)))?;
                    let mut payload = result.payload;
                    payload.insert(
                        "image_path".to_string(),
                        Value::String(result.image_path.to_string_lossy().to_string()),
                    );
                    payload.insert(
                        "receipt_path".to_string(),
                        Value::String(result.receipt_path.to_string_lossy().to_string()),
                    );
                    self.events.emit(EventKind::ColorReady, payload)?;
                }
                Err(err) => {
                    let message = failure_message(&err);
                    self.state = self
                        .state
                        .clone()
                        .transition(SessionEvent::GenerationFailed(message.clone()))?
                        .with_status(message.clone());
                    self.events.emit(
                        EventKind::GenerationFailed,
                        map_object(json!({
                            "background": background,
                            "error_kind": failure_kind(&err),
                            "message": message,
                            "detail": format!("{err:#}"),
                            "completed": BackgroundRequest::ALL
                                .into_iter()
                                .filter(|bg| self.state.result(*bg).is_some())
                                .collect::<Vec<_>>(),
                        })),
                    )?;
                    return Err(err.context(format!("{background} background generation failed")));
                }
            }
        }

        self.state = self.state.clone().with_status("ID photos ready.");
        self.events.status(self.state.status_message())?;
        Ok(())
    }

    fn run_color(
        &self,
        generator: &dyn BackgroundGenerator,
        original: &EncodedImage,
        background: BackgroundRequest,
        source_sha256: &str,
    ) -> Result<ColorResult> {
        self.events
            .status(&format!("Generating {background} background..."))?;
        let started = Instant::now();
        let output = generator
            .generate(original, background)
            .map_err(PhotoError::from)?;
        let latency_s = started.elapsed().as_secs_f64();

        self.events.status(&format!("Cropping {background} photo to 3:4..."))?;
        let cropped = crop_to_ratio(
            self.codec.as_ref(),
            &output.image,
            ID_PHOTO_RATIO,
            self.config.crop_quality,
        )?;

        let image_path = self.color_path(background);
        fs::write(&image_path, cropped.image.bytes())
            .with_context(|| format!("failed to write {}", image_path.display()))?;

        let receipt_path = self.run_dir.join(format!("receipt-{background}.json"));
        let receipt = GenerationReceipt {
            background,
            provider: generator.name().to_string(),
            model: output.model.clone(),
            prompt: output.prompt.clone(),
            source_sha256: source_sha256.to_string(),
            source_width: original.width(),
            source_height: original.height(),
            generated_width: output.image.width(),
            generated_height: output.image.height(),
            crop: cropped.record(),
            latency_s,
            provider_request: output.provider_request.clone(),
            provider_response: output.provider_response.clone(),
            warnings: output.warnings.clone(),
        };
        write_receipt(
            &receipt_path,
            &build_receipt(&receipt, &image_path, &receipt_path),
        )
        .with_context(|| format!("failed to write {}", receipt_path.display()))?;

        let payload = map_object(json!({
            "background": background,
            "width": cropped.image.width(),
            "height": cropped.image.height(),
            "generated_width": output.image.width(),
            "generated_height": output.image.height(),
            "crop": cropped.record(),
            "latency_s": latency_s,
            "warnings": output.warnings,
        }));

        Ok(ColorResult {
            image: cropped.image,
            image_path,
            receipt_path,
            payload,
        })
    }

    /// Sheet entries for the colours currently available.
    pub fn compose_sheet(&self) -> Vec<PrintSheetEntry<'_>> {
        compose(
            self.state.white().map(Arc::as_ref),
            self.state.blue().map(Arc::as_ref),
            self.config.copies_per_color,
        )
    }

    /// Rasterise the print sheet to `path` (JPEG, or PNG for `.png`).
    pub fn render_sheet(&mut self, path: &Path) -> Result<PathBuf> {
        let geometry = SheetGeometry::default().with_dpi(self.config.sheet_dpi);
        let entries = self.compose_sheet();
        if entries.is_empty() {
            bail!("no ID photos to print; process a photo first");
        }
        let blue_copies = entries
            .iter()
            .filter(|entry| entry.tag == BackgroundRequest::Blue)
            .count();
        let white_copies = entries.len() - blue_copies;
        let entry_count = entries.len();

        let font = SheetFont::discover(self.config.sheet_font.as_deref())?;
        let rendered =
            sheet::render_sheet(self.codec.as_ref(), &entries, &geometry, font.as_ref())?;
        let bytes = encode_sheet(&rendered, geometry.dpi, SheetFormat::from_path(path))?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        self.sheet_path = Some(path.to_path_buf());

        self.events.emit(
            EventKind::SheetRendered,
            map_object(json!({
                "sheet_path": path.to_string_lossy().to_string(),
                "entries": entry_count,
                "blue_copies": blue_copies,
                "white_copies": white_copies,
                "dpi": geometry.dpi,
                "width_px": rendered.width(),
                "height_px": rendered.height(),
                "font": font
                    .as_ref()
                    .map(|font| font.source().to_string_lossy().to_string()),
            })),
        )?;
        Ok(path.to_path_buf())
    }

    /// Drop the original and all results.
    pub fn reset(&mut self) -> Result<()> {
        self.state = self.state.clone().transition(SessionEvent::Reset)?;
        self.original_path = None;
        self.sheet_path = None;
        self.events.emit(EventKind::SessionReset, Map::new())?;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<PathBuf> {
        let colors = BackgroundRequest::ALL
            .into_iter()
            .filter_map(|background| {
                self.state.result(background).map(|image| ColorArtifact {
                    background: background.to_string(),
                    image_path: self.color_path(background).to_string_lossy().to_string(),
                    width: image.width(),
                    height: image.height(),
                })
            })
            .collect::<Vec<_>>();
        let summary = RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_iso(),
            phase: self.state.phase().as_str().to_string(),
            original_path: self
                .original_path
                .as_ref()
                .map(|path| path.to_string_lossy().to_string()),
            colors,
            sheet_path: self
                .sheet_path
                .as_ref()
                .map(|path| path.to_string_lossy().to_string()),
            error: self.state.error().map(str::to_string),
        };
        let extra = map_object(json!({
            "provider": self.config.provider,
            "copies_per_color": self.config.copies_per_color,
            "sheet_dpi": self.config.sheet_dpi,
        }));
        write_summary(&self.summary_path, &summary, Some(&extra))?;
        self.events.emit(
            EventKind::RunFinished,
            map_object(json!({
                "summary_path": self.summary_path.to_string_lossy().to_string(),
                "phase": summary.phase,
            })),
        )?;
        Ok(self.summary_path.clone())
    }

    fn color_path(&self, background: BackgroundRequest) -> PathBuf {
        self.run_dir.join(format!("{background}.jpg"))
    }
}

fn generator_model(config: &PipelineConfig, generator: &dyn BackgroundGenerator) -> Value {
    if generator.name() == "gemini" {
        Value::String(config.model.clone())
    } else {
        Value::Null
    }
}

/// User-facing line for a failed colour.
fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<PhotoError>() {
        Some(photo) => photo.user_message(),
        None => format!("Could not process the image ({err:#})."),
    }
}

fn failure_kind(err: &anyhow::Error) -> String {
    match err.downcast_ref::<PhotoError>() {
        Some(PhotoError::Generation(generation)) => format!("generation.{}", generation.kind()),
        Some(photo) => photo.kind().to_string(),
        None => "io".to_string(),
    }
}

fn remove_stale(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn now_utc_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use foto3x4_contracts::events::read_event_types;
    use foto3x4_contracts::session::SessionPhase;

    use super::*;
    use crate::codec::{probe, test_support::gradient_png};
    use crate::providers::{DryrunProvider, GeminiProvider, GenerationOutput};

    fn engine_in(temp: &tempfile::TempDir, config: PipelineConfig) -> Foto3x4Engine {
        let run_dir = temp.path().join("run-test");
        let events = run_dir.join("events.jsonl");
        Foto3x4Engine::new(run_dir, events, config).unwrap()
    }

    fn dryrun_config() -> PipelineConfig {
        PipelineConfig::default()
            .with_provider("dryrun")
            .with_sheet_dpi(72)
    }

    fn write_input(temp: &tempfile::TempDir, width: u32, height: u32) -> PathBuf {
        let path = temp.path().join("upload.png");
        fs::write(&path, gradient_png(width, height)).unwrap();
        path
    }

    /// Dryrun output for white; blue fails until `blue_failures` is used up.
    struct FlakyBlue {
        blue_failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FlakyBlue {
        fn failing(times: usize) -> Self {
            Self {
                blue_failures: AtomicUsize::new(times),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl BackgroundGenerator for FlakyBlue {
        fn name(&self) -> &str {
            "flaky"
        }

        fn generate(
            &self,
            image: &EncodedImage,
            background: BackgroundRequest,
        ) -> Result<GenerationOutput, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if background == BackgroundRequest::Blue
                && self
                    .blue_failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                    .is_ok()
            {
                return Err(GenerationError::Service {
                    provider: "flaky".to_string(),
                    status: 503,
                    message: "model overloaded".to_string(),
                });
            }
            DryrunProvider.generate(image, background)
        }
    }

    #[test]
    fn dryrun_run_produces_photos_sheet_and_event_trail() {
        let temp = tempfile::tempdir().unwrap();
        let input = write_input(&temp, 300, 200);
        let mut engine = engine_in(&temp, dryrun_config());

        let original = engine.select_file(&input).unwrap();
        assert_eq!(original.dimensions(), (300, 200));
        assert_eq!(engine.state().phase(), SessionPhase::Ready);

        engine.process().unwrap();
        assert_eq!(engine.state().phase(), SessionPhase::Completed);
        assert!(engine.state().ready_to_print());

        for background in BackgroundRequest::ALL {
            let path = engine.run_dir().join(format!("{background}.jpg"));
            let written = probe(fs::read(&path).unwrap()).unwrap();
            // dryrun pads to 300x300, then the 3:4 crop keeps the full height
            assert_eq!(written.dimensions(), (225, 300));

            let receipt: Value = serde_json::from_str(
                &fs::read_to_string(engine.run_dir().join(format!("receipt-{background}.json")))
                    .unwrap(),
            )
            .unwrap();
            assert_eq!(receipt["generation"]["provider"], json!("dryrun"));
            assert_eq!(receipt["generation"]["crop"]["offset_x"], json!(38));
            assert_eq!(receipt["generation"]["crop"]["width"], json!(225));
            assert_eq!(
                receipt["generation"]["source_sha256"],
                json!(sha256_hex(original.bytes()))
            );
        }

        let entries = engine.compose_sheet();
        assert_eq!(entries.len(), 8);
        assert!(entries[..4]
            .iter()
            .all(|entry| entry.tag == BackgroundRequest::Blue));
        assert!(entries[4..]
            .iter()
            .all(|entry| entry.tag == BackgroundRequest::White));

        let sheet_path = engine.run_dir().join("sheet.jpg");
        engine.render_sheet(&sheet_path).unwrap();
        let sheet = probe(fs::read(&sheet_path).unwrap()).unwrap();
        assert_eq!(sheet.dimensions(), (595, 842));

        let summary_path = engine.finish().unwrap();
        let summary: Value =
            serde_json::from_str(&fs::read_to_string(summary_path).unwrap()).unwrap();
        assert_eq!(summary["phase"], json!("completed"));
        assert_eq!(summary["colors"].as_array().unwrap().len(), 2);
        assert_eq!(summary["provider"], json!("dryrun"));

        assert_eq!(
            read_event_types(engine.events_path()).unwrap(),
            vec![
                "run_started",
                "file_selected",
                "generation_started",
                "status",
                "status",
                "color_ready",
                "status",
                "status",
                "color_ready",
                "status",
                "sheet_rendered",
                "run_finished",
            ]
        );
    }

    #[test]
    fn failure_on_blue_keeps_white_and_retry_regenerates_both() {
        let temp = tempfile::tempdir().unwrap();
        let input = write_input(&temp, 120, 160);
        let generator = FlakyBlue::failing(1);
        let mut engine = engine_in(&temp, dryrun_config()).with_generator(generator);
        engine.select_file(&input).unwrap();

        let err = engine.process().unwrap_err();
        assert!(format!("{err:#}").contains("model overloaded"));
        assert_eq!(engine.state().phase(), SessionPhase::Failed);
        assert!(engine.state().white().is_some());
        assert!(engine.state().blue().is_none());
        let message = engine.state().error().unwrap();
        assert!(message.starts_with("AI processing failed"), "{message}");
        assert!(engine.run_dir().join("white.jpg").exists());
        assert!(!engine.run_dir().join("blue.jpg").exists());

        // only the completed colour goes on the sheet
        assert_eq!(engine.compose_sheet().len(), 4);

        engine.process().unwrap();
        assert_eq!(engine.state().phase(), SessionPhase::Completed);
        assert!(engine.state().error().is_none());

        let types = read_event_types(engine.events_path()).unwrap();
        assert_eq!(
            types.iter().filter(|kind| *kind == "generation_started").count(),
            2
        );
        assert_eq!(
            types.iter().filter(|kind| *kind == "generation_failed").count(),
            1
        );
        assert_eq!(types.iter().filter(|kind| *kind == "color_ready").count(), 3);
    }

    #[test]
    fn missing_gemini_key_surfaces_a_configuration_message() {
        let temp = tempfile::tempdir().unwrap();
        let input = write_input(&temp, 64, 64);
        let mut engine = engine_in(&temp, PipelineConfig::default())
            .with_generator(GeminiProvider::default().with_api_key(None));
        engine.select_file(&input).unwrap();

        let err = engine.process().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PhotoError>(),
            Some(PhotoError::Generation(GenerationError::MissingCredentials { .. }))
        ));
        assert_eq!(
            engine.state().status_message(),
            "AI processing is not configured: set GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY and try again."
        );
        assert!(engine.state().white().is_none());
    }

    #[test]
    fn process_requires_a_selected_photo() {
        let temp = tempfile::tempdir().unwrap();
        let mut engine = engine_in(&temp, dryrun_config());
        let err = engine.process().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PhotoError>(),
            Some(PhotoError::Input(_))
        ));
        assert_eq!(
            read_event_types(engine.events_path()).unwrap(),
            vec!["run_started"]
        );
    }

    #[test]
    fn undecodable_upload_reports_and_stays_empty() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("broken.jpg");
        fs::write(&input, b"this is not a photo").unwrap();
        let mut engine = engine_in(&temp, dryrun_config());

        let err = engine.select_file(&input).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PhotoError>(),
            Some(PhotoError::Decode(_))
        ));
        assert_eq!(engine.state().phase(), SessionPhase::Empty);
        assert!(engine
            .state()
            .status_message()
            .starts_with("Could not load the image"));
    }

    #[test]
    fn unknown_provider_is_reported_on_process() {
        let temp = tempfile::tempdir().unwrap();
        let input = write_input(&temp, 40, 40);
        let mut engine = engine_in(&temp, PipelineConfig::default().with_provider("nope"));
        engine.select_file(&input).unwrap();
        let err = engine.process().unwrap_err();
        assert!(err.to_string().contains("unknown provider 'nope'"));
        assert_eq!(engine.state().phase(), SessionPhase::Ready);
    }

    #[test]
    fn reset_clears_the_session() {
        let temp = tempfile::tempdir().unwrap();
        let input = write_input(&temp, 40, 60);
        let mut engine = engine_in(&temp, dryrun_config());
        engine.select_file(&input).unwrap();
        engine.process().unwrap();

        engine.reset().unwrap();
        assert_eq!(engine.state().phase(), SessionPhase::Empty);
        assert!(engine.state().original().is_none());
        assert!(engine.compose_sheet().is_empty());
        assert!(engine
            .render_sheet(&engine.run_dir().join("sheet.jpg"))
            .is_err());

        let summary_path = engine.finish().unwrap();
        let summary: Value =
            serde_json::from_str(&fs::read_to_string(summary_path).unwrap()).unwrap();
        assert_eq!(summary["phase"], json!("empty"));
        assert_eq!(summary["original_path"], Value::Null);
        let types = read_event_types(engine.events_path()).unwrap();
        assert_eq!(&types[types.len() - 2..], ["session_reset", "run_finished"]);
    }

    /// Loads fine but cannot allocate a crop surface.
    struct NoCropCodec;

    impl ImageCodec for NoCropCodec {
        fn decode(&self, bytes: &[u8]) -> Result<image::DynamicImage, PhotoError> {
            RasterCodec::default().decode(bytes)
        }

        fn resample(
            &self,
            image: &image::DynamicImage,
            width: u32,
            height: u32,
        ) -> Result<image::DynamicImage, PhotoError> {
            RasterCodec::default().resample(image, width, height)
        }

        fn crop(
            &self,
            _image: &image::DynamicImage,
            _rect: geometry::PixelRect,
        ) -> Result<image::DynamicImage, PhotoError> {
            Err(PhotoError::Canvas("surface unavailable".to_string()))
        }

        fn encode_jpeg(
            &self,
            image: &image::DynamicImage,
            quality: f32,
        ) -> Result<EncodedImage, PhotoError> {
            RasterCodec::default().encode_jpeg(image, quality)
        }
    }

    #[test]
    fn crop_failure_stops_the_run_at_white() {
        let temp = tempfile::tempdir().unwrap();
        let input = write_input(&temp, 80, 60);
        let mut engine = engine_in(&temp, dryrun_config()).with_codec(NoCropCodec);
        engine.select_file(&input).unwrap();

        assert!(engine.process().is_err());
        assert_eq!(engine.state().phase(), SessionPhase::Failed);
        assert!(engine.state().white().is_none());
        assert_eq!(
            engine.state().error(),
            Some("Could not process the image (surface unavailable).")
        );
        let types = read_event_types(engine.events_path()).unwrap();
        assert_eq!(types.last().map(String::as_str), Some("generation_failed"));
    }

    #[test]
    fn run_id_comes_from_the_directory_name() {
        let temp = tempfile::tempdir().unwrap();
        let engine = engine_in(&temp, dryrun_config());
        assert_eq!(engine.run_id(), "run-test");
    }

    #[test]
    fn nan_timeout_is_rejected_before_the_run_starts() {
        let temp = tempfile::tempdir().unwrap();
        let run_dir = temp.path().join("run-test");
        let config = PipelineConfig {
            request_timeout_s: f64::NAN,
            ..dryrun_config()
        };
        let result = Foto3x4Engine::new(run_dir.clone(), run_dir.join("events.jsonl"), config);
        let err = result.err().expect("construction should fail");
        assert!(err.to_string().contains("request timeout"));
        assert!(!run_dir.join("events.jsonl").exists());
    }
}
