//! 帧处理流水线 - runs the four filters, then captions the survivors

use super::caption::{CaptionRecord, Captioner, MANIFEST_FILE_NAME};
use super::config::PipelineOptions;
use super::decision::{DecisionLogEntry, Stage, StageReport};
use super::embedding::EmbeddingCache;
use super::error::PipelineError;
use super::frame::FrameStore;
use super::global_filter::GlobalEmbeddingFilter;
use super::ocr::OcrSettings;
use super::pixel_filter::PixelHashFilter;
use super::sequential_filter::SequentialEmbeddingFilter;
use super::services::{PipelineServices, ResolvedServices};
use super::source::{FfmpegFrameSource, FrameSource};
use super::text_filter::TextDensityFilter;
use log::{error, info, warn};
use serde::Serialize;
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const IMAGES_DIR_NAME: &str = "images";

static ACTIVE_OUTPUTS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on an output root, released on drop.
///
/// A run replaces `images/` and `captions.json`, so two runs writing the
/// same root would delete each other's results.
struct OutputLease {
    root: PathBuf,
}

impl OutputLease {
    fn acquire(root: &Path) -> Result<Self, PipelineError> {
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;
        let mut active = ACTIVE_OUTPUTS.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(root.clone()) {
            return Err(PipelineError::OutputBusy(root));
        }
        Ok(Self { root })
    }
}

impl Drop for OutputLease {
    fn drop(&mut self) {
        let mut active = ACTIVE_OUTPUTS.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.root);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatistics {
    pub initial_frames: usize,
    pub final_frames: usize,
    pub removed_pixel_global: usize,
    pub removed_deep_sequential: usize,
    pub removed_deep_global: usize,
    pub removed_text_ocr: usize,
    pub total_removed: usize,
    pub captions_generated: usize,
}

impl PipelineStatistics {
    pub fn removed(&self, stage: Stage) -> usize {
        match stage {
            Stage::Pixel => self.removed_pixel_global,
            Stage::SeqDeep => self.removed_deep_sequential,
            Stage::GlobalDeep => self.removed_deep_global,
            Stage::TextOcr => self.removed_text_ocr,
        }
    }

    fn record(&mut self, report: &StageReport) {
        let slot = match report.stage {
            Stage::Pixel => &mut self.removed_pixel_global,
            Stage::SeqDeep => &mut self.removed_deep_sequential,
            Stage::GlobalDeep => &mut self.removed_deep_global,
            Stage::TextOcr => &mut self.removed_text_ocr,
        };
        *slot = report.removed;
        self.total_removed = Stage::ALL.iter().map(|s| self.removed(*s)).sum();
        self.final_frames = self.initial_frames - self.total_removed;
    }
}

/// Result of one run. Partial on failure: completed stages keep their
/// statistics and decision logs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub final_images_dir: Option<PathBuf>,
    pub caption_manifest_path: Option<PathBuf>,
    pub statistics: PipelineStatistics,
    pub errors: Vec<String>,
    pub decision_logs: BTreeMap<Stage, Vec<DecisionLogEntry>>,
    pub captions: Vec<CaptionRecord>,
}

impl PipelineOutcome {
    fn failed(err: PipelineError) -> Self {
        Self {
            errors: vec![err.to_string()],
            ..Default::default()
        }
    }

    fn absorb(&mut self, report: StageReport) {
        self.statistics.record(&report);
        self.errors.extend(report.errors);
        self.decision_logs.insert(report.stage, report.log);
    }
}

/// 流水线编排器
///
/// Holds no per-run state; each `process` call owns its working directory,
/// embedding cache and last-kept pointers.
pub struct ExtractionOrchestrator {
    services: Arc<PipelineServices>,
    output_root: PathBuf,
    frame_source: Box<dyn FrameSource>,
    work_root: Option<PathBuf>,
}

impl ExtractionOrchestrator {
    pub fn new(services: Arc<PipelineServices>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            services,
            output_root: output_root.into(),
            frame_source: Box::new(FfmpegFrameSource::new()),
            work_root: None,
        }
    }

    pub fn with_frame_source(mut self, source: Box<dyn FrameSource>) -> Self {
        self.frame_source = source;
        self
    }

    /// Parent directory for temp dirs (system temp dir by default)
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    fn temp_dir(&self, prefix: &str) -> Result<TempDir, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let dir = match &self.work_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Extract frames from `video` with the configured `FrameSource`, then `process` them
    pub fn process_video(&self, video: &Path, options: &PipelineOptions) -> PipelineOutcome {
        let raw = match self.extract(video, options) {
            Ok(raw) => raw,
            Err(e) => {
                error!("❌ Frame extraction failed: {}", e);
                return PipelineOutcome::failed(e);
            }
        };

        let mut outcome = self.process(raw.path(), options);
        if let Err(e) = raw.close() {
            warn!("⚠️ Failed to remove raw frame dir: {}", e);
            outcome.errors.push(format!("cleanup: {}", e));
        }
        outcome
    }

    fn extract(&self, video: &Path, options: &PipelineOptions) -> Result<TempDir, PipelineError> {
        options.validate()?;
        let raw = self.temp_dir("frame_sieve_raw_")?;
        self.frame_source
            .extract(video, raw.path(), options.extract_interval)?;
        Ok(raw)
    }

    /// Run the full pipeline over the frames in `raw_frames_dir`.
    ///
    /// The input directory is never modified. Never returns an error: fatal
    /// problems end up in `errors` with `success = false`.
    pub fn process(&self, raw_frames_dir: &Path, options: &PipelineOptions) -> PipelineOutcome {
        info!("🚀 Processing frames from {:?}", raw_frames_dir);
        let mut outcome = PipelineOutcome::default();

        match self.run(raw_frames_dir, options, &mut outcome) {
            Ok(()) => {
                outcome.success = true;
                let stats = &outcome.statistics;
                info!(
                    "✅ Done: {} -> {} frames ({} removed), {} captions",
                    stats.initial_frames,
                    stats.final_frames,
                    stats.total_removed,
                    stats.captions_generated
                );
            }
            Err(e) => {
                error!("❌ Pipeline aborted: {}", e);
                outcome.errors.push(e.to_string());
            }
        }
        outcome
    }

    fn run(
        &self,
        raw_frames_dir: &Path,
        options: &PipelineOptions,
        outcome: &mut PipelineOutcome,
    ) -> Result<(), PipelineError> {
        options.validate()?;
        let _lease = OutputLease::acquire(&self.output_root)?;
        let services = self.services.resolve()?;

        let settings = OcrSettings {
            lang: options.ocr_lang.clone(),
            accelerator: options.ocr_accelerator,
        };
        services.ocr.prepare(&settings).map_err(|e| match e {
            PipelineError::ModelLoadFailed(_) => e,
            other => PipelineError::ModelLoadFailed(format!(
                "{} cannot run with language '{}': {}",
                services.ocr.name(),
                settings.lang,
                other
            )),
        })?;

        let work = self.temp_dir("frame_sieve_work_")?;
        let result = self.run_in(raw_frames_dir, work.path(), options, &services, settings, outcome);
        if let Err(e) = work.close() {
            warn!("⚠️ Failed to remove working dir: {}", e);
            outcome.errors.push(format!("cleanup: {}", e));
        }
        result
    }

    fn run_in(
        &self,
        raw_frames_dir: &Path,
        work_dir: &Path,
        options: &PipelineOptions,
        services: &ResolvedServices,
        settings: OcrSettings,
        outcome: &mut PipelineOutcome,
    ) -> Result<(), PipelineError> {
        let mut store = FrameStore::load_copy(raw_frames_dir, work_dir, options.interval()?)?;
        outcome.statistics.initial_frames = store.len();
        outcome.statistics.final_frames = store.len();
        if store.is_empty() {
            warn!("⚠️ No frames found in {:?}", raw_frames_dir);
        }

        let report = PixelHashFilter::new(options.pixel_threshold).apply(&mut store)?;
        outcome.absorb(report);

        let model = services.similarity.as_ref();
        let mut cache = EmbeddingCache::new();
        let report = SequentialEmbeddingFilter::new(options.sequential_deep_threshold)
            .apply(&mut store, model, &mut cache)?;
        outcome.absorb(report);

        let report = GlobalEmbeddingFilter::new(options.global_deep_threshold)
            .with_window(options.global_compare_window)
            .apply(&mut store, model, &mut cache)?;
        outcome.absorb(report);

        let report = TextDensityFilter::new(options.min_words, settings)
            .apply(&mut store, services.ocr.as_ref())?;
        outcome.absorb(report);

        let images_dir = self.output_root.join(IMAGES_DIR_NAME);
        if images_dir.exists() {
            fs::remove_dir_all(&images_dir)?;
        }
        store.relocate(&images_dir)?;
        outcome.final_images_dir = Some(images_dir);

        let manifest_path = self.output_root.join(MANIFEST_FILE_NAME);
        let captions = Captioner::new(services.caption.as_ref(), &options.caption_prompt)
            .run(store.frames(), &manifest_path)?;
        outcome.statistics.captions_generated = captions.captions_generated;
        outcome.errors.extend(captions.errors);
        outcome.captions = captions.records;
        outcome.caption_manifest_path = Some(captions.manifest_path);
        Ok(())
    }
}
