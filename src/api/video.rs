//! 视频帧处理器 - dedup + caption facade

#[cfg(feature = "clip")]
use crate::core::video::embedding::{ClipConfig, ClipEmbedder};
#[cfg(feature = "tesseract")]
use crate::core::video::TesseractOcr;
use crate::core::video::{
    select_device, CaptionModel, ComputeDevice, ExtractionOrchestrator, HttpCaptionConfig,
    HttpCaptionModel, ImageEmbedder, ModelSlot, PipelineError, PipelineOptions, PipelineOutcome,
    PipelineServices, SimilarityModel, SystemDetector, TextRecognizer,
    ThumbnailEmbedder,
};
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Built-in, no weights needed
    Thumbnail { size: u32 },
    /// CLIP ONNX export (cargo feature `clip`)
    Clip { model_path: PathBuf },
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        if cfg!(feature = "clip") {
            EmbeddingBackend::Clip {
                model_path: PathBuf::from("models/embeddings/clip_vit_b32.onnx"),
            }
        } else {
            EmbeddingBackend::Thumbnail { size: 16 }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum OcrBackend {
    /// libtesseract through leptess (cargo feature `tesseract`)
    Tesseract {
        /// tessdata directory, TESSDATA_PREFIX when unset
        #[serde(default)]
        datapath: Option<PathBuf>,
        #[serde(default = "default_psm")]
        psm: u32,
    },
}

fn default_psm() -> u32 {
    3
}

impl Default for OcrBackend {
    fn default() -> Self {
        OcrBackend::Tesseract {
            datapath: None,
            psm: default_psm(),
        }
    }
}

/// Per-process model setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub embedding: EmbeddingBackend,
    pub ocr: OcrBackend,
    pub caption: HttpCaptionConfig,
    pub prefer_accelerator: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingBackend::default(),
            ocr: OcrBackend::default(),
            caption: HttpCaptionConfig::default(),
            prefer_accelerator: true,
        }
    }
}

impl ModelConfig {
    pub fn from_json5_str(text: &str) -> Result<Self, PipelineError> {
        json5::from_str(text).map_err(|e| PipelineError::InvalidOptions(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        Self::from_json5_str(&std::fs::read_to_string(path)?)
    }
}

fn load_embedder(
    backend: &EmbeddingBackend,
    prefer_accelerator: bool,
) -> Result<(Box<dyn ImageEmbedder>, ComputeDevice), PipelineError> {
    match backend {
        EmbeddingBackend::Thumbnail { size } => {
            Ok((Box::new(ThumbnailEmbedder::with_size(*size)), ComputeDevice::Cpu))
        }
        #[cfg(feature = "clip")]
        EmbeddingBackend::Clip { model_path } => {
            let device = select_device(&SystemDetector, prefer_accelerator);
            let config = ClipConfig {
                model_path: model_path.clone(),
                ..Default::default()
            };
            Ok((Box::new(ClipEmbedder::load(config, device)?), device))
        }
        #[cfg(not(feature = "clip"))]
        EmbeddingBackend::Clip { model_path } => {
            let device = select_device(&SystemDetector, prefer_accelerator);
            Err(PipelineError::ModelLoadFailed(format!(
                "CLIP model {:?} requested on {} but the `clip` feature is disabled",
                model_path, device
            )))
        }
    }
}

fn load_ocr(backend: &OcrBackend) -> Result<Arc<dyn TextRecognizer>, PipelineError> {
    match backend {
        #[cfg(feature = "tesseract")]
        OcrBackend::Tesseract { datapath, psm } => {
            Ok(Arc::new(TesseractOcr::new(datapath.clone(), *psm)) as Arc<dyn TextRecognizer>)
        }
        #[cfg(not(feature = "tesseract"))]
        OcrBackend::Tesseract { .. } => Err(PipelineError::ModelLoadFailed(
            "Tesseract OCR requested but the `tesseract` feature is disabled".to_string(),
        )),
    }
}

/// Lazy services for `config`; nothing is loaded until the first run
pub fn build_services(config: &ModelConfig) -> PipelineServices {
    let embedding = config.embedding.clone();
    let prefer_accelerator = config.prefer_accelerator;
    let similarity = ModelSlot::lazy("similarity model", move || {
        let (backend, device) = load_embedder(&embedding, prefer_accelerator)?;
        Ok(Arc::new(SimilarityModel::new(backend, device)))
    });

    let ocr_backend = config.ocr.clone();
    let ocr = ModelSlot::lazy("ocr engine", move || load_ocr(&ocr_backend));

    let caption_config = config.caption.clone();
    let caption = ModelSlot::lazy("caption model", move || {
        let model = HttpCaptionModel::new(caption_config.clone())?;
        Ok(Arc::new(model) as Arc<dyn CaptionModel>)
    });

    PipelineServices::new(similarity, ocr, caption)
}

static SHARED_SERVICES: OnceCell<(ModelConfig, Arc<PipelineServices>)> = OnceCell::new();

/// Process-wide services, built from the first config seen
pub fn shared_services(config: &ModelConfig) -> Arc<PipelineServices> {
    let (first, services) =
        SHARED_SERVICES.get_or_init(|| (config.clone(), Arc::new(build_services(config))));
    if first != config {
        warn!("⚠️ Shared models already configured, ignoring new model config");
    }
    services.clone()
}

/// 视频帧处理器 - 去重 + 图片描述
///
/// ```ignore
/// let processor = VideoFrameProcessor::create("out".into(), PipelineOptions::for_slides());
/// let outcome = processor.process_video("talk.mp4".into());
/// println!("{} frames kept", outcome.statistics.final_frames);
/// ```
pub struct VideoFrameProcessor {
    orchestrator: ExtractionOrchestrator,
    options: PipelineOptions,
}

impl VideoFrameProcessor {
    /// 使用默认模型配置创建
    pub fn create(output_root: String, options: PipelineOptions) -> Self {
        Self::with_models(output_root, options, &ModelConfig::default())
    }

    pub fn with_models(output_root: String, options: PipelineOptions, models: &ModelConfig) -> Self {
        Self::with_services(shared_services(models), output_root, options)
    }

    pub fn with_services(
        services: Arc<PipelineServices>,
        output_root: String,
        options: PipelineOptions,
    ) -> Self {
        crate::init_logging();
        info!("🎬 VideoFrameProcessor: created, output at {}", output_root);
        Self {
            orchestrator: ExtractionOrchestrator::new(services, output_root),
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// 处理已抽取的帧目录
    pub fn process_frames_dir(&self, frames_dir: String) -> PipelineOutcome {
        self.orchestrator
            .process(Path::new(&frames_dir), &self.options)
    }

    /// 抽帧后处理
    pub fn process_video(&self, video_path: String) -> PipelineOutcome {
        self.orchestrator
            .process_video(Path::new(&video_path), &self.options)
    }
}

impl Drop for VideoFrameProcessor {
    fn drop(&mut self) {
        info!("🗑️ VideoFrameProcessor: released");
    }
}
