pub mod caption;
pub mod config;
pub mod decision;
pub mod device;
pub mod embedding;
pub mod error;
pub mod frame;
pub mod global_filter;
pub mod ocr;
pub mod orchestrator;
pub mod phash;
pub mod pixel_filter;
pub mod sequential_filter;
pub mod services;
pub mod source;
pub mod text_filter;

#[cfg(test)]
pub(crate) mod test_support;

pub use caption::{CaptionModel, CaptionRecord, CaptionTag, Captioner, HttpCaptionConfig, HttpCaptionModel};
pub use config::PipelineOptions;
pub use decision::{DecisionLogEntry, Stage, StageReport};
pub use device::{select_device, ComputeDevice, DeviceDetector, SystemDetector};
pub use embedding::{EmbeddingCache, ImageEmbedder, SimilarityModel, ThumbnailEmbedder};
pub use error::PipelineError;
pub use frame::{Frame, FrameRef, FrameStore};
pub use global_filter::GlobalEmbeddingFilter;
pub use ocr::{OcrSettings, TextRecognizer};
#[cfg(feature = "tesseract")]
pub use ocr::TesseractOcr;
pub use orchestrator::{ExtractionOrchestrator, PipelineOutcome, PipelineStatistics};
pub use phash::{hamming_distance, PerceptualHasher};
pub use pixel_filter::PixelHashFilter;
pub use sequential_filter::SequentialEmbeddingFilter;
pub use services::{ModelSlot, PipelineServices};
pub use source::{FfmpegFrameSource, FrameSource};
pub use text_filter::TextDensityFilter;
