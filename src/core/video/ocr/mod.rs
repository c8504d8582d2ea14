//! OCR 文字识别 - text extraction for the text-density stage

#[cfg(feature = "tesseract")]
pub mod tesseract;

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractOcr;

use super::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Engine language code, e.g. "eng" or "eng+deu"
    pub lang: String,
    pub accelerator: bool,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            lang: "eng".to_string(),
            accelerator: false,
        }
    }
}

pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Check the engine can run with `settings`, language data included.
    ///
    /// Runs once before any stage; an error here aborts the run.
    fn prepare(&self, settings: &OcrSettings) -> Result<(), PipelineError>;

    /// Extract all text of the image at `frame`
    fn recognize(&self, frame: &Path, settings: &OcrSettings) -> Result<String, PipelineError>;
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
