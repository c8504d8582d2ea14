//! Tesseract through leptess

use super::{OcrSettings, TextRecognizer};
use crate::core::video::error::PipelineError;
use leptess::{LepTess, Variable};
use log::{debug, info};
use std::path::{Path, PathBuf};

pub struct TesseractOcr {
    /// tessdata directory; `None` lets Tesseract use TESSDATA_PREFIX
    datapath: Option<String>,
    /// Page segmentation mode (3 = fully automatic)
    psm: u32,
}

impl TesseractOcr {
    pub fn new(datapath: Option<PathBuf>, psm: u32) -> Self {
        Self {
            datapath: datapath.map(|p| p.to_string_lossy().into_owned()),
            psm,
        }
    }

    // LepTess is not Sync, every call gets its own engine
    fn engine(&self, lang: &str) -> Result<LepTess, PipelineError> {
        let mut lt = LepTess::new(self.datapath.as_deref(), lang).map_err(|e| {
            PipelineError::ModelLoadFailed(format!(
                "failed to initialize Tesseract with language '{}': {}. \
                 Make sure the language data is installed",
                lang, e
            ))
        })?;
        lt.set_variable(Variable::TesseditPagesegMode, &self.psm.to_string())
            .map_err(|e| PipelineError::ModelLoadFailed(format!("failed to set PSM: {}", e)))?;
        Ok(lt)
    }
}

impl TextRecognizer for TesseractOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn prepare(&self, settings: &OcrSettings) -> Result<(), PipelineError> {
        self.engine(&settings.lang)?;
        if settings.accelerator {
            debug!("tesseract has no accelerator path, running on CPU");
        }
        info!("✅ Tesseract ready for '{}'", settings.lang);
        Ok(())
    }

    fn recognize(&self, frame: &Path, settings: &OcrSettings) -> Result<String, PipelineError> {
        let mut lt = self.engine(&settings.lang)?;
        lt.set_image(frame)
            .map_err(|e| PipelineError::Ocr(format!("failed to load {:?}: {}", frame, e)))?;
        lt.get_utf8_text()
            .map_err(|e| PipelineError::Ocr(format!("invalid UTF-8 from Tesseract: {}", e)))
    }
}
