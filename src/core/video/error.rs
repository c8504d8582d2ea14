use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("OCR failed: {0}")]
    Ocr(String),
    #[error("Caption failed: {0}")]
    Caption(String),
    #[error("Frame extraction failed: {0}")]
    Extraction(String),
    #[error("Output directory in use by another run: {0:?}")]
    OutputBusy(std::path::PathBuf),
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PipelineError {
    /// Errors that only concern a single frame. Stages turn these into a drop
    /// decision; everything else aborts the run.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            PipelineError::Io(_)
                | PipelineError::Image(_)
                | PipelineError::Embedding(_)
                | PipelineError::Ocr(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_local_classification() {
        let io = PipelineError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io.is_frame_local());
        assert!(PipelineError::Ocr("bad".into()).is_frame_local());
        assert!(!PipelineError::ModelLoadFailed("no weights".into()).is_frame_local());
        assert!(!PipelineError::InvalidOptions("x".into()).is_frame_local());
        assert!(!PipelineError::OutputBusy("out".into()).is_frame_local());
    }
}
